use thiserror::Error;

/// Structural problems found while normalizing an entity spec.
///
/// These never reach the canonical key builders: a spec that fails here has
/// no identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("required field `{field}` is empty")]
    EmptyField { field: &'static str },
    #[error("qualifier key is empty")]
    EmptyQualifierKey,
    #[error("qualifier key `{key}` appears more than once")]
    DuplicateQualifier { key: String },
    #[error("source sets both tag `{tag}` and commit `{commit}`")]
    TagAndCommit { tag: String, commit: String },
}

/// A discriminated union input did not name exactly one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DiscriminantError {
    #[error("no side of the union is set")]
    Missing,
    #[error("{present} sides of the union are set, expected exactly one")]
    Multiple { present: usize },
}
