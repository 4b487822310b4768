use thiserror::Error;

use supplygraph_model::{Role, SpecError};
use supplygraph_store::StoreError;

#[derive(Debug, Error)]
pub enum GraphError {
    /// Structurally inconsistent request. Never retried.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("cannot resolve {role} endpoint: {source}")]
    UnresolvableEndpoint {
        role: Role,
        #[source]
        source: SpecError,
    },

    #[error("{role} endpoint names no package, source or artifact")]
    MissingDiscriminant { role: Role },

    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),

    #[error("operation cancelled")]
    Cancelled,
}

impl GraphError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Transient failures. Ingestion is idempotent, so retrying these is safe.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GraphError::StoreUnavailable(_) | GraphError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
