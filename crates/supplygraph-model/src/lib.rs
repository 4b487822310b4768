//! Supplygraph data model
//!
//! Pure data shared by every layer of the supply-chain graph:
//!
//! - `input`: wire-shaped entity specs as collectors submit them
//! - `normalize`: validated, normalized coordinates built from those specs
//! - `key`: canonical identity keys (one closed variant per node kind)
//! - `attestation`: edge kinds, roles, provenance, payloads and stored records
//! - `digest`: short fingerprints for logs
//!
//! Nothing in here performs I/O or holds state. The canonical key builders
//! are total functions of normalized coordinates; all validation happens
//! earlier, in `normalize`.

pub mod attestation;
pub mod digest;
pub mod error;
pub mod input;
pub mod key;
pub mod normalize;

pub use attestation::{
    AttestationPayload, CertifyClaim, CertifyVulnPayload, DependencyType, EdgeId, EdgeKey,
    EdgeKind, EdgeRecord, Endpoint, HasSourceAtPayload, IsDependencyPayload, NodeId, NodeRecord,
    Provenance, Role, ScorecardCheck, ScorecardPayload, SlsaPayload, SlsaPredicate, VexPayload,
    VexStatus,
};
pub use error::{DiscriminantError, SpecError};
pub use input::{
    ArtifactInputSpec, BuilderInputSpec, MatchFlags, PackageOrArtifactInput, PackageOrSourceInput,
    PackageQualifierInput, PackageSourceOrArtifactInput, PkgInputSpec, PkgMatchType,
    SourceInputSpec, SubjectInput, VulnerabilityInput,
};
pub use key::{
    artifact_key, builder_key, package_keys, source_keys, vulnerability_key, CanonicalKey,
    NodeKind, PackageKeys, SourceKeys,
};
pub use normalize::{
    ArtifactCoordinate, BuilderCoordinate, PackageCoordinate, SourceCoordinate, VulnerabilityId,
};
