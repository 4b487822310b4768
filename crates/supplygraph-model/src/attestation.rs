//! Edge kinds, roles, provenance and payloads.
//!
//! An attestation is stored as one edge record owning an ordered list of
//! role-tagged endpoints. Binary claims have two endpoints; SLSA provenance
//! adds a builder and any number of materials to the same record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::input::PkgMatchType;
use crate::key::CanonicalKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeKind {
    IsDependency,
    IsOccurrence,
    CertifyVuln,
    IsVulnerability,
    CertifyBad,
    CertifyGood,
    CertifyPkg,
    HashEqual,
    HasSbom,
    HasSourceAt,
    VexStatement,
    Slsa,
    Scorecard,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 13] = [
        EdgeKind::IsDependency,
        EdgeKind::IsOccurrence,
        EdgeKind::CertifyVuln,
        EdgeKind::IsVulnerability,
        EdgeKind::CertifyBad,
        EdgeKind::CertifyGood,
        EdgeKind::CertifyPkg,
        EdgeKind::HashEqual,
        EdgeKind::HasSbom,
        EdgeKind::HasSourceAt,
        EdgeKind::VexStatement,
        EdgeKind::Slsa,
        EdgeKind::Scorecard,
    ];

    /// Equivalence claims: endpoint order carries no meaning.
    pub fn is_symmetric(self) -> bool {
        matches!(
            self,
            EdgeKind::HashEqual | EdgeKind::CertifyPkg | EdgeKind::IsVulnerability
        )
    }

    /// Kinds whose package subject is scoped by a `PkgMatchType`.
    pub fn carries_match_flag(self) -> bool {
        matches!(
            self,
            EdgeKind::CertifyBad | EdgeKind::CertifyGood | EdgeKind::HasSourceAt
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::IsDependency => "IsDependency",
            EdgeKind::IsOccurrence => "IsOccurrence",
            EdgeKind::CertifyVuln => "CertifyVuln",
            EdgeKind::IsVulnerability => "IsVulnerability",
            EdgeKind::CertifyBad => "CertifyBad",
            EdgeKind::CertifyGood => "CertifyGood",
            EdgeKind::CertifyPkg => "CertifyPkg",
            EdgeKind::HashEqual => "HashEqual",
            EdgeKind::HasSbom => "HasSBOM",
            EdgeKind::HasSourceAt => "HasSourceAt",
            EdgeKind::VexStatement => "VexStatement",
            EdgeKind::Slsa => "HasSLSA",
            EdgeKind::Scorecard => "CertifyScorecard",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Subject,
    Object,
    Dependency,
    Artifact,
    Vulnerability,
    Peer,
    Material,
    Builder,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Subject => "subject",
            Role::Object => "object",
            Role::Dependency => "dependency",
            Role::Artifact => "artifact",
            Role::Vulnerability => "vulnerability",
            Role::Peer => "peer",
            Role::Material => "material",
            Role::Builder => "builder",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    pub role: Role,
    pub node: NodeId,
}

impl Endpoint {
    pub fn new(role: Role, node: NodeId) -> Self {
        Self { role, node }
    }
}

/// The (justification, origin, collector) triple every attestation carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Provenance {
    pub justification: String,
    pub origin: String,
    pub collector: String,
}

impl Provenance {
    pub fn new(justification: &str, origin: &str, collector: &str) -> Self {
        Self {
            justification: justification.to_string(),
            origin: origin.to_string(),
            collector: collector.to_string(),
        }
    }
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DependencyType {
    Direct,
    Indirect,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsDependencyPayload {
    pub version_range: String,
    pub dependency_type: DependencyType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertifyVulnPayload {
    pub time_scanned: DateTime<Utc>,
    pub db_uri: String,
    pub db_version: String,
    pub scanner_uri: String,
    pub scanner_version: String,
}

/// CertifyBad and CertifyGood. `match_flag` is set only for package subjects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertifyClaim {
    pub match_flag: Option<PkgMatchType>,
    pub known_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HasSourceAtPayload {
    pub match_flag: PkgMatchType,
    pub known_since: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VexStatus {
    NotAffected,
    Affected,
    Fixed,
    UnderInvestigation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VexPayload {
    pub status: Option<VexStatus>,
    pub statement: String,
    pub status_notes: String,
    pub known_since: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlsaPredicate {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlsaPayload {
    pub build_type: String,
    pub slsa_version: String,
    pub predicate: Vec<SlsaPredicate>,
    pub started_on: Option<DateTime<Utc>>,
    pub finished_on: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScorecardCheck {
    pub check: String,
    pub score: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScorecardPayload {
    pub checks: Vec<ScorecardCheck>,
    pub aggregate_score: f64,
    pub time_scanned: DateTime<Utc>,
    pub scorecard_version: String,
    pub scorecard_commit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttestationPayload {
    IsDependency(IsDependencyPayload),
    IsOccurrence,
    CertifyVuln(CertifyVulnPayload),
    IsVulnerability,
    CertifyBad(CertifyClaim),
    CertifyGood(CertifyClaim),
    CertifyPkg,
    HashEqual,
    HasSbom { uri: String },
    HasSourceAt(HasSourceAtPayload),
    VexStatement(VexPayload),
    Slsa(SlsaPayload),
    Scorecard(ScorecardPayload),
}

impl AttestationPayload {
    pub fn kind(&self) -> EdgeKind {
        match self {
            AttestationPayload::IsDependency(_) => EdgeKind::IsDependency,
            AttestationPayload::IsOccurrence => EdgeKind::IsOccurrence,
            AttestationPayload::CertifyVuln(_) => EdgeKind::CertifyVuln,
            AttestationPayload::IsVulnerability => EdgeKind::IsVulnerability,
            AttestationPayload::CertifyBad(_) => EdgeKind::CertifyBad,
            AttestationPayload::CertifyGood(_) => EdgeKind::CertifyGood,
            AttestationPayload::CertifyPkg => EdgeKind::CertifyPkg,
            AttestationPayload::HashEqual => EdgeKind::HashEqual,
            AttestationPayload::HasSbom { .. } => EdgeKind::HasSbom,
            AttestationPayload::HasSourceAt(_) => EdgeKind::HasSourceAt,
            AttestationPayload::VexStatement(_) => EdgeKind::VexStatement,
            AttestationPayload::Slsa(_) => EdgeKind::Slsa,
            AttestationPayload::Scorecard(_) => EdgeKind::Scorecard,
        }
    }

    /// The package match flag, for kinds that carry one.
    pub fn match_flag(&self) -> Option<PkgMatchType> {
        match self {
            AttestationPayload::CertifyBad(c) | AttestationPayload::CertifyGood(c) => c.match_flag,
            AttestationPayload::HasSourceAt(p) => Some(p.match_flag),
            _ => None,
        }
    }

    /// List-valued fields sorted so that order never affects identity.
    pub fn normalized(mut self) -> Self {
        match &mut self {
            AttestationPayload::Slsa(p) => p.predicate.sort(),
            AttestationPayload::Scorecard(p) => p.checks.sort(),
            _ => {}
        }
        self
    }

    /// Canonical JSON text of the payload. Call on a normalized payload.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

// ============================================================================
// Edge identity and records
// ============================================================================

/// Everything that makes two attestations the same attestation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub kind: EdgeKind,
    pub endpoints: Vec<Endpoint>,
    pub provenance: Provenance,
    pub payload_fingerprint: String,
}

impl EdgeKey {
    pub fn new(
        kind: EdgeKind,
        endpoints: &[Endpoint],
        provenance: &Provenance,
        payload: &AttestationPayload,
    ) -> Self {
        Self {
            kind,
            endpoints: identity_endpoints(kind, endpoints),
            provenance: provenance.clone(),
            payload_fingerprint: payload.fingerprint(),
        }
    }
}

/// Symmetric kinds ignore endpoint order entirely. Otherwise positional
/// endpoints keep their order and materials collapse to a sorted set.
fn identity_endpoints(kind: EdgeKind, endpoints: &[Endpoint]) -> Vec<Endpoint> {
    if kind.is_symmetric() {
        let mut all = endpoints.to_vec();
        all.sort();
        return all;
    }
    let mut positional: Vec<Endpoint> = endpoints
        .iter()
        .copied()
        .filter(|e| e.role != Role::Material)
        .collect();
    let mut materials: Vec<Endpoint> = endpoints
        .iter()
        .copied()
        .filter(|e| e.role == Role::Material)
        .collect();
    materials.sort();
    materials.dedup();
    positional.extend(materials);
    positional
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub key: CanonicalKey,
    pub parent: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: EdgeId,
    pub key: EdgeKey,
    /// In ingestion order.
    pub endpoints: Vec<Endpoint>,
    pub provenance: Provenance,
    pub payload: AttestationPayload,
}

impl EdgeRecord {
    pub fn kind(&self) -> EdgeKind {
        self.key.kind
    }

    pub fn endpoints_with_role(&self, role: Role) -> impl Iterator<Item = NodeId> + '_ {
        self.endpoints
            .iter()
            .filter(move |e| e.role == role)
            .map(|e| e.node)
    }

    pub fn touches(&self, node: NodeId) -> bool {
        self.endpoints.iter().any(|e| e.node == node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prov() -> Provenance {
        Provenance::new("test", "Demo ingestion", "Demo ingestion")
    }

    #[test]
    fn symmetric_edge_key_ignores_order() {
        let a = Endpoint::new(Role::Peer, NodeId(1));
        let b = Endpoint::new(Role::Peer, NodeId(2));
        let ab = EdgeKey::new(EdgeKind::HashEqual, &[a, b], &prov(), &AttestationPayload::HashEqual);
        let ba = EdgeKey::new(EdgeKind::HashEqual, &[b, a], &prov(), &AttestationPayload::HashEqual);
        assert_eq!(ab, ba);
    }

    #[test]
    fn directed_edge_key_keeps_order() {
        let a = Endpoint::new(Role::Subject, NodeId(1));
        let b = Endpoint::new(Role::Subject, NodeId(2));
        let p = AttestationPayload::IsOccurrence;
        assert_ne!(
            EdgeKey::new(EdgeKind::IsOccurrence, &[a, b], &prov(), &p),
            EdgeKey::new(EdgeKind::IsOccurrence, &[b, a], &prov(), &p)
        );
    }

    #[test]
    fn materials_form_a_set() {
        let subject = Endpoint::new(Role::Subject, NodeId(9));
        let builder = Endpoint::new(Role::Builder, NodeId(8));
        let m1 = Endpoint::new(Role::Material, NodeId(1));
        let m2 = Endpoint::new(Role::Material, NodeId(2));
        let payload = AttestationPayload::Slsa(SlsaPayload {
            build_type: "Test:SLSA".into(),
            slsa_version: "v1".into(),
            predicate: vec![],
            started_on: None,
            finished_on: None,
        });
        let one = EdgeKey::new(EdgeKind::Slsa, &[subject, builder, m1, m2], &prov(), &payload);
        let two = EdgeKey::new(
            EdgeKind::Slsa,
            &[subject, builder, m2, m1, m2],
            &prov(),
            &payload,
        );
        assert_eq!(one, two);
    }

    #[test]
    fn normalized_payload_sorts_predicates() {
        let mk = |pred: Vec<(&str, &str)>| {
            AttestationPayload::Slsa(SlsaPayload {
                build_type: "Test:SLSA".into(),
                slsa_version: "v1".into(),
                predicate: pred
                    .into_iter()
                    .map(|(k, v)| SlsaPredicate {
                        key: k.into(),
                        value: v.into(),
                    })
                    .collect(),
                started_on: None,
                finished_on: None,
            })
            .normalized()
        };
        let a = mk(vec![("slsa.buildDefinition.buildType", "x"), ("slsa.buildDefinition.externalParameters.repository", "y")]);
        let b = mk(vec![("slsa.buildDefinition.externalParameters.repository", "y"), ("slsa.buildDefinition.buildType", "x")]);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn match_flag_comes_from_payload() {
        let bad = AttestationPayload::CertifyBad(CertifyClaim {
            match_flag: Some(PkgMatchType::AllVersions),
            known_since: None,
        });
        assert_eq!(bad.match_flag(), Some(PkgMatchType::AllVersions));
        assert_eq!(bad.kind(), EdgeKind::CertifyBad);
        assert_eq!(AttestationPayload::HashEqual.match_flag(), None);
    }
}
