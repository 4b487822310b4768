//! Nested result trees.
//!
//! Packages and sources come back in their stored hierarchy
//! (type → namespace → name → version). Siblings appear in insertion order.

use serde::{Deserialize, Serialize};

use supplygraph_model::{
    AttestationPayload, CanonicalKey, EdgeId, EdgeKind, NodeId, NodeRecord, Provenance, Role,
};
use supplygraph_store::GraphBackend;

use crate::context::Guarded;
use crate::error::{GraphError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageQualifier {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVersion {
    pub id: NodeId,
    pub version: String,
    pub qualifiers: Vec<PackageQualifier>,
    pub subpath: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageName {
    pub id: NodeId,
    pub name: String,
    pub versions: Vec<PackageVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageNamespace {
    pub id: NodeId,
    pub namespace: String,
    pub names: Vec<PackageName>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub pkg_type: String,
    pub namespaces: Vec<PackageNamespace>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceName {
    pub id: NodeId,
    pub name: String,
    pub tag: Option<String>,
    pub commit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceNamespace {
    pub id: NodeId,
    pub namespace: String,
    pub names: Vec<SourceName>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub source_type: String,
    pub namespaces: Vec<SourceNamespace>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: NodeId,
    pub algorithm: String,
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Builder {
    pub id: NodeId,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    pub id: NodeId,
    /// `cve`, `osv` or `ghsa`.
    #[serde(rename = "type")]
    pub family: String,
    pub vulnerability_id: String,
    pub year: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityView {
    Package(Package),
    Source(Source),
    Artifact(Artifact),
    Builder(Builder),
    Vulnerability(Vulnerability),
}

impl EntityView {
    /// Id of the deepest node the view describes.
    pub fn leaf(&self) -> NodeId {
        match self {
            EntityView::Package(p) => p
                .namespaces
                .first()
                .and_then(|ns| ns.names.first())
                .map(|n| n.versions.first().map_or(n.id, |v| v.id))
                .unwrap_or(p.id),
            EntityView::Source(s) => s
                .namespaces
                .first()
                .and_then(|ns| ns.names.first())
                .map_or(s.id, |n| n.id),
            EntityView::Artifact(a) => a.id,
            EntityView::Builder(b) => b.id,
            EntityView::Vulnerability(v) => v.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointView {
    pub role: Role,
    pub entity: EntityView,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationView {
    pub id: EdgeId,
    pub kind: EdgeKind,
    pub endpoints: Vec<EndpointView>,
    pub provenance: Provenance,
    pub payload: AttestationPayload,
    /// The equivalent entity the attestation is attached to, when it is not
    /// the queried one.
    pub matched_via: Option<EntityView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestationGroup {
    pub queried: EntityView,
    pub attestations: Vec<AttestationView>,
}

// ============================================================================
// Single-path views
// ============================================================================

fn missing(id: NodeId) -> GraphError {
    GraphError::validation(format!("node {id} is not stored"))
}

pub(crate) fn version_leaf(record: &NodeRecord) -> Option<PackageVersion> {
    match &record.key {
        CanonicalKey::PackageVersion {
            version,
            qualifiers,
            subpath,
            ..
        } => Some(PackageVersion {
            id: record.id,
            version: version.clone(),
            qualifiers: qualifiers
                .iter()
                .map(|(key, value)| PackageQualifier {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect(),
            subpath: subpath.clone(),
        }),
        _ => None,
    }
}

pub(crate) fn source_leaf(record: &NodeRecord) -> Option<SourceName> {
    let non_empty = |s: &String| (!s.is_empty()).then(|| s.clone());
    match &record.key {
        CanonicalKey::SourceName {
            name, tag, commit, ..
        } => Some(SourceName {
            id: record.id,
            name: name.clone(),
            tag: non_empty(tag),
            commit: non_empty(commit),
        }),
        _ => None,
    }
}

/// Records from `id` up to its root, leaf first.
fn ancestry<B: GraphBackend + ?Sized>(
    store: &Guarded<'_, B>,
    id: NodeId,
) -> Result<Vec<NodeRecord>> {
    let mut out = Vec::new();
    let mut cur = Some(id);
    while let Some(node) = cur {
        let record = store.node(node)?.ok_or_else(|| missing(node))?;
        cur = record.parent;
        out.push(record);
    }
    Ok(out)
}

/// The view of one stored node, with its ancestors for hierarchical kinds.
pub(crate) fn view_of<B: GraphBackend + ?Sized>(
    store: &Guarded<'_, B>,
    id: NodeId,
) -> Result<EntityView> {
    let chain = ancestry(store, id)?;
    let leaf = chain.first().ok_or_else(|| missing(id))?;
    let view = match &leaf.key {
        CanonicalKey::PackageType { .. }
        | CanonicalKey::PackageNamespace { .. }
        | CanonicalKey::PackageName { .. }
        | CanonicalKey::PackageVersion { .. } => EntityView::Package(package_path(&chain)?),
        CanonicalKey::SourceType { .. }
        | CanonicalKey::SourceNamespace { .. }
        | CanonicalKey::SourceName { .. } => EntityView::Source(source_path(&chain)?),
        CanonicalKey::Artifact { algorithm, digest } => EntityView::Artifact(Artifact {
            id,
            algorithm: algorithm.clone(),
            digest: digest.clone(),
        }),
        CanonicalKey::Builder { uri } => EntityView::Builder(Builder {
            id,
            uri: uri.clone(),
        }),
        CanonicalKey::Cve { year, cve_id } => EntityView::Vulnerability(Vulnerability {
            id,
            family: "cve".into(),
            vulnerability_id: cve_id.clone(),
            year: Some(year.clone()),
        }),
        CanonicalKey::Osv { osv_id } => EntityView::Vulnerability(Vulnerability {
            id,
            family: "osv".into(),
            vulnerability_id: osv_id.clone(),
            year: None,
        }),
        CanonicalKey::Ghsa { ghsa_id } => EntityView::Vulnerability(Vulnerability {
            id,
            family: "ghsa".into(),
            vulnerability_id: ghsa_id.clone(),
            year: None,
        }),
    };
    Ok(view)
}

/// `chain` is leaf first and ends at the package type.
fn package_path(chain: &[NodeRecord]) -> Result<Package> {
    let mut versions = Vec::new();
    let mut names = Vec::new();
    let mut namespaces = Vec::new();
    for record in chain {
        match &record.key {
            CanonicalKey::PackageVersion { .. } => versions.extend(version_leaf(record)),
            CanonicalKey::PackageName { name, .. } => names.push(PackageName {
                id: record.id,
                name: name.clone(),
                versions: std::mem::take(&mut versions),
            }),
            CanonicalKey::PackageNamespace { namespace, .. } => {
                namespaces.push(PackageNamespace {
                    id: record.id,
                    namespace: namespace.clone(),
                    names: std::mem::take(&mut names),
                })
            }
            CanonicalKey::PackageType { pkg_type } => {
                return Ok(Package {
                    id: record.id,
                    pkg_type: pkg_type.clone(),
                    namespaces: std::mem::take(&mut namespaces),
                })
            }
            other => {
                return Err(GraphError::validation(format!(
                    "{other} found inside a package hierarchy"
                )))
            }
        }
    }
    Err(GraphError::validation("package hierarchy has no type node"))
}

fn source_path(chain: &[NodeRecord]) -> Result<Source> {
    let mut names = Vec::new();
    let mut namespaces = Vec::new();
    for record in chain {
        match &record.key {
            CanonicalKey::SourceName { .. } => names.extend(source_leaf(record)),
            CanonicalKey::SourceNamespace { namespace, .. } => namespaces.push(SourceNamespace {
                id: record.id,
                namespace: namespace.clone(),
                names: std::mem::take(&mut names),
            }),
            CanonicalKey::SourceType { source_type } => {
                return Ok(Source {
                    id: record.id,
                    source_type: source_type.clone(),
                    namespaces: std::mem::take(&mut namespaces),
                })
            }
            other => {
                return Err(GraphError::validation(format!(
                    "{other} found inside a source hierarchy"
                )))
            }
        }
    }
    Err(GraphError::validation("source hierarchy has no type node"))
}
