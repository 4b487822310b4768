//! Canonical identity keys.
//!
//! A `CanonicalKey` is a closed enum with one variant per node kind. Equality
//! is structural over normalized fields, so a `:` inside a name can never make
//! two different entities collide. `Display` renders the colon-joined form
//! used in logs; it is not parsed back.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::normalize::{
    ArtifactCoordinate, BuilderCoordinate, PackageCoordinate, SourceCoordinate, VulnerabilityId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    PackageType,
    PackageNamespace,
    PackageName,
    PackageVersion,
    SourceType,
    SourceNamespace,
    SourceName,
    Artifact,
    Builder,
    Cve,
    Osv,
    Ghsa,
}

impl NodeKind {
    pub const ALL: [NodeKind; 12] = [
        NodeKind::PackageType,
        NodeKind::PackageNamespace,
        NodeKind::PackageName,
        NodeKind::PackageVersion,
        NodeKind::SourceType,
        NodeKind::SourceNamespace,
        NodeKind::SourceName,
        NodeKind::Artifact,
        NodeKind::Builder,
        NodeKind::Cve,
        NodeKind::Osv,
        NodeKind::Ghsa,
    ];

    pub fn is_package(self) -> bool {
        matches!(
            self,
            NodeKind::PackageType
                | NodeKind::PackageNamespace
                | NodeKind::PackageName
                | NodeKind::PackageVersion
        )
    }

    pub fn is_source(self) -> bool {
        matches!(
            self,
            NodeKind::SourceType | NodeKind::SourceNamespace | NodeKind::SourceName
        )
    }

    pub fn is_vulnerability(self) -> bool {
        matches!(self, NodeKind::Cve | NodeKind::Osv | NodeKind::Ghsa)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::PackageType => "package_type",
            NodeKind::PackageNamespace => "package_namespace",
            NodeKind::PackageName => "package_name",
            NodeKind::PackageVersion => "package_version",
            NodeKind::SourceType => "source_type",
            NodeKind::SourceNamespace => "source_namespace",
            NodeKind::SourceName => "source_name",
            NodeKind::Artifact => "artifact",
            NodeKind::Builder => "builder",
            NodeKind::Cve => "cve",
            NodeKind::Osv => "osv",
            NodeKind::Ghsa => "ghsa",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CanonicalKey {
    PackageType {
        pkg_type: String,
    },
    PackageNamespace {
        pkg_type: String,
        namespace: String,
    },
    PackageName {
        pkg_type: String,
        namespace: String,
        name: String,
    },
    PackageVersion {
        pkg_type: String,
        namespace: String,
        name: String,
        version: String,
        qualifiers: Vec<(String, String)>,
        subpath: String,
    },
    SourceType {
        source_type: String,
    },
    SourceNamespace {
        source_type: String,
        namespace: String,
    },
    SourceName {
        source_type: String,
        namespace: String,
        name: String,
        tag: String,
        commit: String,
    },
    Artifact {
        algorithm: String,
        digest: String,
    },
    Builder {
        uri: String,
    },
    Cve {
        year: String,
        cve_id: String,
    },
    Osv {
        osv_id: String,
    },
    Ghsa {
        ghsa_id: String,
    },
}

impl CanonicalKey {
    pub fn kind(&self) -> NodeKind {
        match self {
            CanonicalKey::PackageType { .. } => NodeKind::PackageType,
            CanonicalKey::PackageNamespace { .. } => NodeKind::PackageNamespace,
            CanonicalKey::PackageName { .. } => NodeKind::PackageName,
            CanonicalKey::PackageVersion { .. } => NodeKind::PackageVersion,
            CanonicalKey::SourceType { .. } => NodeKind::SourceType,
            CanonicalKey::SourceNamespace { .. } => NodeKind::SourceNamespace,
            CanonicalKey::SourceName { .. } => NodeKind::SourceName,
            CanonicalKey::Artifact { .. } => NodeKind::Artifact,
            CanonicalKey::Builder { .. } => NodeKind::Builder,
            CanonicalKey::Cve { .. } => NodeKind::Cve,
            CanonicalKey::Osv { .. } => NodeKind::Osv,
            CanonicalKey::Ghsa { .. } => NodeKind::Ghsa,
        }
    }

    /// Package coordinate of a name or version key. Name keys have an empty
    /// version, no qualifiers and no subpath.
    pub fn package_coordinate(&self) -> Option<PackageCoordinate> {
        match self {
            CanonicalKey::PackageName {
                pkg_type,
                namespace,
                name,
            } => Some(PackageCoordinate {
                pkg_type: pkg_type.clone(),
                namespace: namespace.clone(),
                name: name.clone(),
                version: String::new(),
                qualifiers: Vec::new(),
                subpath: String::new(),
            }),
            CanonicalKey::PackageVersion {
                pkg_type,
                namespace,
                name,
                version,
                qualifiers,
                subpath,
            } => Some(PackageCoordinate {
                pkg_type: pkg_type.clone(),
                namespace: namespace.clone(),
                name: name.clone(),
                version: version.clone(),
                qualifiers: qualifiers.clone(),
                subpath: subpath.clone(),
            }),
            _ => None,
        }
    }

    /// The key one level up the package or source hierarchy.
    pub fn parent(&self) -> Option<CanonicalKey> {
        match self {
            CanonicalKey::PackageNamespace { pkg_type, .. } => Some(CanonicalKey::PackageType {
                pkg_type: pkg_type.clone(),
            }),
            CanonicalKey::PackageName {
                pkg_type,
                namespace,
                ..
            } => Some(CanonicalKey::PackageNamespace {
                pkg_type: pkg_type.clone(),
                namespace: namespace.clone(),
            }),
            CanonicalKey::PackageVersion {
                pkg_type,
                namespace,
                name,
                ..
            } => Some(CanonicalKey::PackageName {
                pkg_type: pkg_type.clone(),
                namespace: namespace.clone(),
                name: name.clone(),
            }),
            CanonicalKey::SourceNamespace { source_type, .. } => Some(CanonicalKey::SourceType {
                source_type: source_type.clone(),
            }),
            CanonicalKey::SourceName {
                source_type,
                namespace,
                ..
            } => Some(CanonicalKey::SourceNamespace {
                source_type: source_type.clone(),
                namespace: namespace.clone(),
            }),
            _ => None,
        }
    }
}

fn join_qualifiers(qualifiers: &[(String, String)]) -> String {
    qualifiers
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalKey::PackageType { pkg_type } => write!(f, "{pkg_type}"),
            CanonicalKey::PackageNamespace {
                pkg_type,
                namespace,
            } => write!(f, "{pkg_type}:{namespace}"),
            CanonicalKey::PackageName {
                pkg_type,
                namespace,
                name,
            } => write!(f, "{pkg_type}:{namespace}:{name}"),
            CanonicalKey::PackageVersion {
                pkg_type,
                namespace,
                name,
                version,
                qualifiers,
                subpath,
            } => write!(
                f,
                "{pkg_type}:{namespace}:{name}:{version}:{}:{subpath}",
                join_qualifiers(qualifiers)
            ),
            CanonicalKey::SourceType { source_type } => write!(f, "{source_type}"),
            CanonicalKey::SourceNamespace {
                source_type,
                namespace,
            } => write!(f, "{source_type}:{namespace}"),
            CanonicalKey::SourceName {
                source_type,
                namespace,
                name,
                tag,
                commit,
            } => write!(f, "{source_type}:{namespace}:{name}:{tag}:{commit}"),
            CanonicalKey::Artifact { algorithm, digest } => write!(f, "{algorithm}:{digest}"),
            CanonicalKey::Builder { uri } => write!(f, "builder:{uri}"),
            CanonicalKey::Cve { year, cve_id } => write!(f, "cve:{year}:{cve_id}"),
            CanonicalKey::Osv { osv_id } => write!(f, "osv:{osv_id}"),
            CanonicalKey::Ghsa { ghsa_id } => write!(f, "ghsa:{ghsa_id}"),
        }
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Every level of a package's identity, root first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageKeys {
    pub ty: CanonicalKey,
    pub namespace: CanonicalKey,
    pub name: CanonicalKey,
    pub version: CanonicalKey,
}

impl PackageKeys {
    pub fn chain(&self) -> [&CanonicalKey; 4] {
        [&self.ty, &self.namespace, &self.name, &self.version]
    }
}

pub fn package_keys(coord: &PackageCoordinate) -> PackageKeys {
    PackageKeys {
        ty: CanonicalKey::PackageType {
            pkg_type: coord.pkg_type.clone(),
        },
        namespace: CanonicalKey::PackageNamespace {
            pkg_type: coord.pkg_type.clone(),
            namespace: coord.namespace.clone(),
        },
        name: CanonicalKey::PackageName {
            pkg_type: coord.pkg_type.clone(),
            namespace: coord.namespace.clone(),
            name: coord.name.clone(),
        },
        version: CanonicalKey::PackageVersion {
            pkg_type: coord.pkg_type.clone(),
            namespace: coord.namespace.clone(),
            name: coord.name.clone(),
            version: coord.version.clone(),
            qualifiers: coord.qualifiers.clone(),
            subpath: coord.subpath.clone(),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceKeys {
    pub ty: CanonicalKey,
    pub namespace: CanonicalKey,
    pub name: CanonicalKey,
}

impl SourceKeys {
    pub fn chain(&self) -> [&CanonicalKey; 3] {
        [&self.ty, &self.namespace, &self.name]
    }
}

pub fn source_keys(coord: &SourceCoordinate) -> SourceKeys {
    SourceKeys {
        ty: CanonicalKey::SourceType {
            source_type: coord.source_type.clone(),
        },
        namespace: CanonicalKey::SourceNamespace {
            source_type: coord.source_type.clone(),
            namespace: coord.namespace.clone(),
        },
        name: CanonicalKey::SourceName {
            source_type: coord.source_type.clone(),
            namespace: coord.namespace.clone(),
            name: coord.name.clone(),
            tag: coord.tag.clone(),
            commit: coord.commit.clone(),
        },
    }
}

pub fn artifact_key(coord: &ArtifactCoordinate) -> CanonicalKey {
    CanonicalKey::Artifact {
        algorithm: coord.algorithm.clone(),
        digest: coord.digest.clone(),
    }
}

pub fn builder_key(coord: &BuilderCoordinate) -> CanonicalKey {
    CanonicalKey::Builder {
        uri: coord.uri.clone(),
    }
}

pub fn vulnerability_key(id: &VulnerabilityId) -> CanonicalKey {
    match id {
        VulnerabilityId::Cve { year, cve_id } => CanonicalKey::Cve {
            year: year.clone(),
            cve_id: cve_id.clone(),
        },
        VulnerabilityId::Osv { osv_id } => CanonicalKey::Osv {
            osv_id: osv_id.clone(),
        },
        VulnerabilityId::Ghsa { ghsa_id } => CanonicalKey::Ghsa {
            ghsa_id: ghsa_id.clone(),
        },
    }
}
