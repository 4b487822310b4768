//! Query filter specs.
//!
//! Every field is optional; an unset field matches anything. String fields
//! compare after trimming, and artifact fields compare case-insensitively,
//! mirroring how the stored keys were normalized.

use serde::{Deserialize, Serialize};

use supplygraph_model::{CanonicalKey, EdgeKind, NodeKind};

fn field_matches(filter: &Option<String>, value: &str) -> bool {
    match filter {
        None => true,
        Some(f) => f.trim() == value,
    }
}

fn field_matches_ci(filter: &Option<String>, value: &str) -> bool {
    match filter {
        None => true,
        Some(f) => f.trim().eq_ignore_ascii_case(value),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifierSpec {
    pub key: String,
    /// Unset matches any value for `key`.
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PkgSpec {
    #[serde(rename = "type")]
    pub pkg_type: Option<String>,
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub qualifiers: Vec<QualifierSpec>,
    /// Match only versions without any qualifier.
    pub match_only_empty_qualifiers: bool,
    /// Stored qualifiers must equal the listed set instead of containing it.
    pub match_exact_qualifiers: bool,
    pub subpath: Option<String>,
}

impl PkgSpec {
    pub fn named(pkg_type: &str, namespace: &str, name: &str) -> Self {
        Self {
            pkg_type: Some(pkg_type.to_string()),
            namespace: Some(namespace.to_string()),
            name: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn with_qualifier(mut self, key: &str, value: &str) -> Self {
        self.qualifiers.push(QualifierSpec {
            key: key.to_string(),
            value: Some(value.to_string()),
        });
        self
    }

    /// Whether any field below the name level is set.
    pub fn is_version_scoped(&self) -> bool {
        self.version.is_some()
            || !self.qualifiers.is_empty()
            || self.match_only_empty_qualifiers
            || self.match_exact_qualifiers
            || self.subpath.is_some()
    }

    pub fn has_name_fields(&self) -> bool {
        self.name.is_some() || self.is_version_scoped()
    }

    pub fn has_namespace_fields(&self) -> bool {
        self.namespace.is_some() || self.has_name_fields()
    }

    pub fn matches_type(&self, pkg_type: &str) -> bool {
        field_matches(&self.pkg_type, pkg_type)
    }

    pub fn matches_namespace(&self, namespace: &str) -> bool {
        field_matches(&self.namespace, namespace)
    }

    pub fn matches_name(&self, name: &str) -> bool {
        field_matches(&self.name, name)
    }

    /// Version, subpath and qualifier-set matching. By default the filter's
    /// qualifiers must be a subset of the stored ones; with
    /// `match_only_empty_qualifiers` the stored set must be empty, and with
    /// `match_exact_qualifiers` it must hold nothing beyond the listed ones.
    pub fn matches_version(
        &self,
        version: &str,
        qualifiers: &[(String, String)],
        subpath: &str,
    ) -> bool {
        if !field_matches(&self.version, version) || !field_matches(&self.subpath, subpath) {
            return false;
        }
        if self.match_only_empty_qualifiers {
            return qualifiers.is_empty();
        }
        if self.match_exact_qualifiers && qualifiers.len() != self.qualifiers.len() {
            return false;
        }
        self.qualifiers.iter().all(|want| {
            qualifiers.iter().any(|(k, v)| {
                *k == want.key.trim() && want.value.as_ref().map_or(true, |w| w.trim() == v)
            })
        })
    }

    /// Match a stored package name or version key. A name key is judged on
    /// its name-level fields only.
    pub fn matches_key(&self, key: &CanonicalKey) -> bool {
        match key {
            CanonicalKey::PackageName {
                pkg_type,
                namespace,
                name,
            } => {
                self.matches_type(pkg_type)
                    && self.matches_namespace(namespace)
                    && self.matches_name(name)
            }
            CanonicalKey::PackageVersion {
                pkg_type,
                namespace,
                name,
                version,
                qualifiers,
                subpath,
            } => {
                self.matches_type(pkg_type)
                    && self.matches_namespace(namespace)
                    && self.matches_name(name)
                    && self.matches_version(version, qualifiers, subpath)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SourceSpec {
    #[serde(rename = "type")]
    pub source_type: Option<String>,
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub tag: Option<String>,
    pub commit: Option<String>,
}

impl SourceSpec {
    pub fn has_name_fields(&self) -> bool {
        self.name.is_some() || self.tag.is_some() || self.commit.is_some()
    }

    pub fn has_namespace_fields(&self) -> bool {
        self.namespace.is_some() || self.has_name_fields()
    }

    pub fn matches_type(&self, source_type: &str) -> bool {
        field_matches(&self.source_type, source_type)
    }

    pub fn matches_namespace(&self, namespace: &str) -> bool {
        field_matches(&self.namespace, namespace)
    }

    pub fn matches_name(&self, name: &str, tag: &str, commit: &str) -> bool {
        field_matches(&self.name, name)
            && field_matches(&self.tag, tag)
            && field_matches(&self.commit, commit)
    }

    pub fn matches_key(&self, key: &CanonicalKey) -> bool {
        match key {
            CanonicalKey::SourceName {
                source_type,
                namespace,
                name,
                tag,
                commit,
            } => {
                self.matches_type(source_type)
                    && self.matches_namespace(namespace)
                    && self.matches_name(name, tag, commit)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactSpec {
    pub algorithm: Option<String>,
    pub digest: Option<String>,
}

impl ArtifactSpec {
    pub fn exact(algorithm: &str, digest: &str) -> Self {
        Self {
            algorithm: Some(algorithm.to_string()),
            digest: Some(digest.to_string()),
        }
    }

    pub fn matches_key(&self, key: &CanonicalKey) -> bool {
        match key {
            CanonicalKey::Artifact { algorithm, digest } => {
                field_matches_ci(&self.algorithm, algorithm)
                    && field_matches_ci(&self.digest, digest)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderSpec {
    pub uri: Option<String>,
}

impl BuilderSpec {
    pub fn matches_key(&self, key: &CanonicalKey) -> bool {
        match key {
            CanonicalKey::Builder { uri } => field_matches(&self.uri, uri),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VulnerabilityFamily {
    Cve,
    Osv,
    Ghsa,
}

impl VulnerabilityFamily {
    pub fn node_kind(self) -> NodeKind {
        match self {
            VulnerabilityFamily::Cve => NodeKind::Cve,
            VulnerabilityFamily::Osv => NodeKind::Osv,
            VulnerabilityFamily::Ghsa => NodeKind::Ghsa,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VulnerabilitySpec {
    pub family: Option<VulnerabilityFamily>,
    pub vulnerability_id: Option<String>,
    /// CVE only; ignored for the other families.
    pub year: Option<String>,
}

impl VulnerabilitySpec {
    pub fn id(family: VulnerabilityFamily, id: &str) -> Self {
        Self {
            family: Some(family),
            vulnerability_id: Some(id.to_string()),
            year: None,
        }
    }

    /// Node kinds this filter can match, in a fixed order.
    pub fn node_kinds(&self) -> Vec<NodeKind> {
        match self.family {
            Some(f) => vec![f.node_kind()],
            None => vec![NodeKind::Cve, NodeKind::Osv, NodeKind::Ghsa],
        }
    }

    pub fn matches_key(&self, key: &CanonicalKey) -> bool {
        if !self.node_kinds().contains(&key.kind()) {
            return false;
        }
        match key {
            CanonicalKey::Cve { year, cve_id } => {
                field_matches(&self.vulnerability_id, cve_id) && field_matches(&self.year, year)
            }
            CanonicalKey::Osv { osv_id } => field_matches(&self.vulnerability_id, osv_id),
            CanonicalKey::Ghsa { ghsa_id } => field_matches(&self.vulnerability_id, ghsa_id),
            _ => false,
        }
    }
}

/// A filter naming one kind of entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityFilter {
    Package(PkgSpec),
    Source(SourceSpec),
    Artifact(ArtifactSpec),
    Builder(BuilderSpec),
    Vulnerability(VulnerabilitySpec),
}

impl EntityFilter {
    pub fn matches_key(&self, key: &CanonicalKey) -> bool {
        match self {
            EntityFilter::Package(spec) => spec.matches_key(key),
            EntityFilter::Source(spec) => spec.matches_key(key),
            EntityFilter::Artifact(spec) => spec.matches_key(key),
            EntityFilter::Builder(spec) => spec.matches_key(key),
            EntityFilter::Vulnerability(spec) => spec.matches_key(key),
        }
    }

    /// A filter matching exactly the entity behind `key`. Package name keys
    /// produce a name-level filter.
    pub fn exact(key: &CanonicalKey) -> Option<Self> {
        Some(match key {
            CanonicalKey::PackageName {
                pkg_type,
                namespace,
                name,
            } => EntityFilter::Package(PkgSpec::named(pkg_type, namespace, name)),
            CanonicalKey::PackageVersion {
                pkg_type,
                namespace,
                name,
                version,
                qualifiers,
                subpath,
            } => EntityFilter::Package(PkgSpec {
                pkg_type: Some(pkg_type.clone()),
                namespace: Some(namespace.clone()),
                name: Some(name.clone()),
                version: Some(version.clone()),
                qualifiers: qualifiers
                    .iter()
                    .map(|(k, v)| QualifierSpec {
                        key: k.clone(),
                        value: Some(v.clone()),
                    })
                    .collect(),
                match_only_empty_qualifiers: qualifiers.is_empty(),
                match_exact_qualifiers: true,
                subpath: Some(subpath.clone()),
            }),
            CanonicalKey::SourceName {
                source_type,
                namespace,
                name,
                tag,
                commit,
            } => EntityFilter::Source(SourceSpec {
                source_type: Some(source_type.clone()),
                namespace: Some(namespace.clone()),
                name: Some(name.clone()),
                tag: Some(tag.clone()),
                commit: Some(commit.clone()),
            }),
            CanonicalKey::Artifact { algorithm, digest } => {
                EntityFilter::Artifact(ArtifactSpec::exact(algorithm, digest))
            }
            CanonicalKey::Builder { uri } => EntityFilter::Builder(BuilderSpec {
                uri: Some(uri.clone()),
            }),
            CanonicalKey::Cve { year, cve_id } => EntityFilter::Vulnerability(VulnerabilitySpec {
                family: Some(VulnerabilityFamily::Cve),
                vulnerability_id: Some(cve_id.clone()),
                year: Some(year.clone()),
            }),
            CanonicalKey::Osv { osv_id } => {
                EntityFilter::Vulnerability(VulnerabilitySpec::id(VulnerabilityFamily::Osv, osv_id))
            }
            CanonicalKey::Ghsa { ghsa_id } => EntityFilter::Vulnerability(VulnerabilitySpec::id(
                VulnerabilityFamily::Ghsa,
                ghsa_id,
            )),
            _ => return None,
        })
    }
}

/// Which attestations to return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationFilter {
    pub kind: EdgeKind,
    /// Each filter must match a distinct endpoint. The first one anchors
    /// grouping and equivalence widening.
    #[serde(default)]
    pub endpoints: Vec<EntityFilter>,
    #[serde(default)]
    pub justification: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub collector: Option<String>,
}

impl AttestationFilter {
    pub fn new(kind: EdgeKind) -> Self {
        Self {
            kind,
            endpoints: Vec::new(),
            justification: None,
            origin: None,
            collector: None,
        }
    }

    pub fn on(mut self, filter: EntityFilter) -> Self {
        self.endpoints.push(filter);
        self
    }

    pub fn matches_provenance(&self, provenance: &supplygraph_model::Provenance) -> bool {
        field_matches(&self.justification, &provenance.justification)
            && field_matches(&self.origin, &provenance.origin)
            && field_matches(&self.collector, &provenance.collector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quals(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn qualifier_filter_is_subset_match() {
        let stored = quals(&[("channel", "stable"), ("user", "bincrafters")]);
        let spec = PkgSpec::default().with_qualifier("user", "bincrafters");
        assert!(spec.matches_version("3.0.3", &stored, ""));

        let spec = PkgSpec::default().with_qualifier("user", "other");
        assert!(!spec.matches_version("3.0.3", &stored, ""));

        let any_value = PkgSpec {
            qualifiers: vec![QualifierSpec {
                key: "channel".into(),
                value: None,
            }],
            ..PkgSpec::default()
        };
        assert!(any_value.matches_version("3.0.3", &stored, ""));
    }

    #[test]
    fn match_only_empty_qualifiers_requires_empty_set() {
        let spec = PkgSpec {
            match_only_empty_qualifiers: true,
            ..PkgSpec::default()
        };
        assert!(spec.matches_version("1.0", &[], ""));
        assert!(!spec.matches_version("1.0", &quals(&[("arch", "x86")]), ""));
    }

    #[test]
    fn exact_filter_matches_only_its_key() {
        let key = CanonicalKey::PackageVersion {
            pkg_type: "pypi".into(),
            namespace: "".into(),
            name: "django".into(),
            version: "1.11.1".into(),
            qualifiers: vec![],
            subpath: "".into(),
        };
        let other = CanonicalKey::PackageVersion {
            pkg_type: "pypi".into(),
            namespace: "".into(),
            name: "django".into(),
            version: "1.11.1".into(),
            qualifiers: quals(&[("os", "linux")]),
            subpath: "".into(),
        };
        let filter = EntityFilter::exact(&key).unwrap();
        assert!(filter.matches_key(&key));
        assert!(!filter.matches_key(&other));
    }

    #[test]
    fn exact_filter_rejects_qualifier_superset() {
        let version = |qualifiers: Vec<(String, String)>| CanonicalKey::PackageVersion {
            pkg_type: "conan".into(),
            namespace: "openssl.org".into(),
            name: "openssl".into(),
            version: "3.0.3".into(),
            qualifiers,
            subpath: "".into(),
        };
        let member = version(quals(&[("user", "bincrafters")]));
        let superset = version(quals(&[("channel", "stable"), ("user", "bincrafters")]));
        let different = version(quals(&[("user", "conan")]));

        let filter = EntityFilter::exact(&member).unwrap();
        assert!(filter.matches_key(&member));
        assert!(!filter.matches_key(&superset));
        assert!(!filter.matches_key(&different));
    }

    #[test]
    fn artifact_filter_ignores_case() {
        let key = CanonicalKey::Artifact {
            algorithm: "sha1".into(),
            digest: "7a8f47318e4676dacb0142afa0b83029cd7befd9".into(),
        };
        let spec = ArtifactSpec::exact("SHA1", "7A8F47318E4676DACB0142AFA0B83029CD7BEFD9");
        assert!(spec.matches_key(&key));
    }

    #[test]
    fn attestation_filter_wire_shape() {
        let json = r#"{
            "kind": "CertifyBad",
            "endpoints": [{"package": {"type": "pypi", "name": "django", "version": "1.11.1"}}],
            "origin": "Demo ingestion"
        }"#;
        let filter: AttestationFilter = serde_json::from_str(json).unwrap();
        assert_eq!(filter.kind, EdgeKind::CertifyBad);
        assert!(matches!(&filter.endpoints[0], EntityFilter::Package(p) if p.is_version_scoped()));
    }
}
