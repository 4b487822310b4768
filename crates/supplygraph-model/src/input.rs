//! Entity specs as collectors submit them.
//!
//! Field names follow the camelCase wire convention; optional fields may be
//! omitted entirely. Nothing here is validated yet (see `normalize`).

use serde::{Deserialize, Serialize};

use crate::error::DiscriminantError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PkgInputSpec {
    #[serde(rename = "type")]
    pub pkg_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub qualifiers: Vec<PackageQualifierInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subpath: Option<String>,
}

impl PkgInputSpec {
    pub fn new(pkg_type: &str, namespace: &str, name: &str) -> Self {
        Self {
            pkg_type: pkg_type.to_string(),
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn with_qualifier(mut self, key: &str, value: &str) -> Self {
        self.qualifiers.push(PackageQualifierInput {
            key: key.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn with_subpath(mut self, subpath: &str) -> Self {
        self.subpath = Some(subpath.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageQualifierInput {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInputSpec {
    #[serde(rename = "type")]
    pub source_type: String,
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

impl SourceInputSpec {
    pub fn new(source_type: &str, namespace: &str, name: &str) -> Self {
        Self {
            source_type: source_type.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            tag: None,
            commit: None,
        }
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    pub fn with_commit(mut self, commit: &str) -> Self {
        self.commit = Some(commit.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInputSpec {
    pub algorithm: String,
    pub digest: String,
}

impl ArtifactInputSpec {
    pub fn new(algorithm: &str, digest: &str) -> Self {
        Self {
            algorithm: algorithm.to_string(),
            digest: digest.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderInputSpec {
    pub uri: String,
}

/// A vulnerability identifier. Exactly one id family per value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VulnerabilityInput {
    #[serde(rename_all = "camelCase")]
    Cve { year: String, cve_id: String },
    #[serde(rename_all = "camelCase")]
    Osv { osv_id: String },
    #[serde(rename_all = "camelCase")]
    Ghsa { ghsa_id: String },
}

impl VulnerabilityInput {
    pub fn cve(year: &str, cve_id: &str) -> Self {
        Self::Cve {
            year: year.to_string(),
            cve_id: cve_id.to_string(),
        }
    }

    pub fn osv(osv_id: &str) -> Self {
        Self::Osv {
            osv_id: osv_id.to_string(),
        }
    }

    pub fn ghsa(ghsa_id: &str) -> Self {
        Self::Ghsa {
            ghsa_id: ghsa_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PkgMatchType {
    SpecificVersion,
    AllVersions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchFlags {
    pub pkg: PkgMatchType,
}

impl MatchFlags {
    pub const SPECIFIC_VERSION: MatchFlags = MatchFlags {
        pkg: PkgMatchType::SpecificVersion,
    };
    pub const ALL_VERSIONS: MatchFlags = MatchFlags {
        pkg: PkgMatchType::AllVersions,
    };
}

// ============================================================================
// Discriminated subject unions
// ============================================================================

/// The one subject a discriminated union input resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectInput {
    Package(PkgInputSpec),
    Source(SourceInputSpec),
    Artifact(ArtifactInputSpec),
}

fn exactly_one<T>(candidates: Vec<Option<T>>) -> Result<T, DiscriminantError> {
    let present = candidates.iter().filter(|c| c.is_some()).count();
    match present {
        0 => Err(DiscriminantError::Missing),
        1 => candidates
            .into_iter()
            .flatten()
            .next()
            .ok_or(DiscriminantError::Missing),
        n => Err(DiscriminantError::Multiple { present: n }),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSourceOrArtifactInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<PkgInputSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceInputSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactInputSpec>,
}

impl PackageSourceOrArtifactInput {
    pub fn package(spec: PkgInputSpec) -> Self {
        Self {
            package: Some(spec),
            ..Default::default()
        }
    }

    pub fn source(spec: SourceInputSpec) -> Self {
        Self {
            source: Some(spec),
            ..Default::default()
        }
    }

    pub fn artifact(spec: ArtifactInputSpec) -> Self {
        Self {
            artifact: Some(spec),
            ..Default::default()
        }
    }

    pub fn exactly_one(&self) -> Result<SubjectInput, DiscriminantError> {
        exactly_one(vec![
            self.package.clone().map(SubjectInput::Package),
            self.source.clone().map(SubjectInput::Source),
            self.artifact.clone().map(SubjectInput::Artifact),
        ])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageOrArtifactInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<PkgInputSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactInputSpec>,
}

impl PackageOrArtifactInput {
    pub fn exactly_one(&self) -> Result<SubjectInput, DiscriminantError> {
        exactly_one(vec![
            self.package.clone().map(SubjectInput::Package),
            self.artifact.clone().map(SubjectInput::Artifact),
        ])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageOrSourceInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<PkgInputSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceInputSpec>,
}

impl PackageOrSourceInput {
    pub fn exactly_one(&self) -> Result<SubjectInput, DiscriminantError> {
        exactly_one(vec![
            self.package.clone().map(SubjectInput::Package),
            self.source.clone().map(SubjectInput::Source),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminant_requires_exactly_one_side() {
        let none = PackageSourceOrArtifactInput::default();
        assert_eq!(none.exactly_one(), Err(DiscriminantError::Missing));

        let both = PackageSourceOrArtifactInput {
            package: Some(PkgInputSpec::new("pypi", "", "django")),
            artifact: Some(ArtifactInputSpec::new("sha256", "abc")),
            source: None,
        };
        assert_eq!(
            both.exactly_one(),
            Err(DiscriminantError::Multiple { present: 2 })
        );

        let one = PackageSourceOrArtifactInput::artifact(ArtifactInputSpec::new("sha1", "ff"));
        assert!(matches!(one.exactly_one(), Ok(SubjectInput::Artifact(_))));
    }

    #[test]
    fn vulnerability_wire_shape_is_externally_tagged() {
        let json = r#"{"cve":{"year":"2019","cveId":"CVE-2019-13110"}}"#;
        let parsed: VulnerabilityInput = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, VulnerabilityInput::cve("2019", "CVE-2019-13110"));

        let flags: MatchFlags = serde_json::from_str(r#"{"pkg":"ALL_VERSIONS"}"#).unwrap();
        assert_eq!(flags, MatchFlags::ALL_VERSIONS);
    }

    #[test]
    fn package_spec_accepts_omitted_optionals() {
        let json = r#"{"type":"pypi","name":"django"}"#;
        let parsed: PkgInputSpec = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.pkg_type, "pypi");
        assert!(parsed.namespace.is_none());
        assert!(parsed.qualifiers.is_empty());
    }
}
