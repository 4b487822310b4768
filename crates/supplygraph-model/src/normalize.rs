//! Validated, normalized coordinates.
//!
//! Every canonical key is built from one of these types, never directly from
//! an input spec. Normalization rules:
//!
//! - strings are trimmed, and a missing optional field equals an empty one
//! - qualifier keys are non-empty and unique, then sorted by key
//! - a source names at most one of tag and commit
//! - artifact algorithm and digest are lower-cased
//! - vulnerability ids are kept verbatim (trimmed)

use serde::{Deserialize, Serialize};

use crate::error::SpecError;
use crate::input::{
    ArtifactInputSpec, BuilderInputSpec, PkgInputSpec, SourceInputSpec, VulnerabilityInput,
};

fn clean(value: &str) -> String {
    value.trim().to_string()
}

fn clean_opt(value: Option<&String>) -> String {
    value.map(|v| clean(v)).unwrap_or_default()
}

fn required(value: &str, field: &'static str) -> Result<String, SpecError> {
    let value = clean(value);
    if value.is_empty() {
        return Err(SpecError::EmptyField { field });
    }
    Ok(value)
}

// ============================================================================
// Packages
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageCoordinate {
    pub pkg_type: String,
    pub namespace: String,
    pub name: String,
    pub version: String,
    /// Sorted by key; keys are unique.
    pub qualifiers: Vec<(String, String)>,
    pub subpath: String,
}

impl PackageCoordinate {
    pub fn from_spec(spec: &PkgInputSpec) -> Result<Self, SpecError> {
        let mut qualifiers: Vec<(String, String)> = Vec::with_capacity(spec.qualifiers.len());
        for q in &spec.qualifiers {
            let key = clean(&q.key);
            if key.is_empty() {
                return Err(SpecError::EmptyQualifierKey);
            }
            if qualifiers.iter().any(|(k, _)| *k == key) {
                return Err(SpecError::DuplicateQualifier { key });
            }
            qualifiers.push((key, clean(&q.value)));
        }
        qualifiers.sort();

        Ok(Self {
            pkg_type: required(&spec.pkg_type, "type")?,
            namespace: clean_opt(spec.namespace.as_ref()),
            name: required(&spec.name, "name")?,
            version: clean_opt(spec.version.as_ref()),
            qualifiers,
            subpath: clean_opt(spec.subpath.as_ref()),
        })
    }

    pub fn has_version(&self) -> bool {
        !self.version.is_empty()
    }

    /// Whether anything below the name level is set.
    pub fn is_version_scoped(&self) -> bool {
        self.has_version() || !self.qualifiers.is_empty() || !self.subpath.is_empty()
    }

    /// Same type, namespace and name.
    pub fn same_name(&self, other: &PackageCoordinate) -> bool {
        self.pkg_type == other.pkg_type
            && self.namespace == other.namespace
            && self.name == other.name
    }
}

// ============================================================================
// Sources
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceCoordinate {
    pub source_type: String,
    pub namespace: String,
    pub name: String,
    pub tag: String,
    pub commit: String,
}

impl SourceCoordinate {
    pub fn from_spec(spec: &SourceInputSpec) -> Result<Self, SpecError> {
        let tag = clean_opt(spec.tag.as_ref());
        let commit = clean_opt(spec.commit.as_ref());
        if !tag.is_empty() && !commit.is_empty() {
            return Err(SpecError::TagAndCommit { tag, commit });
        }
        Ok(Self {
            source_type: required(&spec.source_type, "type")?,
            namespace: clean(&spec.namespace),
            name: required(&spec.name, "name")?,
            tag,
            commit,
        })
    }
}

// ============================================================================
// Artifacts, builders, vulnerabilities
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactCoordinate {
    pub algorithm: String,
    pub digest: String,
}

impl ArtifactCoordinate {
    pub fn from_spec(spec: &ArtifactInputSpec) -> Result<Self, SpecError> {
        Ok(Self {
            algorithm: required(&spec.algorithm, "algorithm")?.to_lowercase(),
            digest: required(&spec.digest, "digest")?.to_lowercase(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuilderCoordinate {
    pub uri: String,
}

impl BuilderCoordinate {
    pub fn from_spec(spec: &BuilderInputSpec) -> Result<Self, SpecError> {
        Ok(Self {
            uri: required(&spec.uri, "uri")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VulnerabilityId {
    Cve { year: String, cve_id: String },
    Osv { osv_id: String },
    Ghsa { ghsa_id: String },
}

impl VulnerabilityId {
    pub fn from_input(input: &VulnerabilityInput) -> Result<Self, SpecError> {
        Ok(match input {
            VulnerabilityInput::Cve { year, cve_id } => Self::Cve {
                year: required(year, "year")?,
                cve_id: required(cve_id, "cveId")?,
            },
            VulnerabilityInput::Osv { osv_id } => Self::Osv {
                osv_id: required(osv_id, "osvId")?,
            },
            VulnerabilityInput::Ghsa { ghsa_id } => Self::Ghsa {
                ghsa_id: required(ghsa_id, "ghsaId")?,
            },
        })
    }

    /// The id string without its family.
    pub fn id(&self) -> &str {
        match self {
            Self::Cve { cve_id, .. } => cve_id,
            Self::Osv { osv_id } => osv_id,
            Self::Ghsa { ghsa_id } => ghsa_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_empty_optionals_are_equal() {
        let a = PkgInputSpec {
            pkg_type: "pypi".into(),
            name: "django".into(),
            ..Default::default()
        };
        let b = PkgInputSpec {
            namespace: Some("  ".into()),
            version: Some(String::new()),
            subpath: Some(String::new()),
            ..a.clone()
        };
        assert_eq!(
            PackageCoordinate::from_spec(&a).unwrap(),
            PackageCoordinate::from_spec(&b).unwrap()
        );
    }

    #[test]
    fn duplicate_qualifier_keys_are_rejected() {
        let spec = PkgInputSpec::new("conan", "openssl.org", "openssl")
            .with_qualifier("user", "bincrafters")
            .with_qualifier("user", "someone-else");
        assert_eq!(
            PackageCoordinate::from_spec(&spec),
            Err(SpecError::DuplicateQualifier { key: "user".into() })
        );

        let spec = PkgInputSpec::new("conan", "openssl.org", "openssl").with_qualifier(" ", "x");
        assert_eq!(
            PackageCoordinate::from_spec(&spec),
            Err(SpecError::EmptyQualifierKey)
        );
    }

    #[test]
    fn source_rejects_tag_and_commit() {
        let spec = SourceInputSpec::new("git", "github", "github.com/guacsec/guac")
            .with_tag("v0.0.1")
            .with_commit("fcba958b73e27cad8b5c8655d46439984d27853b");
        assert!(matches!(
            SourceCoordinate::from_spec(&spec),
            Err(SpecError::TagAndCommit { .. })
        ));
    }

    #[test]
    fn artifact_is_lowercased_but_not_hex_checked() {
        let coord =
            ArtifactCoordinate::from_spec(&ArtifactInputSpec::new("SHA1", " 7A8F47318E4676DACB ")).unwrap();
        assert_eq!(coord.algorithm, "sha1");
        assert_eq!(coord.digest, "7a8f47318e4676dacb");

        let odd = ArtifactCoordinate::from_spec(&ArtifactInputSpec::new("sha256", "5a787865sd")).unwrap();
        assert_eq!(odd.digest, "5a787865sd");
    }

    #[test]
    fn required_fields_must_be_present() {
        let spec = PkgInputSpec::new("pypi", "", "  ");
        assert_eq!(
            PackageCoordinate::from_spec(&spec),
            Err(SpecError::EmptyField { field: "name" })
        );
        assert_eq!(
            VulnerabilityId::from_input(&VulnerabilityInput::osv("")),
            Err(SpecError::EmptyField { field: "osvId" })
        );
    }
}
