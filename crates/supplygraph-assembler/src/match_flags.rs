//! Package match-flag scoping.
//!
//! `SpecificVersion` pins an attestation to one version node. `AllVersions`
//! attaches it to the name node, where it covers every version of that
//! (type, namespace, name).

use supplygraph_model::{EdgeKind, PackageCoordinate, PkgMatchType};

use crate::error::{GraphError, Result};
use crate::filter::PkgSpec;
use crate::resolve::PackageLevel;

/// Reject flag/version combinations that cannot be stored.
pub fn validate(flag: PkgMatchType, coord: &PackageCoordinate) -> Result<()> {
    match flag {
        PkgMatchType::AllVersions if coord.is_version_scoped() => Err(GraphError::validation(
            format!(
                "ALL_VERSIONS cannot target a version of {}/{}/{}",
                coord.pkg_type, coord.namespace, coord.name
            ),
        )),
        PkgMatchType::SpecificVersion if !coord.has_version() => Err(GraphError::validation(
            format!(
                "SPECIFIC_VERSION requires a version for {}/{}/{}",
                coord.pkg_type, coord.namespace, coord.name
            ),
        )),
        _ => Ok(()),
    }
}

/// The node level a flagged package subject is stored at.
pub fn subject_level(flag: PkgMatchType) -> PackageLevel {
    match flag {
        PkgMatchType::AllVersions => PackageLevel::Name,
        PkgMatchType::SpecificVersion => PackageLevel::Version,
    }
}

/// Whether an edge stored on `edge` with `flag` applies to the package
/// `query`. An inconsistent flag never applies.
pub fn applies(flag: PkgMatchType, query: &PackageCoordinate, edge: &PackageCoordinate) -> bool {
    match flag {
        PkgMatchType::AllVersions => !edge.is_version_scoped() && query.same_name(edge),
        PkgMatchType::SpecificVersion => edge.has_version() && query == edge,
    }
}

/// Which stored package levels a filter reaches for one edge kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageScope {
    /// Matching versions, each also reaching its parent name.
    VersionsWithName,
    /// Matching versions only.
    VersionsOnly,
    /// Matching names only.
    NamesOnly,
    /// Matching names and all their matching versions, independently.
    AllLevels,
}

/// Only kinds with a match flag can attach to a name on behalf of its
/// versions.
pub fn scope_for(kind: EdgeKind, spec: &PkgSpec) -> PackageScope {
    match (spec.is_version_scoped(), kind.carries_match_flag()) {
        (true, true) => PackageScope::VersionsWithName,
        (true, false) => PackageScope::VersionsOnly,
        (false, true) => PackageScope::NamesOnly,
        (false, false) => PackageScope::AllLevels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use supplygraph_model::PkgInputSpec;

    fn coord(version: Option<&str>) -> PackageCoordinate {
        let mut spec = PkgInputSpec::new("pypi", "", "django");
        if let Some(v) = version {
            spec = spec.with_version(v);
        }
        PackageCoordinate::from_spec(&spec).unwrap()
    }

    #[test]
    fn validate_rejects_inconsistent_flags() {
        assert!(validate(PkgMatchType::AllVersions, &coord(None)).is_ok());
        assert!(validate(PkgMatchType::SpecificVersion, &coord(Some("1.11.1"))).is_ok());
        assert!(matches!(
            validate(PkgMatchType::AllVersions, &coord(Some("1.11.1"))),
            Err(GraphError::Validation(_))
        ));
        assert!(matches!(
            validate(PkgMatchType::SpecificVersion, &coord(None)),
            Err(GraphError::Validation(_))
        ));
    }

    #[test]
    fn all_versions_applies_to_every_version() {
        let edge = coord(None);
        assert!(applies(PkgMatchType::AllVersions, &coord(Some("1.11.1")), &edge));
        assert!(applies(PkgMatchType::AllVersions, &coord(Some("4.2")), &edge));
        assert!(applies(PkgMatchType::AllVersions, &coord(None), &edge));
    }

    #[test]
    fn specific_version_applies_only_to_that_version() {
        let edge = coord(Some("1.11.1"));
        assert!(applies(PkgMatchType::SpecificVersion, &coord(Some("1.11.1")), &edge));
        assert!(!applies(PkgMatchType::SpecificVersion, &coord(Some("4.2")), &edge));
        assert!(!applies(PkgMatchType::SpecificVersion, &coord(None), &edge));
    }

    #[test]
    fn scope_depends_on_filter_depth_and_kind() {
        let name_only = PkgSpec::named("pypi", "", "django");
        let versioned = name_only.clone().with_version("1.11.1");
        assert_eq!(
            scope_for(EdgeKind::CertifyBad, &versioned),
            PackageScope::VersionsWithName
        );
        assert_eq!(
            scope_for(EdgeKind::CertifyBad, &name_only),
            PackageScope::NamesOnly
        );
        assert_eq!(
            scope_for(EdgeKind::CertifyVuln, &name_only),
            PackageScope::AllLevels
        );
        assert_eq!(
            scope_for(EdgeKind::CertifyVuln, &versioned),
            PackageScope::VersionsOnly
        );
    }
}
