//! Demonstration data set.
//!
//! Timestamps are fixed so that re-seeding an existing snapshot is a no-op.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};

use supplygraph_assembler::IngestRequest;
use supplygraph_model::{
    ArtifactInputSpec, BuilderInputSpec, CertifyVulnPayload, DependencyType, MatchFlags,
    PackageOrArtifactInput, PackageOrSourceInput, PackageSourceOrArtifactInput, PkgInputSpec,
    Provenance, ScorecardCheck, ScorecardPayload, SlsaPayload, SlsaPredicate, SourceInputSpec,
    VulnerabilityInput,
};

const ORIGIN: &str = "Demo ingestion";

fn prov(justification: &str) -> Provenance {
    Provenance::new(justification, ORIGIN, ORIGIN)
}

fn openssl() -> PkgInputSpec {
    PkgInputSpec::new("conan", "openssl.org", "openssl")
        .with_version("3.0.3")
        .with_qualifier("user", "bincrafters")
        .with_qualifier("channel", "stable")
}

fn django() -> PkgInputSpec {
    PkgInputSpec::new("pypi", "", "django")
}

fn tensorflow_source() -> SourceInputSpec {
    SourceInputSpec::new("git", "github", "github.com/tensorflow/tensorflow").with_tag("v2.12.0")
}

fn guac_source() -> SourceInputSpec {
    SourceInputSpec::new("git", "github", "github.com/guacsec/guac").with_tag("v0.0.1")
}

fn guac_artifact() -> ArtifactInputSpec {
    ArtifactInputSpec::new(
        "sha256",
        "6bbb0da1891646e58eb3e6a63af3a6fc3c8eb5a0d44824cba581d2e14a0450cf",
    )
}

fn debian_artifact() -> ArtifactInputSpec {
    ArtifactInputSpec::new(
        "sha512",
        "374AB8F711235830769AA5F0B31CE9B72C5670074B34CB302CDAFE3B606233EE92EE01E298E5701F15CC7087714CD9ABD7DDB838A6E1206B3642DE16D9FC9DD7",
    )
}

fn wheel_artifact() -> ArtifactInputSpec {
    ArtifactInputSpec::new("sha1", "5a787865sd676dacb0142afa0b83029cd7befd9")
}

fn scan(at: DateTime<Utc>, db_version: &str) -> CertifyVulnPayload {
    CertifyVulnPayload {
        time_scanned: at,
        db_uri: "MITRE".into(),
        db_version: db_version.into(),
        scanner_uri: "osv.dev".into(),
        scanner_version: "0.0.14".into(),
    }
}

fn slsa(build_type: &str, started: DateTime<Utc>) -> SlsaPayload {
    SlsaPayload {
        build_type: build_type.into(),
        slsa_version: "v1".into(),
        predicate: vec![
            SlsaPredicate {
                key: "buildDefinition.externalParameters.repository".into(),
                value: "https://github.com/octocat/hello-world".into(),
            },
            SlsaPredicate {
                key: "buildDefinition.externalParameters.ref".into(),
                value: "refs/heads/main".into(),
            },
            SlsaPredicate {
                key: "buildDefinition.resolvedDependencies.uri".into(),
                value: "git+https://github.com/octocat/hello-world@refs/heads/main".into(),
            },
        ],
        started_on: Some(started),
        finished_on: Some(started + Duration::seconds(10)),
    }
}

/// Every demonstration attestation, in ingestion order.
pub fn requests() -> Result<Vec<IngestRequest>> {
    let at = Utc
        .with_ymd_and_hms(2023, 5, 1, 12, 0, 0)
        .single()
        .context("demo timestamp")?;

    let tensorflow_pkg = PkgInputSpec::new("pypi", "", "tensorflow").with_version("2.12.0");
    let forked_source =
        SourceInputSpec::new("git", "github", "github.com/forked/tensorflow").with_tag("v2.12.0");
    let from_source = vec![PackageSourceOrArtifactInput::source(tensorflow_source())];
    let build_wheel = BuilderInputSpec {
        uri: "https://github.com/BuildPythonWheel/HubHostedActions@v1".into(),
    };

    let mut out = vec![
        // Scorecard
        IngestRequest::Scorecard {
            source: tensorflow_source(),
            scorecard: ScorecardPayload {
                checks: vec![
                    ScorecardCheck { check: "Binary_Artifacts".into(), score: 4 },
                    ScorecardCheck { check: "Branch_Protection".into(), score: 3 },
                    ScorecardCheck { check: "Code_Review".into(), score: 2 },
                    ScorecardCheck { check: "Contributors".into(), score: 1 },
                ],
                aggregate_score: 2.9,
                time_scanned: at,
                scorecard_version: "v4.10.2".into(),
                scorecard_commit: "5e6a521".into(),
            },
            provenance: prov(""),
        },
        // SLSA: source to package, artifact, fork, then a mixed build
        IngestRequest::Slsa {
            subject: PackageSourceOrArtifactInput::package(tensorflow_pkg.clone()),
            builder: build_wheel.clone(),
            materials: from_source.clone(),
            slsa: slsa("Test:Source->Package", at),
            provenance: prov(""),
        },
        IngestRequest::Slsa {
            subject: PackageSourceOrArtifactInput::artifact(wheel_artifact()),
            builder: build_wheel,
            materials: from_source.clone(),
            slsa: slsa("Test:Source->Artifact", at),
            provenance: prov(""),
        },
        IngestRequest::Slsa {
            subject: PackageSourceOrArtifactInput::source(forked_source.clone()),
            builder: BuilderInputSpec {
                uri: "https://github.com/CreateFork/HubHostedActions@v1".into(),
            },
            materials: from_source,
            slsa: slsa("Test:Source->Source", at),
            provenance: prov(""),
        },
        IngestRequest::Slsa {
            subject: PackageSourceOrArtifactInput::artifact(ArtifactInputSpec::new(
                "sha1",
                "0123456789abcdef0000000fedcba9876543210",
            )),
            builder: BuilderInputSpec {
                uri: "https://github.com/MixedBuild/HubHostedActions@v1".into(),
            },
            materials: vec![
                PackageSourceOrArtifactInput::package(tensorflow_pkg),
                PackageSourceOrArtifactInput::artifact(wheel_artifact()),
                PackageSourceOrArtifactInput::source(forked_source),
            ],
            slsa: slsa("Test:Mixed-build", at),
            provenance: prov(""),
        },
    ];

    // Dependencies
    for (package, justification) in [
        (
            PkgInputSpec::new("deb", "ubuntu", "dpkg")
                .with_version("1.19.0.4")
                .with_qualifier("arch", "amd64"),
            "deb: part of SBOM - openssl",
        ),
        (
            PkgInputSpec::new("docker", "smartentry", "debian"),
            "docker: part of SBOM - openssl",
        ),
    ] {
        out.push(IngestRequest::IsDependency {
            package,
            depends_on: PkgInputSpec::new("conan", "openssl.org", "openssl"),
            version_range: "3.0.3".into(),
            dependency_type: DependencyType::Unknown,
            provenance: prov(justification),
        });
    }

    // Occurrences
    out.extend([
        IngestRequest::IsOccurrence {
            subject: PackageOrSourceInput {
                package: Some(openssl()),
                source: None,
            },
            artifact: wheel_artifact(),
            provenance: prov("this artifact is an occurrence of this openssl"),
        },
        IngestRequest::IsOccurrence {
            subject: PackageOrSourceInput {
                package: Some(PkgInputSpec::new("docker", "smartentry", "debian")),
                source: None,
            },
            artifact: debian_artifact(),
            provenance: prov("this artifact is an occurrence of this debian"),
        },
        IngestRequest::IsOccurrence {
            subject: PackageOrSourceInput {
                package: None,
                source: Some(guac_source()),
            },
            artifact: guac_artifact(),
            provenance: prov("this artifact is an occurrence of this source"),
        },
    ]);

    // Vulnerability certifications
    for vulnerability in [
        VulnerabilityInput::cve("2019", "CVE-2019-13110"),
        VulnerabilityInput::osv("CVE-2019-13110"),
        VulnerabilityInput::ghsa("GHSA-h45f-rjvw-2rv2"),
    ] {
        out.push(IngestRequest::CertifyVuln {
            package: openssl(),
            vulnerability,
            scan: scan(at, "v1.0.0"),
            provenance: prov(""),
        });
    }
    for vulnerability in [
        VulnerabilityInput::cve("2018", "CVE-2018-12310"),
        VulnerabilityInput::osv("CVE-2018-12310"),
        VulnerabilityInput::ghsa("GHSA-f45f-jj4w-2rv2"),
    ] {
        out.push(IngestRequest::CertifyVuln {
            package: django(),
            vulnerability,
            scan: scan(at, "v1.2.0"),
            provenance: prov(""),
        });
    }

    // Package equivalences
    let debian = |version: Option<&str>| {
        let spec = PkgInputSpec::new("deb", "debian", "attr");
        match version {
            Some(v) => spec.with_version(v),
            None => spec,
        }
    };
    out.extend([
        IngestRequest::CertifyPkg {
            package: openssl(),
            other: PkgInputSpec::new("conan", "openssl.org", "openssl").with_version("3.0.3"),
            provenance: prov("these two openssl packages are the same"),
        },
        IngestRequest::CertifyPkg {
            package: django(),
            other: django().with_version("1.11.1"),
            provenance: prov("these two pypi packages are the same"),
        },
        IngestRequest::CertifyPkg {
            package: debian(Some("1:2.4.47-2")),
            other: debian(None),
            provenance: prov("these two debian packages are the same"),
        },
        IngestRequest::CertifyPkg {
            package: PkgInputSpec::new("deb", "debian", "dpkg"),
            other: PkgInputSpec::new("deb", "ubuntu", "attr"),
            provenance: prov("these two dpkg packages are the same"),
        },
    ]);

    // Bad certifications
    out.extend([
        IngestRequest::CertifyBad {
            subject: PackageSourceOrArtifactInput::package(openssl()),
            match_flag: Some(MatchFlags::SPECIFIC_VERSION),
            known_since: Some(at),
            provenance: prov("this package as this specific version has a malware"),
        },
        IngestRequest::CertifyBad {
            subject: PackageSourceOrArtifactInput::package(django()),
            match_flag: Some(MatchFlags::ALL_VERSIONS),
            known_since: Some(at),
            provenance: prov("this package (all versions) is a known typo-squat"),
        },
        IngestRequest::CertifyBad {
            subject: PackageSourceOrArtifactInput::source(guac_source()),
            match_flag: None,
            known_since: Some(at),
            provenance: prov("this source repo is owned by a known attacker"),
        },
        IngestRequest::CertifyBad {
            subject: PackageSourceOrArtifactInput::artifact(guac_artifact()),
            match_flag: None,
            known_since: Some(at),
            provenance: prov("this artifact is associated with a malware package"),
        },
    ]);

    // Artifact equivalences
    out.extend([
        IngestRequest::HashEqual {
            artifact: guac_artifact(),
            other: ArtifactInputSpec::new("sha1", "7A8F47318E4676DACB0142AFA0B83029CD7BEFD9"),
            provenance: prov("these sha1 and sha256 artifacts are the same"),
        },
        IngestRequest::HashEqual {
            artifact: guac_artifact(),
            other: debian_artifact(),
            provenance: prov("these sha256 and sha512 artifacts are the same"),
        },
    ]);

    // SBOM locations
    out.extend([
        IngestRequest::HasSbom {
            subject: PackageOrSourceInput {
                package: Some(openssl()),
                source: None,
            },
            uri: "uri:location of package SBOM".into(),
            provenance: prov(""),
        },
        IngestRequest::HasSbom {
            subject: PackageOrSourceInput {
                package: None,
                source: Some(guac_source()),
            },
            uri: "uri:location of source SBOM".into(),
            provenance: prov(""),
        },
    ]);

    // Source locations
    out.extend([
        IngestRequest::HasSourceAt {
            package: django(),
            match_flag: MatchFlags::ALL_VERSIONS,
            source: SourceInputSpec::new("git", "github", "https://github.com/django/django")
                .with_tag("1.11.1"),
            known_since: at,
            provenance: prov("django located at the following source based on deps.dev"),
        },
        IngestRequest::HasSourceAt {
            package: PkgInputSpec::new("pypi", "", "kubetest")
                .with_version("0.9.5")
                .with_subpath(""),
            match_flag: MatchFlags::SPECIFIC_VERSION,
            source: SourceInputSpec::new("git", "github", "https://github.com/vapor-ware/kubetest")
                .with_tag("0.9.5"),
            known_since: at,
            provenance: prov("kubetest located at the following source based on deps.dev"),
        },
    ]);

    // Vulnerability aliases
    out.extend([
        IngestRequest::IsVulnerability {
            osv_id: "CVE-2019-13110".into(),
            vulnerability: VulnerabilityInput::cve("2019", "CVE-2019-13110"),
            provenance: prov("OSV maps to CVE"),
        },
        IngestRequest::IsVulnerability {
            osv_id: "GHSA-h45f-rjvw-2rv2".into(),
            vulnerability: VulnerabilityInput::ghsa("GHSA-h45f-rjvw-2rv2"),
            provenance: prov("OSV maps to GHSA"),
        },
    ]);

    // VEX statements
    let vex = |subject: PackageOrArtifactInput, vulnerability, justification: &str| {
        IngestRequest::VexStatement {
            subject,
            vulnerability,
            status: None,
            statement: String::new(),
            status_notes: String::new(),
            known_since: at,
            provenance: prov(justification),
        }
    };
    let openssl_subject = PackageOrArtifactInput {
        package: Some(openssl()),
        artifact: None,
    };
    let artifact_subject = PackageOrArtifactInput {
        package: None,
        artifact: Some(guac_artifact()),
    };
    out.extend([
        vex(
            openssl_subject.clone(),
            VulnerabilityInput::cve("2019", "CVE-2019-13110"),
            "this package is not vulnerable to this CVE",
        ),
        vex(
            openssl_subject,
            VulnerabilityInput::ghsa("GHSA-h45f-rjvw-2rv2"),
            "this package is not vulnerable to this GHSA",
        ),
        vex(
            artifact_subject.clone(),
            VulnerabilityInput::cve("2018", "CVE-2018-43610"),
            "this artifact is not vulnerable to this CVE",
        ),
        vex(
            artifact_subject,
            VulnerabilityInput::ghsa("GHSA-hj5f-4gvw-4rv2"),
            "this artifact is not vulnerable to this GHSA",
        ),
    ]);

    Ok(out)
}
