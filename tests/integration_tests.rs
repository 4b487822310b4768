//! Integration tests for the complete Supplygraph pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - Input specs → Canonical keys → Stored nodes
//! - Ingestion → Equivalence → Grouped attestation queries
//! - Snapshot → Reload → Idempotent re-ingestion
//!
//! Run with: cargo test --test integration_tests

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{TimeZone, Utc};
use tempfile::tempdir;

use supplygraph_assembler::{
    ArtifactSpec, AssemblerConfig, AttestationFilter, CallContext, CancellationToken,
    EntityFilter, EntityView, GraphError, IngestRequest, PkgSpec, SupplyGraph, VulnerabilityFamily,
    VulnerabilitySpec,
};
use supplygraph_model::{
    ArtifactInputSpec, AttestationPayload, CertifyVulnPayload, EdgeKind, MatchFlags,
    PackageSourceOrArtifactInput, PkgInputSpec, Provenance, VulnerabilityInput,
};
use supplygraph_store::{GraphBackend, MemoryBackend};

fn graph() -> SupplyGraph<MemoryBackend> {
    SupplyGraph::in_memory(AssemblerConfig::default())
}

fn ctx() -> CallContext {
    CallContext::background()
}

fn demo_prov(justification: &str) -> Provenance {
    Provenance::new(justification, "Demo ingestion", "Demo ingestion")
}

fn openssl(qualifiers: &[(&str, &str)]) -> PkgInputSpec {
    let mut spec = PkgInputSpec::new("conan", "openssl.org", "openssl").with_version("3.0.3");
    for (k, v) in qualifiers {
        spec = spec.with_qualifier(k, v);
    }
    spec
}

fn openssl_filter() -> PkgSpec {
    PkgSpec::named("conan", "openssl.org", "openssl")
        .with_version("3.0.3")
        .with_qualifier("user", "bincrafters")
        .with_qualifier("channel", "stable")
}

fn certify_cve(package: PkgInputSpec, year: &str, id: &str, collector: &str) -> IngestRequest {
    IngestRequest::CertifyVuln {
        package,
        vulnerability: VulnerabilityInput::cve(year, id),
        scan: CertifyVulnPayload {
            time_scanned: Utc.with_ymd_and_hms(2023, 5, 1, 12, 0, 0).unwrap(),
            db_uri: "MITRE".into(),
            db_version: "v1.0.0".into(),
            scanner_uri: "osv.dev".into(),
            scanner_version: "0.0.14".into(),
        },
        provenance: Provenance::new(id, "Demo ingestion", collector),
    }
}

// ============================================================================
// Idempotent upserts
// ============================================================================

#[test]
fn test_concurrent_package_upsert_creates_one_node() {
    let g = graph();
    let threads = 12;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let g = g.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                g.ingest_package(&ctx(), &openssl(&[("user", "bincrafters")]))
                    .unwrap()
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let first = results[0].node;
    assert!(results.iter().all(|r| r.node == first));
    assert_eq!(results.iter().filter(|r| r.created).count(), 1);
    assert_eq!(g.stats().unwrap().nodes, 4);
}

#[test]
fn test_identical_attestation_is_stored_once() {
    let g = graph();
    let request = certify_cve(openssl(&[]), "2019", "CVE-2019-13110", "Demo ingestion");

    let a = g.ingest(&ctx(), &request).unwrap();
    let b = g.ingest(&ctx(), &request).unwrap();
    assert_eq!(a.edge, b.edge);
    assert!(!b.created);

    // Same endpoints, different collector.
    let other = certify_cve(openssl(&[]), "2019", "CVE-2019-13110", "osv collector");
    let c = g.ingest(&ctx(), &other).unwrap();
    assert_ne!(a.edge, c.edge);

    let ea = g.backend().edge(a.edge).unwrap().unwrap();
    let ec = g.backend().edge(c.edge).unwrap().unwrap();
    assert_eq!(ea.endpoints, ec.endpoints);
}

#[test]
fn test_qualifier_order_does_not_matter() {
    let g = graph();
    let a = g
        .ingest_package(&ctx(), &openssl(&[("user", "bincrafters"), ("channel", "stable")]))
        .unwrap();
    let b = g
        .ingest_package(&ctx(), &openssl(&[("channel", "stable"), ("user", "bincrafters")]))
        .unwrap();
    assert_eq!(a.node, b.node);
    assert!(!b.created);
}

// ============================================================================
// Match flags
// ============================================================================

#[test]
fn test_match_flag_expansion() {
    let g = graph();
    let django = PkgInputSpec::new("pypi", "", "django");

    g.ingest(
        &ctx(),
        &IngestRequest::CertifyBad {
            subject: PackageSourceOrArtifactInput::package(django.clone()),
            match_flag: Some(MatchFlags::ALL_VERSIONS),
            known_since: None,
            provenance: demo_prov("this package (all versions) is a known typo-squat"),
        },
    )
    .unwrap();
    g.ingest(
        &ctx(),
        &IngestRequest::CertifyBad {
            subject: PackageSourceOrArtifactInput::package(django.clone().with_version("1.11.1")),
            match_flag: Some(MatchFlags::SPECIFIC_VERSION),
            known_since: None,
            provenance: demo_prov("this version has a malware"),
        },
    )
    .unwrap();

    let versioned = AttestationFilter::new(EdgeKind::CertifyBad).on(EntityFilter::Package(
        PkgSpec::named("pypi", "", "django").with_version("1.11.1"),
    ));
    let groups = g.attestations(&ctx(), &versioned).unwrap();
    assert_eq!(groups.len(), 1);
    let mut found: Vec<_> = groups[0]
        .attestations
        .iter()
        .map(|a| a.provenance.justification.as_str())
        .collect();
    found.sort();
    assert_eq!(
        found,
        vec![
            "this package (all versions) is a known typo-squat",
            "this version has a malware"
        ]
    );

    let bare = AttestationFilter::new(EdgeKind::CertifyBad)
        .on(EntityFilter::Package(PkgSpec::named("pypi", "", "django")));
    let groups = g.attestations(&ctx(), &bare).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].attestations.len(), 1);
    assert_eq!(
        groups[0].attestations[0].provenance.justification,
        "this package (all versions) is a known typo-squat"
    );
}

// ============================================================================
// Equivalence
// ============================================================================

#[test]
fn test_hash_equal_is_transitive_for_queries() {
    let g = graph();
    let a = ArtifactInputSpec::new(
        "sha256",
        "6bbb0da1891646e58eb3e6a63af3a6fc3c8eb5a0d44824cba581d2e14a0450cf",
    );
    let b = ArtifactInputSpec::new("sha1", "7A8F47318E4676DACB0142AFA0B83029CD7BEFD9");
    let c = ArtifactInputSpec::new("sha512", "374ab8f711235830769aa5f0b31ce9b7");

    for (x, y) in [(&a, &b), (&b, &c)] {
        g.ingest(
            &ctx(),
            &IngestRequest::HashEqual {
                artifact: x.clone(),
                other: y.clone(),
                provenance: demo_prov("same bytes"),
            },
        )
        .unwrap();
    }
    g.ingest(
        &ctx(),
        &IngestRequest::CertifyBad {
            subject: PackageSourceOrArtifactInput::artifact(c.clone()),
            match_flag: None,
            known_since: None,
            provenance: demo_prov("this artifact is associated with a malware package"),
        },
    )
    .unwrap();

    let node_a = g.ingest_artifact(&ctx(), &a).unwrap().node;
    let node_c = g.ingest_artifact(&ctx(), &c).unwrap().node;
    let class = g.equivalence_class(&ctx(), node_a).unwrap();
    assert_eq!(class.len(), 3);
    assert!(class.contains(&node_c));

    let filter = AttestationFilter::new(EdgeKind::CertifyBad).on(EntityFilter::Artifact(
        ArtifactSpec::exact("sha256", &a.digest),
    ));
    let groups = g.attestations(&ctx(), &filter).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].queried.leaf(), node_a);
    let via = groups[0].attestations[0].matched_via.as_ref().unwrap();
    assert_eq!(via.leaf(), node_c);
}

#[test]
fn test_symmetric_lookup_from_either_side() {
    let g = graph();
    g.ingest(
        &ctx(),
        &IngestRequest::IsVulnerability {
            osv_id: "GHSA-h45f-rjvw-2rv2".into(),
            vulnerability: VulnerabilityInput::ghsa("GHSA-h45f-rjvw-2rv2"),
            provenance: demo_prov("OSV maps to GHSA"),
        },
    )
    .unwrap();

    let from = |family, id: &str| {
        AttestationFilter::new(EdgeKind::IsVulnerability).on(EntityFilter::Vulnerability(
            VulnerabilitySpec::id(family, id),
        ))
    };
    let via_osv = g
        .attestations(
            &ctx(),
            &from(VulnerabilityFamily::Osv, "GHSA-h45f-rjvw-2rv2"),
        )
        .unwrap();
    let via_ghsa = g
        .attestations(
            &ctx(),
            &from(VulnerabilityFamily::Ghsa, "GHSA-h45f-rjvw-2rv2"),
        )
        .unwrap();

    assert_eq!(via_osv.len(), 1);
    assert_eq!(via_ghsa.len(), 1);
    assert_eq!(via_osv[0].attestations[0].id, via_ghsa[0].attestations[0].id);
}

#[test]
fn test_hash_equal_found_from_second_artifact() {
    let g = graph();
    let a = ArtifactInputSpec::new("sha256", "6bbb0da1891646e58eb3e6a63af3a6fc");
    let b = ArtifactInputSpec::new("sha1", "7a8f47318e4676dacb0142afa0b83029cd7befd9");
    let ingested = g
        .ingest(
            &ctx(),
            &IngestRequest::HashEqual {
                artifact: a.clone(),
                other: b.clone(),
                provenance: demo_prov("these two are the same"),
            },
        )
        .unwrap();

    for spec in [&a, &b] {
        let filter = AttestationFilter::new(EdgeKind::HashEqual).on(EntityFilter::Artifact(
            ArtifactSpec::exact(&spec.algorithm, &spec.digest),
        ));
        let groups = g.attestations(&ctx(), &filter).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].attestations.len(), 1);
        assert_eq!(groups[0].attestations[0].id, ingested.edge);
        assert!(groups[0].attestations[0].matched_via.is_none());
    }
}

// ============================================================================
// End to end
// ============================================================================

#[test]
fn test_json_batch_in_grouped_json_out() {
    let g = graph();
    let batch = r#"[
        {
            "kind": "hashEqual",
            "artifact": {"algorithm": "sha256", "digest": "6bbb0da1891646e58eb3e6a63af3a6fc"},
            "other": {"algorithm": "SHA1", "digest": "7A8F47318E4676DACB0142AFA0B83029CD7BEFD9"},
            "provenance": {"justification": "same bytes", "origin": "Demo ingestion", "collector": "Demo ingestion"}
        },
        {
            "kind": "certifyBad",
            "subject": {"artifact": {"algorithm": "sha1", "digest": "7a8f47318e4676dacb0142afa0b83029cd7befd9"}},
            "provenance": {"justification": "known malware", "origin": "Demo ingestion", "collector": "Demo ingestion"}
        }
    ]"#;
    let requests: Vec<IngestRequest> = serde_json::from_str(batch).unwrap();
    let report = g.ingest_batch(&ctx(), &requests);
    assert_eq!(report.created(), 2);
    assert_eq!(report.failed(), 0);

    let filter = AttestationFilter::new(EdgeKind::CertifyBad).on(EntityFilter::Artifact(
        ArtifactSpec::exact("sha256", "6bbb0da1891646e58eb3e6a63af3a6fc"),
    ));
    let groups = g.attestations(&ctx(), &filter).unwrap();
    let wire = serde_json::to_value(&groups).unwrap();

    let group = &wire[0];
    assert_eq!(group["queried"]["artifact"]["algorithm"], "sha256");
    let found = &group["attestations"][0];
    assert_eq!(found["kind"], "CertifyBad");
    assert_eq!(found["provenance"]["justification"], "known malware");
    assert_eq!(found["matchedVia"]["artifact"]["algorithm"], "sha1");
    assert_eq!(
        found["matchedVia"]["artifact"]["digest"],
        "7a8f47318e4676dacb0142afa0b83029cd7befd9"
    );
    let roles: Vec<&str> = found["endpoints"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["role"].as_str())
        .collect();
    assert_eq!(roles, vec!["subject"]);
}

#[test]
fn test_openssl_vulnerability_certifications() {
    let g = graph();
    let qualifiers = [("user", "bincrafters"), ("channel", "stable")];
    g.ingest(
        &ctx(),
        &certify_cve(openssl(&qualifiers), "2019", "CVE-2019-13110", "Demo ingestion"),
    )
    .unwrap();
    g.ingest(
        &ctx(),
        &certify_cve(openssl(&qualifiers), "2020", "CVE-2020-1971", "osv collector"),
    )
    .unwrap();
    // Same name and version without qualifiers is a different package.
    g.ingest(
        &ctx(),
        &certify_cve(openssl(&[]), "2021", "CVE-2021-3711", "Demo ingestion"),
    )
    .unwrap();

    let filter = AttestationFilter::new(EdgeKind::CertifyVuln)
        .on(EntityFilter::Package(openssl_filter()));
    let groups = g.attestations(&ctx(), &filter).unwrap();
    assert_eq!(groups.len(), 1);
    let records = &groups[0].attestations;
    assert_eq!(records.len(), 2);

    let mut seen = Vec::new();
    for record in records {
        assert!(matches!(record.payload, AttestationPayload::CertifyVuln(_)));
        let vuln = record
            .endpoints
            .iter()
            .find_map(|e| match &e.entity {
                EntityView::Vulnerability(v) => Some(v.vulnerability_id.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(record.provenance.justification, vuln);
        seen.push((vuln, record.provenance.collector.clone()));
    }
    seen.sort();
    assert_eq!(
        seen,
        vec![
            ("CVE-2019-13110".to_string(), "Demo ingestion".to_string()),
            ("CVE-2020-1971".to_string(), "osv collector".to_string()),
        ]
    );
}

#[test]
fn test_snapshot_round_trip_keeps_graph_idempotent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("graph.sgdb");
    let request = certify_cve(openssl(&[]), "2019", "CVE-2019-13110", "Demo ingestion");

    let g = graph();
    let first = g.ingest(&ctx(), &request).unwrap();
    g.backend().save(&path).unwrap();

    let reloaded = SupplyGraph::new(
        Arc::new(MemoryBackend::load(&path).unwrap()),
        AssemblerConfig::default(),
    );
    let again = reloaded.ingest(&ctx(), &request).unwrap();
    assert_eq!(first.edge, again.edge);
    assert!(!again.created);
    assert_eq!(reloaded.stats().unwrap(), g.stats().unwrap());
}

// ============================================================================
// Failure modes
// ============================================================================

#[test]
fn test_cancellation_and_unavailable_store_are_retryable() {
    let g = graph();
    let request = certify_cve(openssl(&[]), "2019", "CVE-2019-13110", "Demo ingestion");

    let token = CancellationToken::new();
    let cancelled = CallContext::with_token(token.clone());
    token.cancel();
    let err = g.ingest(&cancelled, &request).unwrap_err();
    assert!(matches!(err, GraphError::Cancelled));
    assert!(err.is_retryable());

    g.backend().close();
    let err = g.ingest(&ctx(), &request).unwrap_err();
    assert!(matches!(err, GraphError::StoreUnavailable(_)));
    assert!(err.is_retryable());
}

#[test]
fn test_empty_query_is_not_an_error() {
    let g = graph();
    let filter = AttestationFilter::new(EdgeKind::Slsa)
        .on(EntityFilter::Package(PkgSpec::named("npm", "", "left-pad")));
    assert!(g.attestations(&ctx(), &filter).unwrap().is_empty());
    assert!(g.packages(&ctx(), &PkgSpec::default()).unwrap().is_empty());
}
