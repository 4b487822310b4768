//! Attestation ingestion.
//!
//! Each request resolves its endpoints through the entity resolver, checks
//! kind-specific structure, and upserts one edge whose identity is
//! (kind, endpoints, provenance, payload). Re-sending the same request is a
//! no-op; changing any provenance field adds a second edge.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use supplygraph_model::digest::fingerprint;
use supplygraph_model::{
    ArtifactInputSpec, AttestationPayload, BuilderInputSpec, CertifyClaim, CertifyVulnPayload,
    DependencyType, DiscriminantError, EdgeId, EdgeKey, EdgeKind, Endpoint, HasSourceAtPayload,
    IsDependencyPayload, MatchFlags, PackageCoordinate, PackageOrArtifactInput,
    PackageOrSourceInput, PackageSourceOrArtifactInput, PkgInputSpec, Provenance,
    Role, ScorecardPayload, SlsaPayload, SourceInputSpec, SubjectInput, VexPayload, VexStatus,
    VulnerabilityInput,
};
use supplygraph_store::{GraphBackend, NewEdge};

use crate::context::{CallContext, Guarded};
use crate::error::{GraphError, Result};
use crate::match_flags;
use crate::resolve::{spec_error, EntityResolver, PackageLevel, Resolved};

/// One attestation to record, as it arrives from a collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum IngestRequest {
    #[serde(rename_all = "camelCase")]
    IsDependency {
        package: PkgInputSpec,
        /// Resolved at the name level; any version here is ignored.
        depends_on: PkgInputSpec,
        version_range: String,
        dependency_type: DependencyType,
        provenance: Provenance,
    },
    #[serde(rename_all = "camelCase")]
    IsOccurrence {
        subject: PackageOrSourceInput,
        artifact: ArtifactInputSpec,
        provenance: Provenance,
    },
    #[serde(rename_all = "camelCase")]
    CertifyVuln {
        package: PkgInputSpec,
        vulnerability: VulnerabilityInput,
        scan: CertifyVulnPayload,
        provenance: Provenance,
    },
    #[serde(rename_all = "camelCase")]
    IsVulnerability {
        osv_id: String,
        /// A CVE or GHSA id.
        vulnerability: VulnerabilityInput,
        provenance: Provenance,
    },
    #[serde(rename_all = "camelCase")]
    CertifyBad {
        subject: PackageSourceOrArtifactInput,
        #[serde(default)]
        match_flag: Option<MatchFlags>,
        #[serde(default)]
        known_since: Option<DateTime<Utc>>,
        provenance: Provenance,
    },
    #[serde(rename_all = "camelCase")]
    CertifyGood {
        subject: PackageSourceOrArtifactInput,
        #[serde(default)]
        match_flag: Option<MatchFlags>,
        #[serde(default)]
        known_since: Option<DateTime<Utc>>,
        provenance: Provenance,
    },
    #[serde(rename_all = "camelCase")]
    CertifyPkg {
        package: PkgInputSpec,
        other: PkgInputSpec,
        provenance: Provenance,
    },
    #[serde(rename_all = "camelCase")]
    HashEqual {
        artifact: ArtifactInputSpec,
        other: ArtifactInputSpec,
        provenance: Provenance,
    },
    #[serde(rename_all = "camelCase")]
    HasSbom {
        subject: PackageOrSourceInput,
        uri: String,
        provenance: Provenance,
    },
    #[serde(rename_all = "camelCase")]
    HasSourceAt {
        package: PkgInputSpec,
        match_flag: MatchFlags,
        source: SourceInputSpec,
        known_since: DateTime<Utc>,
        provenance: Provenance,
    },
    #[serde(rename_all = "camelCase")]
    VexStatement {
        subject: PackageOrArtifactInput,
        vulnerability: VulnerabilityInput,
        #[serde(default)]
        status: Option<VexStatus>,
        #[serde(default)]
        statement: String,
        #[serde(default)]
        status_notes: String,
        known_since: DateTime<Utc>,
        provenance: Provenance,
    },
    #[serde(rename_all = "camelCase")]
    Slsa {
        subject: PackageSourceOrArtifactInput,
        builder: BuilderInputSpec,
        #[serde(default)]
        materials: Vec<PackageSourceOrArtifactInput>,
        slsa: SlsaPayload,
        provenance: Provenance,
    },
    #[serde(rename_all = "camelCase")]
    Scorecard {
        source: SourceInputSpec,
        scorecard: ScorecardPayload,
        provenance: Provenance,
    },
}

impl IngestRequest {
    pub fn kind(&self) -> EdgeKind {
        match self {
            IngestRequest::IsDependency { .. } => EdgeKind::IsDependency,
            IngestRequest::IsOccurrence { .. } => EdgeKind::IsOccurrence,
            IngestRequest::CertifyVuln { .. } => EdgeKind::CertifyVuln,
            IngestRequest::IsVulnerability { .. } => EdgeKind::IsVulnerability,
            IngestRequest::CertifyBad { .. } => EdgeKind::CertifyBad,
            IngestRequest::CertifyGood { .. } => EdgeKind::CertifyGood,
            IngestRequest::CertifyPkg { .. } => EdgeKind::CertifyPkg,
            IngestRequest::HashEqual { .. } => EdgeKind::HashEqual,
            IngestRequest::HasSbom { .. } => EdgeKind::HasSbom,
            IngestRequest::HasSourceAt { .. } => EdgeKind::HasSourceAt,
            IngestRequest::VexStatement { .. } => EdgeKind::VexStatement,
            IngestRequest::Slsa { .. } => EdgeKind::Slsa,
            IngestRequest::Scorecard { .. } => EdgeKind::Scorecard,
        }
    }

    pub fn provenance(&self) -> &Provenance {
        match self {
            IngestRequest::IsDependency { provenance, .. }
            | IngestRequest::IsOccurrence { provenance, .. }
            | IngestRequest::CertifyVuln { provenance, .. }
            | IngestRequest::IsVulnerability { provenance, .. }
            | IngestRequest::CertifyBad { provenance, .. }
            | IngestRequest::CertifyGood { provenance, .. }
            | IngestRequest::CertifyPkg { provenance, .. }
            | IngestRequest::HashEqual { provenance, .. }
            | IngestRequest::HasSbom { provenance, .. }
            | IngestRequest::HasSourceAt { provenance, .. }
            | IngestRequest::VexStatement { provenance, .. }
            | IngestRequest::Slsa { provenance, .. }
            | IngestRequest::Scorecard { provenance, .. } => provenance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingested {
    pub edge: EdgeId,
    pub kind: EdgeKind,
    pub created: bool,
}

/// Per-item outcome of a batch. One failed item never affects another.
#[derive(Debug)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub items: Vec<Result<Ingested>>,
}

impl BatchReport {
    pub fn created(&self) -> usize {
        self.items
            .iter()
            .filter(|r| matches!(r, Ok(i) if i.created))
            .count()
    }

    pub fn reused(&self) -> usize {
        self.items
            .iter()
            .filter(|r| matches!(r, Ok(i) if !i.created))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.items.iter().filter(|r| r.is_err()).count()
    }
}

fn exactly_one<T>(
    result: std::result::Result<T, DiscriminantError>,
    role: Role,
) -> Result<T> {
    result.map_err(|e| match e {
        DiscriminantError::Missing => GraphError::MissingDiscriminant { role },
        DiscriminantError::Multiple { present } => GraphError::validation(format!(
            "{role} endpoint sets {present} of package, source and artifact; expected one"
        )),
    })
}

fn package_coord(spec: &PkgInputSpec, role: Role) -> Result<PackageCoordinate> {
    PackageCoordinate::from_spec(spec).map_err(spec_error(role))
}

/// Endpoint list plus payload, ready to become an edge.
struct Draft {
    endpoints: Vec<Endpoint>,
    payload: AttestationPayload,
}

impl Draft {
    fn pair(a: (Role, Resolved), b: (Role, Resolved), payload: AttestationPayload) -> Self {
        Self {
            endpoints: vec![Endpoint::new(a.0, a.1.node), Endpoint::new(b.0, b.1.node)],
            payload,
        }
    }

    fn single(role: Role, node: Resolved, payload: AttestationPayload) -> Self {
        Self {
            endpoints: vec![Endpoint::new(role, node.node)],
            payload,
        }
    }
}

pub struct Ingestor<B> {
    backend: Arc<B>,
}

impl<B> Clone for Ingestor<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: GraphBackend> Ingestor<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// A resolver for one unit of work. The context is checked here, once;
    /// once the writes start they all land.
    fn resolver<'a>(&'a self, ctx: &'a CallContext) -> Result<EntityResolver<'a, B>> {
        Ok(EntityResolver::new(Guarded::begin_write(
            self.backend.as_ref(),
            ctx,
        )?))
    }

    // ------------------------------------------------------------------------
    // Plain node ingestion
    // ------------------------------------------------------------------------

    /// Upserts the package down to its version node.
    pub fn ingest_package(&self, ctx: &CallContext, spec: &PkgInputSpec) -> Result<Resolved> {
        self.resolver(ctx)?
            .package_spec(spec, PackageLevel::Version, Role::Subject)
    }

    pub fn ingest_source(&self, ctx: &CallContext, spec: &SourceInputSpec) -> Result<Resolved> {
        self.resolver(ctx)?.source_spec(spec, Role::Subject)
    }

    pub fn ingest_artifact(&self, ctx: &CallContext, spec: &ArtifactInputSpec) -> Result<Resolved> {
        self.resolver(ctx)?.artifact_spec(spec, Role::Subject)
    }

    pub fn ingest_builder(&self, ctx: &CallContext, spec: &BuilderInputSpec) -> Result<Resolved> {
        self.resolver(ctx)?.builder_spec(spec, Role::Builder)
    }

    pub fn ingest_vulnerability(
        &self,
        ctx: &CallContext,
        input: &VulnerabilityInput,
    ) -> Result<Resolved> {
        self.resolver(ctx)?
            .vulnerability_input(input, Role::Vulnerability)
    }

    // ------------------------------------------------------------------------
    // Attestations
    // ------------------------------------------------------------------------

    pub fn ingest(&self, ctx: &CallContext, request: &IngestRequest) -> Result<Ingested> {
        let kind = request.kind();
        let _span = info_span!("ingest", kind = %kind).entered();

        let resolver = self.resolver(ctx)?;
        let draft = self.draft(&resolver, request)?;
        let payload = draft.payload.normalized();
        let provenance = request.provenance().clone();
        let key = EdgeKey::new(kind, &draft.endpoints, &provenance, &payload);
        let fp = fingerprint(&key);

        let (edge, created) = resolver.store().insert_edge(NewEdge {
            key,
            endpoints: draft.endpoints,
            provenance,
            payload,
        })?;

        if created {
            info!(edge = %edge, kind = %kind, fingerprint = %fp, "attestation recorded");
        } else {
            debug!(edge = %edge, kind = %kind, fingerprint = %fp, "attestation already recorded");
        }
        Ok(Ingested {
            edge,
            kind,
            created,
        })
    }

    pub fn ingest_batch(&self, ctx: &CallContext, requests: &[IngestRequest]) -> BatchReport {
        let batch_id = Uuid::new_v4();
        let _span = info_span!("ingest_batch", batch = %batch_id, size = requests.len()).entered();

        let items: Vec<Result<Ingested>> = requests
            .iter()
            .enumerate()
            .map(|(index, request)| {
                let result = self.ingest(ctx, request);
                if let Err(err) = &result {
                    warn!(
                        index,
                        kind = %request.kind(),
                        retryable = err.is_retryable(),
                        error = %err,
                        "batch item failed"
                    );
                }
                result
            })
            .collect();

        let report = BatchReport { batch_id, items };
        info!(
            batch = %batch_id,
            created = report.created(),
            reused = report.reused(),
            failed = report.failed(),
            "batch ingested"
        );
        report
    }

    fn draft(&self, resolver: &EntityResolver<'_, B>, request: &IngestRequest) -> Result<Draft> {
        match request {
            IngestRequest::IsDependency {
                package,
                depends_on,
                version_range,
                dependency_type,
                ..
            } => {
                let subject =
                    resolver.package_spec(package, PackageLevel::Version, Role::Subject)?;
                let dependency =
                    resolver.package_spec(depends_on, PackageLevel::Name, Role::Dependency)?;
                Ok(Draft::pair(
                    (Role::Subject, subject),
                    (Role::Dependency, dependency),
                    AttestationPayload::IsDependency(IsDependencyPayload {
                        version_range: version_range.trim().to_string(),
                        dependency_type: *dependency_type,
                    }),
                ))
            }

            IngestRequest::IsOccurrence {
                subject, artifact, ..
            } => {
                let subject = exactly_one(subject.exactly_one(), Role::Subject)?;
                let subject = resolver.subject(&subject, PackageLevel::Version, Role::Subject)?;
                let artifact = resolver.artifact_spec(artifact, Role::Artifact)?;
                Ok(Draft::pair(
                    (Role::Subject, subject),
                    (Role::Artifact, artifact),
                    AttestationPayload::IsOccurrence,
                ))
            }

            IngestRequest::CertifyVuln {
                package,
                vulnerability,
                scan,
                ..
            } => {
                let subject =
                    resolver.package_spec(package, PackageLevel::Version, Role::Subject)?;
                let vuln = resolver.vulnerability_input(vulnerability, Role::Vulnerability)?;
                Ok(Draft::pair(
                    (Role::Subject, subject),
                    (Role::Vulnerability, vuln),
                    AttestationPayload::CertifyVuln(scan.clone()),
                ))
            }

            IngestRequest::IsVulnerability {
                osv_id,
                vulnerability,
                ..
            } => {
                if matches!(vulnerability, VulnerabilityInput::Osv { .. }) {
                    return Err(GraphError::validation(
                        "IsVulnerability links an OSV id to a CVE or GHSA id, not to another OSV id",
                    ));
                }
                let osv = resolver
                    .vulnerability_input(&VulnerabilityInput::osv(osv_id), Role::Peer)?;
                let other = resolver.vulnerability_input(vulnerability, Role::Peer)?;
                Ok(Draft::pair(
                    (Role::Peer, osv),
                    (Role::Peer, other),
                    AttestationPayload::IsVulnerability,
                ))
            }

            IngestRequest::CertifyBad {
                subject,
                match_flag,
                known_since,
                ..
            } => {
                let (node, claim) = self.certify(resolver, subject, *match_flag, *known_since)?;
                Ok(Draft::single(
                    Role::Subject,
                    node,
                    AttestationPayload::CertifyBad(claim),
                ))
            }

            IngestRequest::CertifyGood {
                subject,
                match_flag,
                known_since,
                ..
            } => {
                let (node, claim) = self.certify(resolver, subject, *match_flag, *known_since)?;
                Ok(Draft::single(
                    Role::Subject,
                    node,
                    AttestationPayload::CertifyGood(claim),
                ))
            }

            IngestRequest::CertifyPkg { package, other, .. } => {
                let a = self.equivalent_package(resolver, package)?;
                let b = self.equivalent_package(resolver, other)?;
                Ok(Draft::pair(
                    (Role::Peer, a),
                    (Role::Peer, b),
                    AttestationPayload::CertifyPkg,
                ))
            }

            IngestRequest::HashEqual {
                artifact, other, ..
            } => {
                let a = resolver.artifact_spec(artifact, Role::Peer)?;
                let b = resolver.artifact_spec(other, Role::Peer)?;
                Ok(Draft::pair(
                    (Role::Peer, a),
                    (Role::Peer, b),
                    AttestationPayload::HashEqual,
                ))
            }

            IngestRequest::HasSbom { subject, uri, .. } => {
                let uri = uri.trim();
                if uri.is_empty() {
                    return Err(GraphError::validation("HasSBOM requires a uri"));
                }
                let subject = exactly_one(subject.exactly_one(), Role::Subject)?;
                let subject = resolver.subject(&subject, PackageLevel::Version, Role::Subject)?;
                Ok(Draft::single(
                    Role::Subject,
                    subject,
                    AttestationPayload::HasSbom {
                        uri: uri.to_string(),
                    },
                ))
            }

            IngestRequest::HasSourceAt {
                package,
                match_flag,
                source,
                known_since,
                ..
            } => {
                let coord = package_coord(package, Role::Subject)?;
                match_flags::validate(match_flag.pkg, &coord)?;
                let subject = resolver.package(&coord, match_flags::subject_level(match_flag.pkg))?;
                let source = resolver.source_spec(source, Role::Object)?;
                Ok(Draft::pair(
                    (Role::Subject, subject),
                    (Role::Object, source),
                    AttestationPayload::HasSourceAt(HasSourceAtPayload {
                        match_flag: match_flag.pkg,
                        known_since: *known_since,
                    }),
                ))
            }

            IngestRequest::VexStatement {
                subject,
                vulnerability,
                status,
                statement,
                status_notes,
                known_since,
                ..
            } => {
                if matches!(vulnerability, VulnerabilityInput::Osv { .. }) {
                    return Err(GraphError::validation(
                        "VEX statements reference a CVE or GHSA id",
                    ));
                }
                let subject = exactly_one(subject.exactly_one(), Role::Subject)?;
                let subject = resolver.subject(&subject, PackageLevel::Version, Role::Subject)?;
                let vuln = resolver.vulnerability_input(vulnerability, Role::Vulnerability)?;
                Ok(Draft::pair(
                    (Role::Subject, subject),
                    (Role::Vulnerability, vuln),
                    AttestationPayload::VexStatement(VexPayload {
                        status: *status,
                        statement: statement.clone(),
                        status_notes: status_notes.clone(),
                        known_since: *known_since,
                    }),
                ))
            }

            IngestRequest::Slsa {
                subject,
                builder,
                materials,
                slsa,
                ..
            } => {
                let subject = exactly_one(subject.exactly_one(), Role::Subject)?;
                let subject = resolver.subject(&subject, PackageLevel::Version, Role::Subject)?;
                let builder = resolver.builder_spec(builder, Role::Builder)?;
                let mut endpoints = vec![
                    Endpoint::new(Role::Subject, subject.node),
                    Endpoint::new(Role::Builder, builder.node),
                ];
                for material in materials {
                    let material = exactly_one(material.exactly_one(), Role::Material)?;
                    let node =
                        resolver.subject(&material, PackageLevel::Version, Role::Material)?;
                    endpoints.push(Endpoint::new(Role::Material, node.node));
                }
                Ok(Draft {
                    endpoints,
                    payload: AttestationPayload::Slsa(slsa.clone()),
                })
            }

            IngestRequest::Scorecard {
                source, scorecard, ..
            } => {
                let subject = resolver.source_spec(source, Role::Subject)?;
                Ok(Draft::single(
                    Role::Subject,
                    subject,
                    AttestationPayload::Scorecard(scorecard.clone()),
                ))
            }
        }
    }

    /// Package subjects need a consistent match flag; other subjects ignore it.
    fn certify(
        &self,
        resolver: &EntityResolver<'_, B>,
        subject: &PackageSourceOrArtifactInput,
        match_flag: Option<MatchFlags>,
        known_since: Option<DateTime<Utc>>,
    ) -> Result<(Resolved, CertifyClaim)> {
        let subject = exactly_one(subject.exactly_one(), Role::Subject)?;
        match subject {
            SubjectInput::Package(spec) => {
                let flag = match_flag.map(|f| f.pkg).ok_or_else(|| {
                    GraphError::validation("certifying a package requires a match flag")
                })?;
                let coord = package_coord(&spec, Role::Subject)?;
                match_flags::validate(flag, &coord)?;
                let node = resolver.package(&coord, match_flags::subject_level(flag))?;
                Ok((
                    node,
                    CertifyClaim {
                        match_flag: Some(flag),
                        known_since,
                    },
                ))
            }
            other => {
                if match_flag.is_some() {
                    debug!("match flag ignored for a non-package subject");
                }
                let node = resolver.subject(&other, PackageLevel::Version, Role::Subject)?;
                Ok((
                    node,
                    CertifyClaim {
                        match_flag: None,
                        known_since,
                    },
                ))
            }
        }
    }

    /// Versioned packages are equivalent at the version level, bare names at
    /// the name level.
    fn equivalent_package(
        &self,
        resolver: &EntityResolver<'_, B>,
        spec: &PkgInputSpec,
    ) -> Result<Resolved> {
        let coord = package_coord(spec, Role::Peer)?;
        let level = if coord.is_version_scoped() {
            PackageLevel::Version
        } else {
            PackageLevel::Name
        };
        resolver.package(&coord, level)
    }
}
