//! Supplygraph assembler
//!
//! The write and read paths of the supply-chain graph, on top of any
//! [`GraphBackend`]:
//!
//! - `resolve`: entity upserts, root first down each hierarchy
//! - `ingest`: attestation requests to idempotent edges
//! - `match_flags`: all-versions vs specific-version scoping
//! - `equivalence`: HashEqual / CertifyPkg / IsVulnerability closure
//! - `query`: nested entity trees and grouped attestation results
//!
//! [`SupplyGraph`] bundles a backend with both paths.

pub mod config;
pub mod context;
pub mod equivalence;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod match_flags;
pub mod query;
pub mod resolve;
pub mod tree;

use std::sync::Arc;

use supplygraph_model::{
    ArtifactInputSpec, BuilderInputSpec, NodeId, PkgInputSpec, SourceInputSpec,
    VulnerabilityInput,
};
use supplygraph_store::{GraphBackend, MemoryBackend, StoreStats};

pub use config::{AssemblerConfig, ConfigError};
pub use context::{CallContext, CancellationToken};
pub use equivalence::{equivalence_edge, EquivalenceCache};
pub use error::{GraphError, Result};
pub use filter::{
    ArtifactSpec, AttestationFilter, BuilderSpec, EntityFilter, PkgSpec, QualifierSpec,
    SourceSpec, VulnerabilityFamily, VulnerabilitySpec,
};
pub use ingest::{BatchReport, IngestRequest, Ingested, Ingestor};
pub use query::QueryAssembler;
pub use resolve::{PackageLevel, Resolved};
pub use tree::{
    Artifact, AttestationGroup, AttestationView, Builder, EndpointView, EntityView, Package,
    PackageName, PackageNamespace, PackageQualifier, PackageVersion, Source, SourceName,
    SourceNamespace, Vulnerability,
};

/// A backend plus its ingestion and query paths.
pub struct SupplyGraph<B> {
    backend: Arc<B>,
    ingestor: Ingestor<B>,
    assembler: QueryAssembler<B>,
}

impl<B> Clone for SupplyGraph<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            ingestor: self.ingestor.clone(),
            assembler: self.assembler.clone(),
        }
    }
}

impl SupplyGraph<MemoryBackend> {
    pub fn in_memory(config: AssemblerConfig) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), config)
    }
}

impl<B: GraphBackend> SupplyGraph<B> {
    pub fn new(backend: Arc<B>, config: AssemblerConfig) -> Self {
        Self {
            ingestor: Ingestor::new(Arc::clone(&backend)),
            assembler: QueryAssembler::new(Arc::clone(&backend), config),
            backend,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn config(&self) -> &AssemblerConfig {
        self.assembler.config()
    }

    pub fn ingestor(&self) -> &Ingestor<B> {
        &self.ingestor
    }

    pub fn assembler(&self) -> &QueryAssembler<B> {
        &self.assembler
    }

    // ------------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------------

    pub fn ingest(&self, ctx: &CallContext, request: &IngestRequest) -> Result<Ingested> {
        self.ingestor.ingest(ctx, request)
    }

    pub fn ingest_batch(&self, ctx: &CallContext, requests: &[IngestRequest]) -> BatchReport {
        self.ingestor.ingest_batch(ctx, requests)
    }

    pub fn ingest_package(&self, ctx: &CallContext, spec: &PkgInputSpec) -> Result<Resolved> {
        self.ingestor.ingest_package(ctx, spec)
    }

    pub fn ingest_source(&self, ctx: &CallContext, spec: &SourceInputSpec) -> Result<Resolved> {
        self.ingestor.ingest_source(ctx, spec)
    }

    pub fn ingest_artifact(&self, ctx: &CallContext, spec: &ArtifactInputSpec) -> Result<Resolved> {
        self.ingestor.ingest_artifact(ctx, spec)
    }

    pub fn ingest_builder(&self, ctx: &CallContext, spec: &BuilderInputSpec) -> Result<Resolved> {
        self.ingestor.ingest_builder(ctx, spec)
    }

    pub fn ingest_vulnerability(
        &self,
        ctx: &CallContext,
        input: &VulnerabilityInput,
    ) -> Result<Resolved> {
        self.ingestor.ingest_vulnerability(ctx, input)
    }

    // ------------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------------

    pub fn packages(&self, ctx: &CallContext, spec: &PkgSpec) -> Result<Vec<Package>> {
        self.assembler.packages(ctx, spec)
    }

    pub fn sources(&self, ctx: &CallContext, spec: &SourceSpec) -> Result<Vec<Source>> {
        self.assembler.sources(ctx, spec)
    }

    pub fn artifacts(&self, ctx: &CallContext, spec: &ArtifactSpec) -> Result<Vec<Artifact>> {
        self.assembler.artifacts(ctx, spec)
    }

    pub fn builders(&self, ctx: &CallContext, spec: &BuilderSpec) -> Result<Vec<Builder>> {
        self.assembler.builders(ctx, spec)
    }

    pub fn vulnerabilities(
        &self,
        ctx: &CallContext,
        spec: &VulnerabilitySpec,
    ) -> Result<Vec<Vulnerability>> {
        self.assembler.vulnerabilities(ctx, spec)
    }

    pub fn attestations(
        &self,
        ctx: &CallContext,
        filter: &AttestationFilter,
    ) -> Result<Vec<AttestationGroup>> {
        self.assembler.attestations(ctx, filter)
    }

    pub fn widen(&self, ctx: &CallContext, filter: &EntityFilter) -> Result<Vec<EntityFilter>> {
        self.assembler.widen(ctx, filter)
    }

    pub fn equivalence_class(&self, ctx: &CallContext, node: NodeId) -> Result<Vec<NodeId>> {
        self.assembler.equivalence_class(ctx, node)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        Ok(self.backend.stats()?)
    }
}
