//! JSON shapes accepted and printed by the CLI.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use supplygraph_assembler::{
    ArtifactSpec, AttestationFilter, BatchReport, BuilderSpec, CallContext, EntityFilter,
    IngestRequest, PkgSpec, SourceSpec, SupplyGraph, VulnerabilitySpec,
};
use supplygraph_model::{EdgeId, EdgeKind, NodeId};
use supplygraph_store::GraphBackend;

/// One query, tagged by `query`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "query", rename_all = "camelCase")]
pub enum QueryRequest {
    Packages {
        #[serde(default)]
        filter: PkgSpec,
    },
    Sources {
        #[serde(default)]
        filter: SourceSpec,
    },
    Artifacts {
        #[serde(default)]
        filter: ArtifactSpec,
    },
    Builders {
        #[serde(default)]
        filter: BuilderSpec,
    },
    Vulnerabilities {
        #[serde(default)]
        filter: VulnerabilitySpec,
    },
    Attestations {
        filter: AttestationFilter,
    },
    Widen {
        filter: EntityFilter,
    },
    EquivalenceClass {
        node: NodeId,
    },
}

impl QueryRequest {
    pub fn run<B: GraphBackend>(&self, graph: &SupplyGraph<B>, ctx: &CallContext) -> Result<Value> {
        let value = match self {
            QueryRequest::Packages { filter } => serde_json::to_value(graph.packages(ctx, filter)?)?,
            QueryRequest::Sources { filter } => serde_json::to_value(graph.sources(ctx, filter)?)?,
            QueryRequest::Artifacts { filter } => {
                serde_json::to_value(graph.artifacts(ctx, filter)?)?
            }
            QueryRequest::Builders { filter } => serde_json::to_value(graph.builders(ctx, filter)?)?,
            QueryRequest::Vulnerabilities { filter } => {
                serde_json::to_value(graph.vulnerabilities(ctx, filter)?)?
            }
            QueryRequest::Attestations { filter } => {
                serde_json::to_value(graph.attestations(ctx, filter)?)?
            }
            QueryRequest::Widen { filter } => serde_json::to_value(graph.widen(ctx, filter)?)?,
            QueryRequest::EquivalenceClass { node } => {
                serde_json::to_value(graph.equivalence_class(ctx, *node)?)?
            }
        };
        Ok(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Created,
    Present,
    Failed,
}

/// Per-item outcome line for an ingested batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchLine {
    pub index: usize,
    pub kind: EdgeKind,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge: Option<EdgeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retryable: bool,
}

pub fn batch_lines(requests: &[IngestRequest], report: &BatchReport) -> Vec<BatchLine> {
    requests
        .iter()
        .zip(&report.items)
        .enumerate()
        .map(|(index, (request, item))| match item {
            Ok(ingested) => BatchLine {
                index,
                kind: ingested.kind,
                status: if ingested.created {
                    ItemStatus::Created
                } else {
                    ItemStatus::Present
                },
                edge: Some(ingested.edge),
                error: None,
                retryable: false,
            },
            Err(err) => BatchLine {
                index,
                kind: request.kind(),
                status: ItemStatus::Failed,
                edge: None,
                error: Some(err.to_string()),
                retryable: err.is_retryable(),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_request_tags() {
        let q: QueryRequest = serde_json::from_str(
            r#"{"query": "packages", "filter": {"type": "conan", "qualifiers": [{"key": "user", "value": "bincrafters"}]}}"#,
        )
        .unwrap();
        assert!(matches!(q, QueryRequest::Packages { ref filter } if filter.qualifiers.len() == 1));

        let q: QueryRequest = serde_json::from_str(r#"{"query": "vulnerabilities"}"#).unwrap();
        assert!(matches!(q, QueryRequest::Vulnerabilities { .. }));

        let q: QueryRequest = serde_json::from_str(
            r#"{"query": "attestations", "filter": {"kind": "CertifyVuln", "endpoints": [{"vulnerability": {"family": "cve"}}]}}"#,
        )
        .unwrap();
        assert!(matches!(q, QueryRequest::Attestations { ref filter } if filter.kind == EdgeKind::CertifyVuln));
    }

    #[test]
    fn query_runs_against_graph() {
        let graph = SupplyGraph::<supplygraph_store::MemoryBackend>::in_memory(Default::default());
        let ctx = CallContext::background();
        for request in crate::demo::requests().unwrap() {
            graph.ingest(&ctx, &request).unwrap();
        }

        let q: QueryRequest = serde_json::from_str(
            r#"{"query": "artifacts", "filter": {"algorithm": "sha1"}}"#,
        )
        .unwrap();
        let value = q.run(&graph, &ctx).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(3));
    }
}
