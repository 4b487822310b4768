//! Supplygraph persistence contract
//!
//! The assembler is written against [`GraphBackend`] only. A backend must:
//!
//! - keep at most one node per [`CanonicalKey`] and at most one edge per
//!   [`EdgeKey`], even when callers race on the same key
//! - never expose a half-written node or edge to readers
//! - return scan results in insertion order
//!
//! [`MemoryBackend`] is the in-process implementation, with binary snapshots.

pub mod memory;
pub mod snapshot;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use supplygraph_model::{
    AttestationPayload, CanonicalKey, EdgeId, EdgeKey, EdgeKind, EdgeRecord, Endpoint, NodeId,
    NodeKind, NodeRecord, Provenance,
};

pub use memory::MemoryBackend;
pub use snapshot::{SNAPSHOT_MAGIC, SNAPSHOT_VERSION};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("corrupt snapshot: {reason}")]
    Corrupt { reason: String },
    #[error("snapshot i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::Corrupt {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A node to create if its key is not stored yet.
#[derive(Debug, Clone)]
pub struct NewNode {
    pub key: CanonicalKey,
    /// Must already be stored; the backend does not resolve parents.
    pub parent: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct NewEdge {
    pub key: EdgeKey,
    pub endpoints: Vec<Endpoint>,
    pub provenance: Provenance,
    pub payload: AttestationPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanFilter {
    pub kind: NodeKind,
    /// Restrict to direct children of this node.
    pub parent: Option<NodeId>,
}

impl ScanFilter {
    pub fn all(kind: NodeKind) -> Self {
        Self { kind, parent: None }
    }

    pub fn children(kind: NodeKind, parent: NodeId) -> Self {
        Self {
            kind,
            parent: Some(parent),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub nodes: u64,
    pub edges: u64,
    pub nodes_by_kind: BTreeMap<NodeKind, u64>,
    pub edges_by_kind: BTreeMap<EdgeKind, u64>,
}

pub trait GraphBackend: Send + Sync {
    fn find_by_key(&self, key: &CanonicalKey) -> Result<Option<NodeId>>;

    /// Returns the node for `node.key`, creating it if absent. The flag is
    /// true for exactly one caller per key.
    fn insert_if_absent(&self, node: NewNode) -> Result<(NodeId, bool)>;

    /// Idempotent on `edge.key`.
    fn insert_edge(&self, edge: NewEdge) -> Result<(EdgeId, bool)>;

    fn scan(&self, filter: &ScanFilter) -> Result<Vec<NodeId>>;

    /// Edges of `kind` with `node` at any endpoint, in insertion order.
    fn neighbors(&self, node: NodeId, kind: EdgeKind) -> Result<Vec<EdgeId>>;

    fn scan_edges(&self, kind: EdgeKind) -> Result<Vec<EdgeId>>;

    fn node(&self, id: NodeId) -> Result<Option<NodeRecord>>;

    fn edge(&self, id: EdgeId) -> Result<Option<EdgeRecord>>;

    fn stats(&self) -> Result<StoreStats>;
}
