//! In-memory backend.
//!
//! Records live in sharded concurrent maps. Ids come from monotonic atomic
//! counters and every index is a `RoaringBitmap`, so iterating an index yields
//! ids in creation order.
//!
//! Publication order for a new node or edge: allocate the id, write the
//! record, update the indexes, then release the key's entry. Everything a
//! reader can reach through an index or a key lookup is already complete.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use roaring::RoaringBitmap;
use tracing::debug;

use supplygraph_model::digest::fingerprint;
use supplygraph_model::{
    CanonicalKey, EdgeId, EdgeKey, EdgeKind, EdgeRecord, NodeId, NodeKind, NodeRecord,
};

use crate::{GraphBackend, NewEdge, NewNode, Result, ScanFilter, StoreError, StoreStats};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    pub(crate) nodes_by_key: DashMap<CanonicalKey, NodeId>,
    pub(crate) nodes: DashMap<NodeId, NodeRecord>,
    pub(crate) nodes_by_kind: DashMap<NodeKind, RoaringBitmap>,
    /// (parent, child kind) -> children
    pub(crate) children: DashMap<(NodeId, NodeKind), RoaringBitmap>,

    pub(crate) edges_by_key: DashMap<EdgeKey, EdgeId>,
    pub(crate) edges: DashMap<EdgeId, EdgeRecord>,
    pub(crate) edges_by_kind: DashMap<EdgeKind, RoaringBitmap>,
    /// (endpoint node, edge kind) -> edges touching it
    pub(crate) adjacency: DashMap<(NodeId, EdgeKind), RoaringBitmap>,

    pub(crate) next_node: AtomicU32,
    pub(crate) next_edge: AtomicU32,
    closed: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every later call with `Unavailable`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StoreError::unavailable("backend is closed"));
        }
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub(crate) fn index_node(&self, record: &NodeRecord) {
        let kind = record.key.kind();
        self.nodes_by_kind
            .entry(kind)
            .or_default()
            .insert(record.id.0);
        if let Some(parent) = record.parent {
            self.children
                .entry((parent, kind))
                .or_default()
                .insert(record.id.0);
        }
    }

    pub(crate) fn index_edge(&self, record: &EdgeRecord) {
        let kind = record.kind();
        self.edges_by_kind
            .entry(kind)
            .or_default()
            .insert(record.id.0);
        for endpoint in &record.endpoints {
            self.adjacency
                .entry((endpoint.node, kind))
                .or_default()
                .insert(record.id.0);
        }
    }

    fn allocate(counter: &AtomicU32, what: &str) -> Result<u32> {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map_err(|_| StoreError::unavailable(format!("{what} id space exhausted")))
    }
}

impl GraphBackend for MemoryBackend {
    fn find_by_key(&self, key: &CanonicalKey) -> Result<Option<NodeId>> {
        self.ensure_open()?;
        Ok(self.nodes_by_key.get(key).map(|id| *id))
    }

    fn insert_if_absent(&self, node: NewNode) -> Result<(NodeId, bool)> {
        self.ensure_open()?;
        if let Some(parent) = node.parent {
            if !self.nodes.contains_key(&parent) {
                return Err(StoreError::unavailable(format!(
                    "parent {parent} of {} is not stored",
                    node.key
                )));
            }
        }

        match self.nodes_by_key.entry(node.key.clone()) {
            Entry::Occupied(existing) => Ok((*existing.get(), false)),
            Entry::Vacant(slot) => {
                let id = NodeId(Self::allocate(&self.next_node, "node")?);
                let record = NodeRecord {
                    id,
                    key: node.key,
                    parent: node.parent,
                };
                self.nodes.insert(id, record.clone());
                self.index_node(&record);
                slot.insert(id);
                Ok((id, true))
            }
        }
    }

    fn insert_edge(&self, edge: NewEdge) -> Result<(EdgeId, bool)> {
        self.ensure_open()?;
        for endpoint in &edge.endpoints {
            if !self.nodes.contains_key(&endpoint.node) {
                return Err(StoreError::unavailable(format!(
                    "endpoint {} of {} edge is not stored",
                    endpoint.node, edge.key.kind
                )));
            }
        }

        match self.edges_by_key.entry(edge.key.clone()) {
            Entry::Occupied(existing) => Ok((*existing.get(), false)),
            Entry::Vacant(slot) => {
                let id = EdgeId(Self::allocate(&self.next_edge, "edge")?);
                let record = EdgeRecord {
                    id,
                    key: edge.key,
                    endpoints: edge.endpoints,
                    provenance: edge.provenance,
                    payload: edge.payload,
                };
                debug!(edge = %id, fingerprint = %fingerprint(&record.key), "edge created");
                self.edges.insert(id, record.clone());
                self.index_edge(&record);
                slot.insert(id);
                Ok((id, true))
            }
        }
    }

    fn scan(&self, filter: &ScanFilter) -> Result<Vec<NodeId>> {
        self.ensure_open()?;
        let bitmap = match filter.parent {
            Some(parent) => self
                .children
                .get(&(parent, filter.kind))
                .map(|b| b.clone()),
            None => self.nodes_by_kind.get(&filter.kind).map(|b| b.clone()),
        };
        Ok(bitmap
            .map(|b| b.iter().map(NodeId).collect())
            .unwrap_or_default())
    }

    fn neighbors(&self, node: NodeId, kind: EdgeKind) -> Result<Vec<EdgeId>> {
        self.ensure_open()?;
        Ok(self
            .adjacency
            .get(&(node, kind))
            .map(|b| b.iter().map(EdgeId).collect())
            .unwrap_or_default())
    }

    fn scan_edges(&self, kind: EdgeKind) -> Result<Vec<EdgeId>> {
        self.ensure_open()?;
        Ok(self
            .edges_by_kind
            .get(&kind)
            .map(|b| b.iter().map(EdgeId).collect())
            .unwrap_or_default())
    }

    fn node(&self, id: NodeId) -> Result<Option<NodeRecord>> {
        self.ensure_open()?;
        Ok(self.nodes.get(&id).map(|r| r.clone()))
    }

    fn edge(&self, id: EdgeId) -> Result<Option<EdgeRecord>> {
        self.ensure_open()?;
        Ok(self.edges.get(&id).map(|r| r.clone()))
    }

    fn stats(&self) -> Result<StoreStats> {
        self.ensure_open()?;
        let mut stats = StoreStats {
            nodes: self.nodes.len() as u64,
            edges: self.edges.len() as u64,
            ..StoreStats::default()
        };
        for entry in self.nodes_by_kind.iter() {
            stats.nodes_by_kind.insert(*entry.key(), entry.value().len());
        }
        for entry in self.edges_by_kind.iter() {
            stats.edges_by_kind.insert(*entry.key(), entry.value().len());
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use supplygraph_model::{AttestationPayload, Endpoint, Provenance, Role};

    fn artifact(digest: &str) -> NewNode {
        NewNode {
            key: CanonicalKey::Artifact {
                algorithm: "sha256".into(),
                digest: digest.into(),
            },
            parent: None,
        }
    }

    fn hash_equal(a: NodeId, b: NodeId, justification: &str) -> NewEdge {
        let endpoints = vec![Endpoint::new(Role::Peer, a), Endpoint::new(Role::Peer, b)];
        let provenance = Provenance::new(justification, "test", "test");
        let payload = AttestationPayload::HashEqual;
        NewEdge {
            key: EdgeKey::new(EdgeKind::HashEqual, &endpoints, &provenance, &payload),
            endpoints,
            provenance,
            payload,
        }
    }

    #[test]
    fn insert_if_absent_reuses_existing_node() {
        let db = MemoryBackend::new();
        let (a, created) = db.insert_if_absent(artifact("aa")).unwrap();
        assert!(created);
        let (again, created) = db.insert_if_absent(artifact("aa")).unwrap();
        assert!(!created);
        assert_eq!(a, again);
        assert_eq!(db.find_by_key(&artifact("aa").key).unwrap(), Some(a));
    }

    #[test]
    fn symmetric_edge_is_found_from_both_sides() {
        let db = MemoryBackend::new();
        let (a, _) = db.insert_if_absent(artifact("aa")).unwrap();
        let (b, _) = db.insert_if_absent(artifact("bb")).unwrap();
        let (e, created) = db.insert_edge(hash_equal(a, b, "same")).unwrap();
        assert!(created);
        let (e2, created) = db.insert_edge(hash_equal(b, a, "same")).unwrap();
        assert!(!created);
        assert_eq!(e, e2);
        assert_eq!(db.neighbors(a, EdgeKind::HashEqual).unwrap(), vec![e]);
        assert_eq!(db.neighbors(b, EdgeKind::HashEqual).unwrap(), vec![e]);
    }

    #[test]
    fn edge_with_unknown_endpoint_is_rejected() {
        let db = MemoryBackend::new();
        let (a, _) = db.insert_if_absent(artifact("aa")).unwrap();
        let err = db.insert_edge(hash_equal(a, NodeId(42), "x")).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
        assert_eq!(db.edge_count(), 0);
    }

    #[test]
    fn closed_backend_refuses_every_call() {
        let db = MemoryBackend::new();
        db.insert_if_absent(artifact("aa")).unwrap();
        db.close();
        assert!(matches!(
            db.insert_if_absent(artifact("bb")),
            Err(StoreError::Unavailable { .. })
        ));
        assert!(db.scan(&ScanFilter::all(NodeKind::Artifact)).is_err());
        assert!(db.stats().is_err());
    }
}
