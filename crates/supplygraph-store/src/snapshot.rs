//! Binary snapshots of a [`MemoryBackend`].
//!
//! Layout: `SGDB` magic, little-endian `u32` version, little-endian `u64`
//! body length, then a bincode body holding node and edge records in id order.
//! Indexes are rebuilt on load.

use std::path::Path;
use std::sync::atomic::Ordering;

use serde::{Deserialize, Serialize};
use tracing::info;

use supplygraph_model::{EdgeId, EdgeRecord, NodeId, NodeRecord};

use crate::memory::MemoryBackend;
use crate::{Result, StoreError};

pub const SNAPSHOT_MAGIC: &[u8; 4] = b"SGDB";
pub const SNAPSHOT_VERSION: u32 = 1;

const HEADER_LEN: usize = 4 + 4 + 8;

#[derive(Serialize, Deserialize)]
struct SnapshotBody {
    nodes: Vec<NodeRecord>,
    edges: Vec<EdgeRecord>,
}

impl MemoryBackend {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.is_closed() {
            return Err(StoreError::unavailable("backend is closed"));
        }
        let mut nodes: Vec<NodeRecord> = self.nodes.iter().map(|r| r.value().clone()).collect();
        nodes.sort_by_key(|r| r.id);
        let mut edges: Vec<EdgeRecord> = self.edges.iter().map(|r| r.value().clone()).collect();
        edges.sort_by_key(|r| r.id);

        let body = bincode::serialize(&SnapshotBody { nodes, edges })
            .map_err(|e| StoreError::corrupt(format!("encode: {e}")))?;

        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.extend_from_slice(SNAPSHOT_MAGIC);
        out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        out.extend_from_slice(&(body.len() as u64).to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN || &bytes[0..4] != SNAPSHOT_MAGIC {
            return Err(StoreError::corrupt("missing SGDB header"));
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != SNAPSHOT_VERSION {
            return Err(StoreError::corrupt(format!(
                "unsupported snapshot version {version}"
            )));
        }
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&bytes[8..HEADER_LEN]);
        let body_len = u64::from_le_bytes(len_bytes) as usize;
        let body = bytes
            .get(HEADER_LEN..HEADER_LEN.saturating_add(body_len))
            .filter(|b| b.len() == body_len)
            .ok_or_else(|| StoreError::corrupt("truncated snapshot body"))?;

        let body: SnapshotBody =
            bincode::deserialize(body).map_err(|e| StoreError::corrupt(format!("decode: {e}")))?;

        let db = MemoryBackend::new();
        let mut next_node = 0u32;
        for record in body.nodes {
            if let Some(parent) = record.parent {
                if !db.nodes.contains_key(&parent) {
                    return Err(StoreError::corrupt(format!(
                        "node {} references missing parent {parent}",
                        record.id
                    )));
                }
            }
            if db.nodes_by_key.insert(record.key.clone(), record.id).is_some() {
                return Err(StoreError::corrupt(format!("duplicate key {}", record.key)));
            }
            next_node = next_node.max(record.id.0.saturating_add(1));
            db.index_node(&record);
            db.nodes.insert(record.id, record);
        }

        let mut next_edge = 0u32;
        for record in body.edges {
            if let Some(missing) = record
                .endpoints
                .iter()
                .find(|e| !db.nodes.contains_key(&e.node))
            {
                return Err(StoreError::corrupt(format!(
                    "edge {} references missing node {}",
                    record.id, missing.node
                )));
            }
            if db.edges_by_key.insert(record.key.clone(), record.id).is_some() {
                return Err(StoreError::corrupt(format!(
                    "duplicate edge identity at {}",
                    record.id
                )));
            }
            next_edge = next_edge.max(record.id.0.saturating_add(1));
            db.index_edge(&record);
            db.edges.insert(record.id, record);
        }

        db.next_node.store(next_node, Ordering::SeqCst);
        db.next_edge.store(next_edge, Ordering::SeqCst);
        Ok(db)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, &bytes)?;
        info!(
            path = %path.display(),
            nodes = self.node_count(),
            edges = self.edge_count(),
            bytes = bytes.len(),
            "snapshot saved"
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let db = Self::from_bytes(&bytes)?;
        info!(
            path = %path.display(),
            nodes = db.node_count(),
            edges = db.edge_count(),
            "snapshot loaded"
        );
        Ok(db)
    }

    /// The next node and edge ids to be handed out.
    pub fn high_water_marks(&self) -> (NodeId, EdgeId) {
        (
            NodeId(self.next_node.load(Ordering::SeqCst)),
            EdgeId(self.next_edge.load(Ordering::SeqCst)),
        )
    }
}
