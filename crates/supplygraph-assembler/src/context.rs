//! Per-call cancellation and deadlines.
//!
//! Every store call made on behalf of a request goes through [`Guarded`].
//! Read guards check the [`CallContext`] before each call. Write guards check
//! it once, when the write begins, and then run the whole unit (a node chain
//! plus its edge) to completion, so a cancellation never leaves part of an
//! upsert behind. A tripped context surfaces as `GraphError::Cancelled`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use supplygraph_model::{CanonicalKey, EdgeId, EdgeKind, EdgeRecord, NodeId, NodeRecord};
use supplygraph_store::{GraphBackend, NewEdge, NewNode, ScanFilter};

use crate::error::{GraphError, Result};

/// Shared cancellation flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(GraphError::Cancelled);
            }
        }
        Ok(())
    }
}

/// A backend borrowed for the duration of one call.
pub(crate) struct Guarded<'a, B: ?Sized> {
    backend: &'a B,
    ctx: &'a CallContext,
    committed: bool,
}

impl<'a, B: GraphBackend + ?Sized> Guarded<'a, B> {
    /// Checks `ctx` before every call.
    pub(crate) fn new(backend: &'a B, ctx: &'a CallContext) -> Self {
        Self {
            backend,
            ctx,
            committed: false,
        }
    }

    /// Checks `ctx` once; every call after that runs regardless of it.
    pub(crate) fn begin_write(backend: &'a B, ctx: &'a CallContext) -> Result<Self> {
        ctx.check()?;
        Ok(Self {
            backend,
            ctx,
            committed: true,
        })
    }

    fn gate(&self) -> Result<()> {
        if self.committed {
            return Ok(());
        }
        self.ctx.check()
    }

    pub(crate) fn find_by_key(&self, key: &CanonicalKey) -> Result<Option<NodeId>> {
        self.gate()?;
        Ok(self.backend.find_by_key(key)?)
    }

    pub(crate) fn insert_if_absent(&self, node: NewNode) -> Result<(NodeId, bool)> {
        self.gate()?;
        Ok(self.backend.insert_if_absent(node)?)
    }

    pub(crate) fn insert_edge(&self, edge: NewEdge) -> Result<(EdgeId, bool)> {
        self.gate()?;
        Ok(self.backend.insert_edge(edge)?)
    }

    pub(crate) fn scan(&self, filter: &ScanFilter) -> Result<Vec<NodeId>> {
        self.gate()?;
        Ok(self.backend.scan(filter)?)
    }

    pub(crate) fn neighbors(&self, node: NodeId, kind: EdgeKind) -> Result<Vec<EdgeId>> {
        self.gate()?;
        Ok(self.backend.neighbors(node, kind)?)
    }

    pub(crate) fn scan_edges(&self, kind: EdgeKind) -> Result<Vec<EdgeId>> {
        self.gate()?;
        Ok(self.backend.scan_edges(kind)?)
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<Option<NodeRecord>> {
        self.gate()?;
        Ok(self.backend.node(id)?)
    }

    pub(crate) fn edge(&self, id: EdgeId) -> Result<Option<EdgeRecord>> {
        self.gate()?;
        Ok(self.backend.edge(id)?)
    }

    /// Child nodes of `parent` with their keys, in insertion order.
    pub(crate) fn children(
        &self,
        kind: supplygraph_model::NodeKind,
        parent: Option<NodeId>,
    ) -> Result<Vec<NodeRecord>> {
        let filter = match parent {
            Some(p) => ScanFilter::children(kind, p),
            None => ScanFilter::all(kind),
        };
        let mut out = Vec::new();
        for id in self.scan(&filter)? {
            if let Some(record) = self.node(id)? {
                out.push(record);
            }
        }
        Ok(out)
    }
}
