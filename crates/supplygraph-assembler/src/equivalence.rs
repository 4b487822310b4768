//! Lazily computed equivalence classes.
//!
//! HashEqual, CertifyPkg and IsVulnerability are only ever asserted
//! pairwise. A class is the connected component reached by breadth-first
//! traversal over the one edge kind that applies to the start node's kind.
//! The traversal keeps a visited set and stops at a node budget, so cycles and
//! concurrent inserts cannot make it run forever. Classes are memoized for
//! the lifetime of one [`EquivalenceCache`], normally a single request.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use supplygraph_model::{EdgeKind, NodeId, NodeKind};
use supplygraph_store::GraphBackend;

use crate::context::Guarded;
use crate::error::Result;
use crate::filter::EntityFilter;

/// The equivalence edge kind for nodes of `kind`, if any.
pub fn equivalence_edge(kind: NodeKind) -> Option<EdgeKind> {
    match kind {
        NodeKind::Artifact => Some(EdgeKind::HashEqual),
        NodeKind::PackageName | NodeKind::PackageVersion => Some(EdgeKind::CertifyPkg),
        NodeKind::Cve | NodeKind::Osv | NodeKind::Ghsa => Some(EdgeKind::IsVulnerability),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct EquivalenceCache {
    classes: Mutex<HashMap<NodeId, Arc<Vec<NodeId>>>>,
}

impl EquivalenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, node: NodeId) -> Option<Arc<Vec<NodeId>>> {
        self.classes.lock().get(&node).cloned()
    }

    /// Every member shares the class.
    fn insert(&self, class: Arc<Vec<NodeId>>) {
        let mut classes = self.classes.lock();
        for member in class.iter() {
            classes.insert(*member, Arc::clone(&class));
        }
    }

    pub fn len(&self) -> usize {
        self.classes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct EquivalenceEngine<'a, B: ?Sized> {
    store: &'a Guarded<'a, B>,
    cache: &'a EquivalenceCache,
    max_nodes: usize,
}

impl<'a, B: GraphBackend + ?Sized> EquivalenceEngine<'a, B> {
    pub(crate) fn new(
        store: &'a Guarded<'a, B>,
        cache: &'a EquivalenceCache,
        max_nodes: usize,
    ) -> Self {
        Self {
            store,
            cache,
            max_nodes: max_nodes.max(1),
        }
    }

    /// The class containing `node`, in discovery order from whichever member
    /// was traversed first. Nodes without an equivalence kind form singleton
    /// classes.
    pub fn class_of(&self, node: NodeId) -> Result<Arc<Vec<NodeId>>> {
        if let Some(class) = self.cache.get(node) {
            return Ok(class);
        }
        let Some(record) = self.store.node(node)? else {
            return Ok(Arc::new(vec![node]));
        };
        let Some(edge_kind) = equivalence_edge(record.key.kind()) else {
            return Ok(Arc::new(vec![node]));
        };

        let mut visited: HashSet<NodeId> = HashSet::from([node]);
        let mut seen_edges = HashSet::new();
        let mut order = vec![node];
        let mut queue = VecDeque::from([node]);
        let mut truncated = false;

        'walk: while let Some(current) = queue.pop_front() {
            for edge_id in self.store.neighbors(current, edge_kind)? {
                if !seen_edges.insert(edge_id) {
                    continue;
                }
                let Some(edge) = self.store.edge(edge_id)? else {
                    continue;
                };
                for endpoint in &edge.endpoints {
                    if visited.contains(&endpoint.node) {
                        continue;
                    }
                    if order.len() >= self.max_nodes {
                        truncated = true;
                        break 'walk;
                    }
                    visited.insert(endpoint.node);
                    order.push(endpoint.node);
                    queue.push_back(endpoint.node);
                }
            }
        }

        if truncated {
            warn!(
                start = %node,
                kind = %edge_kind,
                budget = self.max_nodes,
                "equivalence traversal hit its node budget"
            );
        } else {
            debug!(start = %node, kind = %edge_kind, size = order.len(), "equivalence class");
        }

        let class = Arc::new(order);
        // Truncated classes are cached under the start node only.
        if truncated {
            self.cache.classes.lock().insert(node, Arc::clone(&class));
        } else {
            self.cache.insert(Arc::clone(&class));
        }
        Ok(class)
    }

    /// The class of `node`, ordered with `node` first.
    pub fn members_from(&self, node: NodeId) -> Result<Vec<NodeId>> {
        let class = self.class_of(node)?;
        let mut out = Vec::with_capacity(class.len());
        out.push(node);
        out.extend(class.iter().copied().filter(|m| *m != node));
        Ok(out)
    }

    /// One exact filter per member of the class of every entity `filter`
    /// matches, in first-seen order without duplicates.
    pub fn widen(&self, filter: &EntityFilter, matched: &[NodeId]) -> Result<Vec<EntityFilter>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for node in matched {
            for member in self.members_from(*node)? {
                if !seen.insert(member) {
                    continue;
                }
                let Some(record) = self.store.node(member)? else {
                    continue;
                };
                if let Some(exact) = EntityFilter::exact(&record.key) {
                    out.push(exact);
                }
            }
        }
        if out.is_empty() {
            out.push(filter.clone());
        }
        Ok(out)
    }
}
