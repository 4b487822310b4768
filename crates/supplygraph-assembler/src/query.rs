//! Query assembler.
//!
//! Entity queries walk the stored hierarchies top-down and prune branches
//! the filter cannot reach. Attestation queries anchor on the first endpoint
//! filter, widen each anchor to its equivalence class, and group the
//! matching edges by the node that was queried.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use supplygraph_model::{CanonicalKey, EdgeKind, EdgeRecord, Endpoint, NodeId, NodeKind};
use supplygraph_store::GraphBackend;

use crate::config::AssemblerConfig;
use crate::context::{CallContext, Guarded};
use crate::equivalence::{EquivalenceCache, EquivalenceEngine};
use crate::error::{GraphError, Result};
use crate::filter::{
    ArtifactSpec, AttestationFilter, BuilderSpec, EntityFilter, PkgSpec, SourceSpec,
    VulnerabilitySpec,
};
use crate::match_flags::{self, PackageScope};
use crate::tree::{
    self, Artifact, AttestationGroup, AttestationView, Builder, EndpointView, EntityView,
    Package, PackageName, PackageNamespace, Source, SourceNamespace, Vulnerability,
};

/// A queried node and the stored nodes whose attestations count for it.
struct Anchor {
    queried: NodeId,
    reach: Vec<NodeId>,
}

impl Anchor {
    fn single(node: NodeId) -> Self {
        Self {
            queried: node,
            reach: vec![node],
        }
    }
}

/// Node views computed once per request.
struct ViewCache<'s, 'a, B: ?Sized> {
    store: &'s Guarded<'a, B>,
    views: HashMap<NodeId, EntityView>,
}

impl<'s, 'a, B: GraphBackend + ?Sized> ViewCache<'s, 'a, B> {
    fn new(store: &'s Guarded<'a, B>) -> Self {
        Self {
            store,
            views: HashMap::new(),
        }
    }

    fn view(&mut self, id: NodeId) -> Result<EntityView> {
        if let Some(view) = self.views.get(&id) {
            return Ok(view.clone());
        }
        let view = tree::view_of(self.store, id)?;
        self.views.insert(id, view.clone());
        Ok(view)
    }

    fn attestation(&mut self, edge: EdgeRecord, via: Option<NodeId>) -> Result<AttestationView> {
        let mut endpoints = Vec::with_capacity(edge.endpoints.len());
        for endpoint in &edge.endpoints {
            endpoints.push(EndpointView {
                role: endpoint.role,
                entity: self.view(endpoint.node)?,
            });
        }
        let matched_via = match via {
            Some(node) => Some(self.view(node)?),
            None => None,
        };
        Ok(AttestationView {
            id: edge.id,
            kind: edge.kind(),
            endpoints,
            provenance: edge.provenance,
            payload: edge.payload,
            matched_via,
        })
    }
}

pub struct QueryAssembler<B> {
    backend: Arc<B>,
    config: AssemblerConfig,
}

impl<B> Clone for QueryAssembler<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
        }
    }
}

impl<B: GraphBackend> QueryAssembler<B> {
    pub fn new(backend: Arc<B>, config: AssemblerConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    fn store<'a>(&'a self, ctx: &'a CallContext) -> Guarded<'a, B> {
        Guarded::new(self.backend.as_ref(), ctx)
    }

    // ========================================================================
    // Entity trees
    // ========================================================================

    pub fn packages(&self, ctx: &CallContext, spec: &PkgSpec) -> Result<Vec<Package>> {
        let store = self.store(ctx);
        package_tree(&store, spec)
    }

    pub fn sources(&self, ctx: &CallContext, spec: &SourceSpec) -> Result<Vec<Source>> {
        let store = self.store(ctx);
        source_tree(&store, spec)
    }

    pub fn artifacts(&self, ctx: &CallContext, spec: &ArtifactSpec) -> Result<Vec<Artifact>> {
        let store = self.store(ctx);
        let mut out = Vec::new();
        for record in store.children(NodeKind::Artifact, None)? {
            if let CanonicalKey::Artifact { algorithm, digest } = &record.key {
                if spec.matches_key(&record.key) {
                    out.push(Artifact {
                        id: record.id,
                        algorithm: algorithm.clone(),
                        digest: digest.clone(),
                    });
                }
            }
        }
        Ok(out)
    }

    pub fn builders(&self, ctx: &CallContext, spec: &BuilderSpec) -> Result<Vec<Builder>> {
        let store = self.store(ctx);
        let mut out = Vec::new();
        for record in store.children(NodeKind::Builder, None)? {
            if let CanonicalKey::Builder { uri } = &record.key {
                if spec.matches_key(&record.key) {
                    out.push(Builder {
                        id: record.id,
                        uri: uri.clone(),
                    });
                }
            }
        }
        Ok(out)
    }

    pub fn vulnerabilities(
        &self,
        ctx: &CallContext,
        spec: &VulnerabilitySpec,
    ) -> Result<Vec<Vulnerability>> {
        let store = self.store(ctx);
        let mut out = Vec::new();
        for kind in spec.node_kinds() {
            for record in store.children(kind, None)? {
                if !spec.matches_key(&record.key) {
                    continue;
                }
                if let EntityView::Vulnerability(v) = tree::view_of(&store, record.id)? {
                    out.push(v);
                }
            }
        }
        Ok(out)
    }

    // ========================================================================
    // Equivalence
    // ========================================================================

    /// The equivalence class of `node`, starting with `node` itself.
    pub fn equivalence_class(&self, ctx: &CallContext, node: NodeId) -> Result<Vec<NodeId>> {
        let store = self.store(ctx);
        let cache = EquivalenceCache::new();
        let engine = EquivalenceEngine::new(&store, &cache, self.config.max_equivalence_nodes);
        engine.members_from(node)
    }

    /// Rewrites `filter` into one exact filter per entity equivalent to
    /// something it matches. Returns the filter unchanged when widening is
    /// disabled or nothing matches.
    pub fn widen(&self, ctx: &CallContext, filter: &EntityFilter) -> Result<Vec<EntityFilter>> {
        if !self.config.widen_equivalence {
            return Ok(vec![filter.clone()]);
        }
        let store = self.store(ctx);
        let cache = EquivalenceCache::new();
        let engine = EquivalenceEngine::new(&store, &cache, self.config.max_equivalence_nodes);
        let matched = matching_nodes(&store, filter)?;
        engine.widen(filter, &matched)
    }

    // ========================================================================
    // Attestations
    // ========================================================================

    pub fn attestations(
        &self,
        ctx: &CallContext,
        filter: &AttestationFilter,
    ) -> Result<Vec<AttestationGroup>> {
        let store = self.store(ctx);
        let Some((anchor_filter, others)) = filter.endpoints.split_first() else {
            return self.attestations_by_subject(&store, filter);
        };

        let cache = EquivalenceCache::new();
        let engine = EquivalenceEngine::new(&store, &cache, self.config.max_equivalence_nodes);
        let widen = self.config.widen_equivalence && !filter.kind.is_symmetric();
        let mut views = ViewCache::new(&store);
        let mut groups = Vec::new();

        for anchor in anchors(&store, filter.kind, anchor_filter)? {
            let queried_key = store
                .node(anchor.queried)?
                .map(|r| r.key)
                .ok_or_else(|| GraphError::validation(format!("node {} vanished", anchor.queried)))?;
            let mut seen = HashSet::new();
            let mut hits: Vec<(EdgeRecord, Option<NodeId>)> = Vec::new();

            for &reached in &anchor.reach {
                let members = if widen {
                    engine.members_from(reached)?
                } else {
                    vec![reached]
                };
                for member in members {
                    let Some(member_record) = store.node(member)? else {
                        continue;
                    };
                    let query_key = if member == reached {
                        &queried_key
                    } else {
                        &member_record.key
                    };
                    for edge_id in store.neighbors(member, filter.kind)? {
                        if seen.contains(&edge_id) {
                            continue;
                        }
                        let Some(edge) = store.edge(edge_id)? else {
                            continue;
                        };
                        if !filter.matches_provenance(&edge.provenance)
                            || !flag_applies(&edge, query_key, &member_record.key)
                            || !others_match(&store, &edge, member, others)?
                        {
                            continue;
                        }
                        seen.insert(edge_id);
                        let via = (member != reached).then_some(member);
                        hits.push((edge, via));
                    }
                }
            }

            if hits.is_empty() {
                continue;
            }
            hits.sort_by_key(|(edge, _)| edge.id);
            let mut attestations = Vec::with_capacity(hits.len());
            for (edge, via) in hits {
                attestations.push(views.attestation(edge, via)?);
            }
            groups.push(AttestationGroup {
                queried: views.view(anchor.queried)?,
                attestations,
            });
        }

        debug!(kind = %filter.kind, groups = groups.len(), "attestation query");
        Ok(groups)
    }

    /// Without endpoint filters every edge of the kind is returned, grouped
    /// by its first endpoint.
    fn attestations_by_subject(
        &self,
        store: &Guarded<'_, B>,
        filter: &AttestationFilter,
    ) -> Result<Vec<AttestationGroup>> {
        let mut order: Vec<NodeId> = Vec::new();
        let mut grouped: HashMap<NodeId, Vec<EdgeRecord>> = HashMap::new();
        for edge_id in store.scan_edges(filter.kind)? {
            let Some(edge) = store.edge(edge_id)? else {
                continue;
            };
            if !filter.matches_provenance(&edge.provenance) {
                continue;
            }
            let Some(first) = edge.endpoints.first().map(|e| e.node) else {
                continue;
            };
            grouped
                .entry(first)
                .or_insert_with(|| {
                    order.push(first);
                    Vec::new()
                })
                .push(edge);
        }

        let mut views = ViewCache::new(store);
        let mut groups = Vec::with_capacity(order.len());
        for node in order {
            let edges = grouped.remove(&node).unwrap_or_default();
            let mut attestations = Vec::with_capacity(edges.len());
            for edge in edges {
                attestations.push(views.attestation(edge, None)?);
            }
            groups.push(AttestationGroup {
                queried: views.view(node)?,
                attestations,
            });
        }
        Ok(groups)
    }
}

// ============================================================================
// Tree walks
// ============================================================================

fn package_tree<B: GraphBackend + ?Sized>(
    store: &Guarded<'_, B>,
    spec: &PkgSpec,
) -> Result<Vec<Package>> {
    let mut out = Vec::new();
    for ty in store.children(NodeKind::PackageType, None)? {
        let CanonicalKey::PackageType { pkg_type } = &ty.key else {
            continue;
        };
        if !spec.matches_type(pkg_type) {
            continue;
        }
        let mut namespaces = Vec::new();
        for ns in store.children(NodeKind::PackageNamespace, Some(ty.id))? {
            let CanonicalKey::PackageNamespace { namespace, .. } = &ns.key else {
                continue;
            };
            if !spec.matches_namespace(namespace) {
                continue;
            }
            let mut names = Vec::new();
            for nm in store.children(NodeKind::PackageName, Some(ns.id))? {
                let CanonicalKey::PackageName { name, .. } = &nm.key else {
                    continue;
                };
                if !spec.matches_name(name) {
                    continue;
                }
                let versions: Vec<_> = store
                    .children(NodeKind::PackageVersion, Some(nm.id))?
                    .iter()
                    .filter(|v| spec.matches_key(&v.key))
                    .filter_map(tree::version_leaf)
                    .collect();
                if versions.is_empty() && spec.is_version_scoped() {
                    continue;
                }
                names.push(PackageName {
                    id: nm.id,
                    name: name.clone(),
                    versions,
                });
            }
            if names.is_empty() && spec.has_name_fields() {
                continue;
            }
            namespaces.push(PackageNamespace {
                id: ns.id,
                namespace: namespace.clone(),
                names,
            });
        }
        if namespaces.is_empty() && spec.has_namespace_fields() {
            continue;
        }
        out.push(Package {
            id: ty.id,
            pkg_type: pkg_type.clone(),
            namespaces,
        });
    }
    Ok(out)
}

fn source_tree<B: GraphBackend + ?Sized>(
    store: &Guarded<'_, B>,
    spec: &SourceSpec,
) -> Result<Vec<Source>> {
    let mut out = Vec::new();
    for ty in store.children(NodeKind::SourceType, None)? {
        let CanonicalKey::SourceType { source_type } = &ty.key else {
            continue;
        };
        if !spec.matches_type(source_type) {
            continue;
        }
        let mut namespaces = Vec::new();
        for ns in store.children(NodeKind::SourceNamespace, Some(ty.id))? {
            let CanonicalKey::SourceNamespace { namespace, .. } = &ns.key else {
                continue;
            };
            if !spec.matches_namespace(namespace) {
                continue;
            }
            let names: Vec<_> = store
                .children(NodeKind::SourceName, Some(ns.id))?
                .iter()
                .filter(|n| spec.matches_key(&n.key))
                .filter_map(tree::source_leaf)
                .collect();
            if names.is_empty() && spec.has_name_fields() {
                continue;
            }
            namespaces.push(SourceNamespace {
                id: ns.id,
                namespace: namespace.clone(),
                names,
            });
        }
        if namespaces.is_empty() && spec.has_namespace_fields() {
            continue;
        }
        out.push(Source {
            id: ty.id,
            source_type: source_type.clone(),
            namespaces,
        });
    }
    Ok(out)
}

/// Leaf nodes of flat entity kinds that `filter` matches.
fn flat_matches<B: GraphBackend + ?Sized>(
    store: &Guarded<'_, B>,
    filter: &EntityFilter,
) -> Result<Vec<NodeId>> {
    let kinds = match filter {
        EntityFilter::Artifact(_) => vec![NodeKind::Artifact],
        EntityFilter::Builder(_) => vec![NodeKind::Builder],
        EntityFilter::Vulnerability(spec) => spec.node_kinds(),
        EntityFilter::Package(_) | EntityFilter::Source(_) => Vec::new(),
    };
    let mut out = Vec::new();
    for kind in kinds {
        for record in store.children(kind, None)? {
            if filter.matches_key(&record.key) {
                out.push(record.id);
            }
        }
    }
    Ok(out)
}

fn anchors<B: GraphBackend + ?Sized>(
    store: &Guarded<'_, B>,
    kind: EdgeKind,
    filter: &EntityFilter,
) -> Result<Vec<Anchor>> {
    let mut out = Vec::new();
    match filter {
        EntityFilter::Package(spec) => {
            let scope = match_flags::scope_for(kind, spec);
            for package in package_tree(store, spec)? {
                for ns in package.namespaces {
                    for name in ns.names {
                        match scope {
                            PackageScope::NamesOnly => out.push(Anchor::single(name.id)),
                            PackageScope::AllLevels => {
                                out.push(Anchor::single(name.id));
                                out.extend(name.versions.iter().map(|v| Anchor::single(v.id)));
                            }
                            PackageScope::VersionsOnly => {
                                out.extend(name.versions.iter().map(|v| Anchor::single(v.id)));
                            }
                            PackageScope::VersionsWithName => {
                                out.extend(name.versions.iter().map(|v| Anchor {
                                    queried: v.id,
                                    reach: vec![v.id, name.id],
                                }));
                            }
                        }
                    }
                }
            }
        }
        EntityFilter::Source(spec) => {
            for source in source_tree(store, spec)? {
                for ns in source.namespaces {
                    out.extend(ns.names.iter().map(|n| Anchor::single(n.id)));
                }
            }
        }
        flat => out.extend(flat_matches(store, flat)?.into_iter().map(Anchor::single)),
    }
    Ok(out)
}

/// Nodes an entity filter matches, at the level equivalence is asserted:
/// versions for version-scoped package filters, names otherwise.
fn matching_nodes<B: GraphBackend + ?Sized>(
    store: &Guarded<'_, B>,
    filter: &EntityFilter,
) -> Result<Vec<NodeId>> {
    match filter {
        EntityFilter::Package(spec) => {
            let mut out = Vec::new();
            for package in package_tree(store, spec)? {
                for ns in package.namespaces {
                    for name in ns.names {
                        if spec.is_version_scoped() {
                            out.extend(name.versions.iter().map(|v| v.id));
                        } else {
                            out.push(name.id);
                        }
                    }
                }
            }
            Ok(out)
        }
        EntityFilter::Source(spec) => {
            let mut out = Vec::new();
            for source in source_tree(store, spec)? {
                for ns in source.namespaces {
                    out.extend(ns.names.iter().map(|n| n.id));
                }
            }
            Ok(out)
        }
        flat => flat_matches(store, flat),
    }
}

// ============================================================================
// Edge predicates
// ============================================================================

/// Match-flag edges on a package node must apply to the queried package.
fn flag_applies(edge: &EdgeRecord, query: &CanonicalKey, member: &CanonicalKey) -> bool {
    if !edge.kind().carries_match_flag() {
        return true;
    }
    let Some(flag) = edge.payload.match_flag() else {
        return true;
    };
    match (query.package_coordinate(), member.package_coordinate()) {
        (Some(query), Some(stored)) => match_flags::applies(flag, &query, &stored),
        _ => true,
    }
}

/// Every remaining filter must match a distinct endpoint other than the one
/// at `anchor`.
fn others_match<B: GraphBackend + ?Sized>(
    store: &Guarded<'_, B>,
    edge: &EdgeRecord,
    anchor: NodeId,
    filters: &[EntityFilter],
) -> Result<bool> {
    if filters.is_empty() {
        return Ok(true);
    }
    let mut rest: Vec<Endpoint> = edge.endpoints.clone();
    if let Some(pos) = rest.iter().position(|e| e.node == anchor) {
        rest.remove(pos);
    }
    if rest.len() < filters.len() {
        return Ok(false);
    }
    let mut keys = Vec::with_capacity(rest.len());
    for endpoint in &rest {
        let key = store
            .node(endpoint.node)?
            .map(|r| r.key)
            .ok_or_else(|| GraphError::validation(format!("endpoint {} is not stored", endpoint.node)))?;
        keys.push(key);
    }
    let mut used = vec![false; keys.len()];
    Ok(assign(filters, &keys, &mut used))
}

/// Backtracking assignment of filters to distinct keys. Endpoint lists are
/// short, so the search stays small.
fn assign(filters: &[EntityFilter], keys: &[CanonicalKey], used: &mut [bool]) -> bool {
    let Some((first, rest)) = filters.split_first() else {
        return true;
    };
    for i in 0..keys.len() {
        if used[i] || !first.matches_key(&keys[i]) {
            continue;
        }
        used[i] = true;
        if assign(rest, keys, used) {
            return true;
        }
        used[i] = false;
    }
    false
}
