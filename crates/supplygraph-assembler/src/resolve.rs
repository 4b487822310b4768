//! Entity upsert adapter.
//!
//! Turns input specs into stored nodes. Hierarchical entities are upserted
//! root first so every child is created under an already-stored parent.

use tracing::debug;

use supplygraph_model::{
    artifact_key, builder_key, package_keys, source_keys, vulnerability_key, ArtifactCoordinate,
    ArtifactInputSpec, BuilderCoordinate, BuilderInputSpec, CanonicalKey, NodeId,
    PackageCoordinate, PkgInputSpec, Role, SourceCoordinate, SourceInputSpec, SpecError,
    SubjectInput, VulnerabilityId, VulnerabilityInput,
};
use supplygraph_store::{GraphBackend, NewNode};

use crate::context::Guarded;
use crate::error::{GraphError, Result};

/// How deep into the package hierarchy an endpoint resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageLevel {
    Name,
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub node: NodeId,
    /// True when this call created the leaf node.
    pub created: bool,
}

pub(crate) fn spec_error(role: Role) -> impl FnOnce(SpecError) -> GraphError {
    move |source| GraphError::UnresolvableEndpoint { role, source }
}

pub struct EntityResolver<'a, B: ?Sized> {
    store: Guarded<'a, B>,
}

impl<'a, B: GraphBackend + ?Sized> EntityResolver<'a, B> {
    pub(crate) fn new(store: Guarded<'a, B>) -> Self {
        Self { store }
    }

    pub(crate) fn store(&self) -> &Guarded<'a, B> {
        &self.store
    }

    fn upsert_chain(&self, chain: &[&CanonicalKey]) -> Result<Resolved> {
        let mut parent = None;
        let mut last = None;
        for key in chain {
            let (node, created) = self.store.insert_if_absent(NewNode {
                key: (*key).clone(),
                parent,
            })?;
            if created {
                debug!(node = %node, key = %key, kind = %key.kind(), "node created");
            }
            parent = Some(node);
            last = Some(Resolved { node, created });
        }
        last.ok_or_else(|| GraphError::validation("empty key chain"))
    }

    pub fn package(&self, coord: &PackageCoordinate, level: PackageLevel) -> Result<Resolved> {
        let keys = package_keys(coord);
        let chain = keys.chain();
        match level {
            PackageLevel::Name => self.upsert_chain(&chain[..3]),
            PackageLevel::Version => self.upsert_chain(&chain),
        }
    }

    pub fn source(&self, coord: &SourceCoordinate) -> Result<Resolved> {
        let keys = source_keys(coord);
        self.upsert_chain(&keys.chain())
    }

    pub fn artifact(&self, coord: &ArtifactCoordinate) -> Result<Resolved> {
        self.upsert_chain(&[&artifact_key(coord)])
    }

    pub fn builder(&self, coord: &BuilderCoordinate) -> Result<Resolved> {
        self.upsert_chain(&[&builder_key(coord)])
    }

    pub fn vulnerability(&self, id: &VulnerabilityId) -> Result<Resolved> {
        self.upsert_chain(&[&vulnerability_key(id)])
    }

    // ------------------------------------------------------------------------
    // Spec entry points: normalize, then upsert
    // ------------------------------------------------------------------------

    pub fn package_spec(
        &self,
        spec: &PkgInputSpec,
        level: PackageLevel,
        role: Role,
    ) -> Result<Resolved> {
        let coord = PackageCoordinate::from_spec(spec).map_err(spec_error(role))?;
        self.package(&coord, level)
    }

    pub fn source_spec(&self, spec: &SourceInputSpec, role: Role) -> Result<Resolved> {
        let coord = SourceCoordinate::from_spec(spec).map_err(spec_error(role))?;
        self.source(&coord)
    }

    pub fn artifact_spec(&self, spec: &ArtifactInputSpec, role: Role) -> Result<Resolved> {
        let coord = ArtifactCoordinate::from_spec(spec).map_err(spec_error(role))?;
        self.artifact(&coord)
    }

    pub fn builder_spec(&self, spec: &BuilderInputSpec, role: Role) -> Result<Resolved> {
        let coord = BuilderCoordinate::from_spec(spec).map_err(spec_error(role))?;
        self.builder(&coord)
    }

    pub fn vulnerability_input(&self, input: &VulnerabilityInput, role: Role) -> Result<Resolved> {
        let id = VulnerabilityId::from_input(input).map_err(spec_error(role))?;
        self.vulnerability(&id)
    }

    /// Packages in a union resolve at `level`; sources and artifacts have a
    /// single leaf.
    pub fn subject(
        &self,
        subject: &SubjectInput,
        level: PackageLevel,
        role: Role,
    ) -> Result<Resolved> {
        match subject {
            SubjectInput::Package(spec) => self.package_spec(spec, level, role),
            SubjectInput::Source(spec) => self.source_spec(spec, role),
            SubjectInput::Artifact(spec) => self.artifact_spec(spec, role),
        }
    }

    /// Read-only lookup of a package leaf; never creates.
    pub fn find_package(
        &self,
        coord: &PackageCoordinate,
        level: PackageLevel,
    ) -> Result<Option<NodeId>> {
        let keys = package_keys(coord);
        let key = match level {
            PackageLevel::Name => &keys.name,
            PackageLevel::Version => &keys.version,
        };
        self.store.find_by_key(key)
    }
}
