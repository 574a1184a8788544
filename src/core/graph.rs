//! The unit graph.
//!
//! A minimal stand-in for the host engine's graph storage: build units are
//! nodes, dependency tags are edges. Units are keyed by `(name, variant)`.
//! Edges out of a node are always reported in the order they were declared.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::core::error::BundleError;
use crate::core::tag::{DependencyTag, TagKind};
use crate::core::target::Variant;
use crate::core::unit::BuildUnit;
use crate::core::walk::{self, WalkStep};
use crate::util::Name;

/// Identity of a unit inside one `UnitGraph`.
pub type UnitId = NodeIndex;

#[derive(Debug, Clone, Default)]
pub struct UnitGraph {
    graph: DiGraph<BuildUnit, DependencyTag>,
    index: HashMap<(Name, Variant), UnitId>,
}

impl UnitGraph {
    pub fn new() -> Self {
        UnitGraph::default()
    }

    /// Add a unit. Each `(name, variant)` pair may be declared once.
    pub fn add_unit(&mut self, unit: BuildUnit) -> Result<UnitId, BundleError> {
        let key = (unit.name, unit.variant);
        if self.index.contains_key(&key) {
            return Err(BundleError::DuplicateUnit {
                name: unit.name,
                variant: unit.variant,
            });
        }
        let id = self.graph.add_node(unit);
        self.index.insert(key, id);
        Ok(id)
    }

    /// Add a dependency edge. Returns false if an identical edge exists.
    pub fn add_dep(&mut self, from: UnitId, to: UnitId, tag: impl Into<DependencyTag>) -> bool {
        let tag = tag.into();
        let exists = self
            .graph
            .edges_connecting(from, to)
            .any(|e| *e.weight() == tag);
        if exists {
            return false;
        }
        self.graph.add_edge(from, to, tag);
        true
    }

    pub fn unit(&self, id: UnitId) -> &BuildUnit {
        &self.graph[id]
    }

    pub fn unit_mut(&mut self, id: UnitId) -> &mut BuildUnit {
        &mut self.graph[id]
    }

    pub fn find(&self, name: &str, variant: Variant) -> Option<UnitId> {
        self.index.get(&(Name::new(name), variant)).copied()
    }

    pub fn find_common(&self, name: &str) -> Option<UnitId> {
        self.find(name, Variant::Common)
    }

    /// Every variant of `name`, common first, then architectures in order.
    pub fn variants_of(&self, name: &str) -> Vec<UnitId> {
        let name = Name::new(name);
        let mut ids: Vec<_> = self
            .index
            .iter()
            .filter(|((n, _), _)| *n == name)
            .map(|((_, v), id)| (*v, *id))
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Direct dependencies in declaration order.
    pub fn deps(&self, id: UnitId) -> Vec<(DependencyTag, UnitId)> {
        let mut edges: Vec<(EdgeIndex, DependencyTag, UnitId)> = self
            .graph
            .edges_directed(id, Direction::Outgoing)
            .map(|e| (e.id(), *e.weight(), e.target()))
            .collect();
        edges.sort_by_key(|(idx, _, _)| *idx);
        edges.into_iter().map(|(_, tag, to)| (tag, to)).collect()
    }

    pub fn units(&self) -> impl Iterator<Item = (UnitId, &BuildUnit)> {
        self.graph
            .node_indices()
            .map(move |id| (id, &self.graph[id]))
    }

    pub fn unit_ids(&self) -> Vec<UnitId> {
        self.graph.node_indices().collect()
    }

    /// Bundle units, sorted by name.
    pub fn bundles(&self) -> Vec<UnitId> {
        let mut ids: Vec<_> = self
            .units()
            .filter(|(_, u)| u.as_bundle().is_some())
            .map(|(id, u)| (u.name, id))
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    pub fn is_bundle(&self, id: UnitId) -> bool {
        self.unit(id).as_bundle().is_some()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Depth-first walk from `root`; see [`walk::walk`].
    pub fn walk<F>(&self, root: UnitId, visit: F)
    where
        F: FnMut(&WalkStep<'_>) -> bool,
    {
        walk::walk(self, root, visit)
    }

    /// Whether `child`, reached from `parent` through `tag`, is packaged together
    /// with `parent`.
    pub fn dep_in_same_package(&self, parent: UnitId, child: UnitId, tag: DependencyTag) -> bool {
        let p = self.unit(parent);
        let c = self.unit(child);

        if p.as_bundle().is_some() {
            return true;
        }
        if tag.excluded_from_contents() {
            return false;
        }
        if p.partition != c.partition {
            return false;
        }
        if let Some(lib) = c.as_native_library() {
            if lib.is_stubs {
                return false;
            }
            if lib.has_stubs && matches!(tag.kind, TagKind::Shared | TagKind::Runtime) {
                return false;
            }
        }
        if p.is_static_library() && tag.kind == TagKind::Shared {
            return false;
        }
        true
    }
}
