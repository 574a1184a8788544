//! Membership collection.
//!
//! For every bundle, walks the graph from the bundle node and records which
//! units must be built for it, split into direct and indirect membership.
//! Collection for different bundles runs in parallel; each bundle produces an
//! isolated `CollectedBundle` and the results are merged into a
//! `MembershipIndex` once every bundle has finished.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::core::api_level::ApiLevel;
use crate::core::bundle::Bundle;
use crate::core::graph::{UnitGraph, UnitId};
use crate::core::tag::TagKind;
use crate::core::walk::WalkStep;
use crate::util::{Config, Name};

/// How a unit belongs to a bundle.
///
/// Ordered so that merging two memberships is `max`: direct always wins,
/// whatever order the paths are discovered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Membership {
    Indirect,
    Direct,
}

impl Membership {
    pub fn merge(self, other: Membership) -> Membership {
        self.max(other)
    }
}

/// The membership record of one bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApexContents {
    bundle: Name,
    contents: BTreeMap<Name, Membership>,
}

impl ApexContents {
    pub fn new(bundle: Name) -> Self {
        ApexContents {
            bundle,
            contents: BTreeMap::new(),
        }
    }

    pub fn bundle(&self) -> Name {
        self.bundle
    }

    pub fn record(&mut self, unit: Name, membership: Membership) {
        self.contents
            .entry(unit)
            .and_modify(|m| *m = m.merge(membership))
            .or_insert(membership);
    }

    pub fn membership(&self, unit: &str) -> Option<Membership> {
        self.contents.get(unit).copied()
    }

    pub fn contains(&self, unit: &str) -> bool {
        self.contents.contains_key(unit)
    }

    pub fn is_direct(&self, unit: &str) -> bool {
        self.membership(unit) == Some(Membership::Direct)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Name, Membership)> + '_ {
        self.contents.iter().map(|(n, m)| (*n, *m))
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

/// What a unit is told when a bundle claims it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApexInfo {
    pub variation_name: Name,
    pub min_sdk: ApiLevel,
    pub updatable: bool,
    pub uses_platform_apis: bool,
    pub in_variants: Vec<Name>,
    pub in_bundles: Vec<Name>,
}

impl ApexInfo {
    pub fn for_bundle(bundle: &Bundle, config: &Config) -> Self {
        let variation_name = bundle.variation_name();
        ApexInfo {
            variation_name,
            min_sdk: bundle.effective_min_sdk(config.min_sdk_override()),
            updatable: bundle.updatable,
            uses_platform_apis: bundle.platform_apis,
            in_variants: vec![variation_name],
            in_bundles: vec![bundle.name],
        }
    }

    /// Fold another claim under the same variation name into this one.
    fn absorb(&mut self, other: &ApexInfo) {
        for b in &other.in_bundles {
            if !self.in_bundles.contains(b) {
                self.in_bundles.push(*b);
            }
        }
        self.in_bundles.sort();
        self.min_sdk = self.min_sdk.min(other.min_sdk);
        self.updatable |= other.updatable;
        self.uses_platform_apis &= other.uses_platform_apis;
    }
}

/// Result of collecting one bundle, before merging.
#[derive(Debug, Clone)]
pub struct CollectedBundle {
    pub bundle: UnitId,
    pub info: ApexInfo,
    pub contents: ApexContents,
    /// Every claimed unit, in discovery order.
    pub members: Vec<UnitId>,
}

/// Whether a membership walk descends through `step`.
///
/// The compatibility validator uses the same predicate so that both see the
/// same graph shape.
pub fn continue_walk(step: &WalkStep<'_>, bundle: &Bundle) -> bool {
    let graph = step.graph();
    let child = graph.unit(step.child);

    if step.tag.excluded_from_contents() || !child.caps.can_have_variants {
        return false;
    }
    if bundle.use_vndk_as_stable && child.is_vndk() {
        return false;
    }
    if step.tag.always_require_variant() {
        return true;
    }
    graph.dep_in_same_package(step.parent(), step.child, step.tag)
}

/// Collect the membership of one bundle.
pub fn collect(graph: &UnitGraph, bundle_id: UnitId, config: &Config) -> Option<CollectedBundle> {
    let bundle = graph.unit(bundle_id).as_bundle()?;
    let info = ApexInfo::for_bundle(bundle, config);
    let mut contents = ApexContents::new(bundle.name);
    let mut members = Vec::new();
    let mut seen = HashSet::new();

    if bundle.vndk {
        // Members are the flagged libraries, declared as direct edges.
        for (tag, dep) in graph.deps(bundle_id) {
            if tag.kind == TagKind::SharedLib && graph.unit(dep).is_vndk() {
                contents.record(graph.unit(dep).name, Membership::Direct);
                if seen.insert(dep) {
                    members.push(dep);
                }
            }
        }
    } else {
        graph.walk(bundle_id, |step| {
            if !continue_walk(step, bundle) {
                return false;
            }
            let membership = if step.is_direct() {
                Membership::Direct
            } else {
                Membership::Indirect
            };
            contents.record(graph.unit(step.child).name, membership);
            if seen.insert(step.child) {
                members.push(step.child);
            }
            true
        });
    }

    debug!(
        bundle = %bundle.name,
        variation = %info.variation_name,
        min_sdk = %info.min_sdk,
        members = members.len(),
        "collected bundle membership"
    );

    Some(CollectedBundle {
        bundle: bundle_id,
        info,
        contents,
        members,
    })
}

/// Membership of every bundle, queryable by later passes.
#[derive(Debug, Clone, Default)]
pub struct MembershipIndex {
    contents: BTreeMap<Name, Arc<ApexContents>>,
    bundle_infos: BTreeMap<Name, ApexInfo>,
    marks: HashMap<UnitId, Vec<ApexInfo>>,
}

impl MembershipIndex {
    pub fn new() -> Self {
        MembershipIndex::default()
    }

    /// Merge per-bundle results. Marks are idempotent per `(unit, variation)`.
    pub fn from_collected(collected: Vec<CollectedBundle>) -> Self {
        let mut index = MembershipIndex::new();
        for c in collected {
            for &member in &c.members {
                index.mark(member, &c.info);
            }
            index
                .bundle_infos
                .insert(c.contents.bundle(), c.info.clone());
            index
                .contents
                .insert(c.contents.bundle(), Arc::new(c.contents));
        }
        index
    }

    /// Tell `unit` it belongs to the bundle described by `info`.
    pub fn mark(&mut self, unit: UnitId, info: &ApexInfo) {
        let infos = self.marks.entry(unit).or_default();
        match infos
            .iter_mut()
            .find(|i| i.variation_name == info.variation_name)
        {
            Some(existing) => existing.absorb(info),
            None => {
                infos.push(info.clone());
                infos.sort_by_key(|i| i.variation_name);
            }
        }
    }

    pub fn contents(&self, bundle: &str) -> Option<&Arc<ApexContents>> {
        self.contents.get(bundle)
    }

    pub fn bundle_info(&self, bundle: &str) -> Option<&ApexInfo> {
        self.bundle_infos.get(bundle)
    }

    pub fn all_contents(&self) -> impl Iterator<Item = &Arc<ApexContents>> {
        self.contents.values()
    }

    /// Bundle claims recorded for `unit`, sorted by variation name.
    pub fn infos(&self, unit: UnitId) -> &[ApexInfo] {
        self.marks.get(&unit).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn marked_units(&self) -> Vec<UnitId> {
        let mut ids: Vec<_> = self.marks.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Whether any bundle lists `name` directly.
    pub fn directly_in_any(&self, name: &str) -> bool {
        self.contents.values().any(|c| c.is_direct(name))
    }

    /// Contents of every bundle that `unit` declares itself a test for.
    pub fn test_for_contents(&self, graph: &UnitGraph, unit: UnitId) -> Vec<Arc<ApexContents>> {
        graph
            .deps(unit)
            .into_iter()
            .filter(|(tag, _)| tag.kind == TagKind::TestFor)
            .filter_map(|(_, bundle)| self.contents(&graph.unit(bundle).name).cloned())
            .collect()
    }
}

/// Collect every bundle in `bundles` in parallel and merge the results.
pub fn collect_all(graph: &UnitGraph, bundles: &[UnitId], config: &Config) -> MembershipIndex {
    let collected: Vec<CollectedBundle> = bundles
        .par_iter()
        .filter_map(|&id| collect(graph, id, config))
        .collect();

    let index = MembershipIndex::from_collected(collected);
    info!(
        bundles = index.contents.len(),
        units = index.marks.len(),
        "membership collection complete"
    );
    index
}
