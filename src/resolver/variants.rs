//! Variant partitioning.
//!
//! Runs after membership collection has finished for every bundle. Decides
//! how many bundle variants each claimed unit needs: claims with the same
//! minimum version share one variant, unless the unit must stay unique to
//! each bundle. The result is computed as a pure `VariantPlan` first and then
//! handed to the host's variant-creation primitive.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info};

use crate::core::graph::{UnitGraph, UnitId};
use crate::resolver::membership::{ApexInfo, MembershipIndex};
use crate::util::Name;

/// Key of the platform (non-bundle) variant.
pub const PLATFORM_VARIATION: &str = "";

/// The host engine's variant primitives.
pub trait VariantHost {
    /// Create one variant of `unit` per key.
    fn create_variations(&mut self, unit: UnitId, keys: &[String]);

    /// Forbid `unit` from sharing a variant across bundles.
    fn mark_unique(&mut self, unit: UnitId);
}

impl VariantHost for UnitGraph {
    fn create_variations(&mut self, unit: UnitId, keys: &[String]) {
        let state = &mut self.unit_mut(unit).state;
        for key in keys {
            if !state.variations.contains(key) {
                state.variations.push(key.clone());
            }
        }
    }

    fn mark_unique(&mut self, unit: UnitId) {
        self.unit_mut(unit).state.unique = true;
    }
}

/// One bundle variant of a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantAssignment {
    pub key: String,
    /// Claims merged into this variant.
    pub info: ApexInfo,
}

/// Variants to create, per unit.
#[derive(Debug, Clone, Default)]
pub struct VariantPlan {
    assignments: HashMap<UnitId, Vec<VariantAssignment>>,
    platform: HashSet<UnitId>,
    unique: BTreeSet<UnitId>,
}

impl VariantPlan {
    pub fn assignments(&self, unit: UnitId) -> &[VariantAssignment] {
        self.assignments
            .get(&unit)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Variant key `unit` is built under for the bundle variation `variation`.
    pub fn key_for(&self, unit: UnitId, variation: &str) -> Option<&str> {
        self.assignments(unit)
            .iter()
            .find(|a| a.info.in_variants.iter().any(|v| *v == variation))
            .map(|a| a.key.as_str())
    }

    pub fn is_unique(&self, unit: UnitId) -> bool {
        self.unique.contains(&unit)
    }

    /// Every key for `unit`, platform variant first.
    pub fn keys(&self, unit: UnitId) -> Vec<String> {
        let mut keys = Vec::new();
        if self.platform.contains(&unit) {
            keys.push(PLATFORM_VARIATION.to_string());
        }
        keys.extend(self.assignments(unit).iter().map(|a| a.key.clone()));
        keys
    }

    pub fn units(&self) -> Vec<UnitId> {
        let mut ids: Vec<_> = self.assignments.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Hand the plan to the host.
    pub fn apply(&self, host: &mut impl VariantHost) {
        for unit in self.units() {
            if self.unique.contains(&unit) {
                host.mark_unique(unit);
            }
            host.create_variations(unit, &self.keys(unit));
        }
    }
}

fn variation_keys(infos: &[ApexInfo]) -> BTreeSet<Name> {
    infos
        .iter()
        .flat_map(|i| i.in_variants.iter().copied())
        .collect()
}

/// Units that must not share variants across bundles.
///
/// A same-package dependency whose bundle claims differ from its consumer's
/// (while overlapping) is made unique, and a unique dependency makes its
/// consumer unique.
pub fn find_unique(graph: &UnitGraph, index: &MembershipIndex) -> BTreeSet<UnitId> {
    let marked = index.marked_units();
    let mut unique: BTreeSet<UnitId> = marked
        .iter()
        .copied()
        .filter(|&id| graph.unit(id).caps.unique_variations)
        .collect();

    loop {
        let mut changed = false;
        for &unit in &marked {
            let own = variation_keys(index.infos(unit));
            for (tag, dep) in graph.deps(unit) {
                if !graph.dep_in_same_package(unit, dep, tag) {
                    continue;
                }
                let theirs = variation_keys(index.infos(dep));
                if theirs.is_empty() || own.is_disjoint(&theirs) {
                    continue;
                }
                if theirs != own && unique.insert(dep) {
                    debug!(
                        unit = %graph.unit(dep).name,
                        consumer = %graph.unit(unit).name,
                        "dependency claimed differently than consumer, making unique"
                    );
                    changed = true;
                }
                if unique.contains(&dep) && unique.insert(unit) {
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
    unique
}

fn merged_key(info: &ApexInfo) -> String {
    format!("apex{}", info.min_sdk.level())
}

/// Compute the variants of every claimed unit.
pub fn partition(graph: &UnitGraph, index: &MembershipIndex) -> VariantPlan {
    let unique = find_unique(graph, index);
    let mut plan = VariantPlan {
        unique,
        ..VariantPlan::default()
    };

    for unit in index.marked_units() {
        let infos = index.infos(unit);
        let assignments = if plan.unique.contains(&unit) {
            infos
                .iter()
                .map(|info| VariantAssignment {
                    key: info.variation_name.to_string(),
                    info: info.clone(),
                })
                .collect()
        } else {
            merge_infos(infos)
        };

        if graph.unit(unit).state.platform_available {
            plan.platform.insert(unit);
        }
        plan.assignments.insert(unit, assignments);
    }

    info!(
        units = plan.assignments.len(),
        unique = plan.unique.len(),
        "variant partitioning complete"
    );
    plan
}

/// Merge claims with the same minimum version into one shared variant.
fn merge_infos(infos: &[ApexInfo]) -> Vec<VariantAssignment> {
    let mut merged: Vec<VariantAssignment> = Vec::new();
    for info in infos {
        let key = merged_key(info);
        match merged.iter_mut().find(|a| a.key == key) {
            Some(existing) => {
                let m = &mut existing.info;
                for v in &info.in_variants {
                    if !m.in_variants.contains(v) {
                        m.in_variants.push(*v);
                    }
                }
                for b in &info.in_bundles {
                    if !m.in_bundles.contains(b) {
                        m.in_bundles.push(*b);
                    }
                }
                m.updatable |= info.updatable;
                m.uses_platform_apis &= info.uses_platform_apis;
            }
            None => merged.push(VariantAssignment {
                key,
                info: info.clone(),
            }),
        }
    }
    for a in &mut merged {
        a.info.in_variants.sort();
        a.info.in_bundles.sort();
    }
    merged.sort_by(|a, b| a.key.cmp(&b.key));
    merged
}
