//! Platform availability.
//!
//! A unit keeps its platform (non-bundle) variant only if it is available to
//! the platform. Declaring availability is not enough: if any dependency it is
//! packaged with is bundle-only, the unit becomes bundle-only as well.

use std::collections::HashMap;

use tracing::debug;

use crate::core::graph::{UnitGraph, UnitId};
use crate::core::unit::{is_bootstrap_library, BuildUnit};

fn forced_available(unit: &BuildUnit) -> bool {
    unit.host
        || unit.recovery
        || unit.caps.always_platform_available
        || is_bootstrap_library(unit.name.without_prebuilt_prefix())
}

/// Compute platform availability for every unit and record it on the unit.
///
/// Returns the number of units that are not available to the platform.
pub fn mark_platform_availability(graph: &mut UnitGraph) -> usize {
    let ids = graph.unit_ids();
    let mut available: HashMap<UnitId, bool> = ids
        .iter()
        .map(|&id| {
            let unit = graph.unit(id);
            (id, forced_available(unit) || unit.declares_platform_available())
        })
        .collect();

    // Unavailability flows from providers to consumers until nothing changes.
    loop {
        let mut changed = false;
        for &id in &ids {
            if !available[&id] || forced_available(graph.unit(id)) || graph.is_bundle(id) {
                continue;
            }
            let blocked = graph.deps(id).into_iter().find(|&(tag, dep)| {
                !available[&dep] && graph.dep_in_same_package(id, dep, tag)
            });
            if let Some((_, dep)) = blocked {
                debug!(
                    unit = %graph.unit(id).name,
                    dep = %graph.unit(dep).name,
                    "not available to platform through dependency"
                );
                available.insert(id, false);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut unavailable = 0;
    for id in ids {
        let value = available[&id];
        if !value {
            unavailable += 1;
        }
        graph.unit_mut(id).state.platform_available = value;
    }
    unavailable
}
