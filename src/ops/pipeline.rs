//! The full planning pipeline.
//!
//! Each pass runs to completion for every bundle before the next one starts:
//!
//! 1. declare bundle dependency edges
//! 2. mark platform availability
//! 3. collect membership (parallel per bundle)
//! 4. partition and create variants
//! 5. synthesize payloads and validate (parallel per bundle)
//!
//! A bundle with any error yields no plan. Errors never stop other bundles
//! from being planned.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::builder::plan::BundlePlan;
use crate::builder::synth::synthesize;
use crate::core::graph::{UnitGraph, UnitId};
use crate::core::walk::DependencyPath;
use crate::core::{BundleError, BundleErrors};
use crate::ops::load::load_graph;
use crate::ops::validate::{validate_bundle, Baseline};
use crate::resolver::deps::declare_all;
use crate::resolver::membership::{collect_all, continue_walk, Membership, MembershipIndex};
use crate::resolver::platform::mark_platform_availability;
use crate::resolver::variants::{partition, VariantPlan};
use crate::util::{Config, Name};

/// Outcome of planning every bundle of a graph.
#[derive(Debug)]
pub struct Planned {
    pub graph: UnitGraph,
    pub index: MembershipIndex,
    pub variants: VariantPlan,
    pub plans: BTreeMap<Name, Result<BundlePlan, BundleErrors>>,
}

impl Planned {
    pub fn plan(&self, bundle: &str) -> Option<&BundlePlan> {
        self.plans.get(bundle).and_then(|r| r.as_ref().ok())
    }

    /// Bundles that failed, in name order.
    pub fn failures(&self) -> impl Iterator<Item = &BundleErrors> {
        self.plans.values().filter_map(|r| r.as_ref().err())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn error_count(&self) -> usize {
        self.failures().map(BundleErrors::len).sum()
    }

    /// Why `unit` is part of `bundle`.
    pub fn explain(&self, bundle: &str, unit: &str) -> Option<Explanation> {
        explain(&self.graph, &self.index, bundle, unit)
    }
}

/// Plan every bundle declared in a graph file.
pub fn plan_file(path: &Path, config: &Config) -> Result<Planned> {
    let graph = load_graph(path, config)?;
    Ok(plan_graph(graph, config))
}

/// Plan every bundle of an already built graph.
pub fn plan_graph(mut graph: UnitGraph, config: &Config) -> Planned {
    let declared = declare_all(&mut graph, config);

    let unavailable = mark_platform_availability(&mut graph);
    debug!(unavailable, "platform availability marked");

    let bundles = graph.bundles();
    let index = collect_all(&graph, &bundles, config);

    let variants = partition(&graph, &index);
    variants.apply(&mut graph);

    let baseline = Baseline::with_extra(&config.availability);
    let results: Vec<(Name, Result<BundlePlan, BundleErrors>)> = bundles
        .par_iter()
        .map(|&id| {
            let name = graph.unit(id).name;
            let early = declared.get(&name).cloned().unwrap_or_default();
            (name, plan_bundle(&graph, &index, id, &baseline, config, early))
        })
        .collect();

    let plans: BTreeMap<_, _> = results.into_iter().collect();
    let failed = plans.values().filter(|r| r.is_err()).count();
    info!(
        bundles = plans.len(),
        failed,
        "planning complete"
    );

    Planned {
        graph,
        index,
        variants,
        plans,
    }
}

/// Synthesize and validate one bundle, folding in errors from earlier passes.
fn plan_bundle(
    graph: &UnitGraph,
    index: &MembershipIndex,
    bundle_id: UnitId,
    baseline: &Baseline,
    config: &Config,
    early: Vec<BundleError>,
) -> Result<BundlePlan, BundleErrors> {
    let mut errors = BundleErrors::new(graph.unit(bundle_id).name);
    errors.extend(early);

    let synthesized = synthesize(graph, index, bundle_id, config);
    let plan = match synthesized {
        Ok(plan) => Some(plan),
        Err(failed) => {
            errors.extend(failed.errors);
            None
        }
    };
    errors.extend(validate_bundle(graph, bundle_id, baseline, config));

    match plan {
        Some(plan) if errors.is_empty() => Ok(plan),
        _ => Err(errors),
    }
}

/// Membership of one unit in one bundle, with a path that reaches it.
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub bundle: Name,
    pub unit: Name,
    pub membership: Membership,
    pub path: DependencyPath,
    /// Variant keys the unit is built in.
    pub variants: Vec<String>,
}

/// Find the first path by which `bundle` reaches `unit`.
pub fn explain(
    graph: &UnitGraph,
    index: &MembershipIndex,
    bundle: &str,
    unit: &str,
) -> Option<Explanation> {
    let contents = index.contents(bundle)?;
    let membership = contents.membership(unit)?;
    let bundle_id = graph.find_common(bundle)?;
    let decl = graph.unit(bundle_id).as_bundle()?;

    let mut found: Option<(UnitId, DependencyPath)> = None;
    graph.walk(bundle_id, |step| {
        if found.is_some() || !continue_walk(step, decl) {
            return false;
        }
        if graph.unit(step.child).name == unit {
            found = Some((step.child, step.path()));
            return false;
        }
        true
    });
    let (unit_id, path) = found?;

    Some(Explanation {
        bundle: decl.name,
        unit: graph.unit(unit_id).name,
        membership,
        path,
        variants: graph.unit(unit_id).state.variations.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tag::TagKind;
    use crate::ops::load::GraphFile;
    use crate::test_support::fixtures::{BROKEN_GRAPH, CORE_GRAPH};
    use crate::test_support::GraphBuilder;

    fn plan_toml(content: &str) -> Planned {
        let config = Config::default();
        let graph = GraphFile::parse(content)
            .unwrap()
            .into_graph(&config)
            .unwrap();
        plan_graph(graph, &config)
    }

    #[test]
    fn test_core_scenario_end_to_end() {
        let planned = plan_toml(CORE_GRAPH);
        assert!(planned.is_success(), "{:?}", planned.plans);

        let plan = planned.plan("pkg.core").unwrap();
        assert_eq!(
            plan.paths(),
            vec!["bin/bin1", "lib/libfoo.so", "lib64/libfoo.so"]
        );
        assert_eq!(plan.require_native_libs, vec!["libbar.so"]);
        assert_eq!(plan.required_modules, vec![Name::new("libbar")]);
    }

    #[test]
    fn test_variants_created_for_members() {
        let planned = plan_toml(CORE_GRAPH);
        let libfoo = planned
            .graph
            .variants_of("libfoo")
            .into_iter()
            .next()
            .unwrap();
        assert_eq!(planned.variants.keys(libfoo), vec!["apex29".to_string()]);
        assert_eq!(planned.graph.unit(libfoo).state.variations, vec!["apex29"]);
    }

    #[test]
    fn test_errors_are_collected_per_bundle() {
        let planned = plan_toml(BROKEN_GRAPH);
        assert!(!planned.is_success());

        let a = planned.plans[&Name::new("pkg.a")].as_ref().unwrap_err();
        assert!(a
            .iter()
            .any(|e| matches!(e, BundleError::MinSdk { unit, .. } if *unit == "libnew")));
        assert!(a
            .iter()
            .any(|e| matches!(e, BundleError::NotAvailable { dep, .. } if *dep == "libhidden")));

        let b = planned.plans[&Name::new("pkg.b")].as_ref().unwrap_err();
        assert!(b.iter().all(|e| matches!(e, BundleError::NotAvailable { .. })));
        assert!(planned.error_count() > b.len());
    }

    #[test]
    fn test_declaration_errors_block_plan() {
        let mut b = GraphBuilder::new().single_target();
        b.bundle("pkg.core", |bundle| {
            bundle.native.native_shared_libs = vec!["libmissing".into()];
        });
        b.bundle("pkg.other", |_| {});
        let (graph, _) = b.build_with_errors();

        let planned = plan_graph(graph, b.config());
        let errors = planned.plans[&Name::new("pkg.core")].as_ref().unwrap_err();
        assert!(matches!(
            errors.errors[0],
            BundleError::UnresolvedDependency { property: "native_shared_libs", .. }
        ));
        assert!(planned.plan("pkg.other").is_some());
    }

    #[test]
    fn test_explain_reports_path() {
        let mut b = GraphBuilder::new().single_target();
        b.bundle("pkg.core", |bundle| {
            bundle.native.native_shared_libs = vec!["libfoo".into()];
        });
        b.shared_lib("libfoo")
            .static_lib("libstatic")
            .dep("libfoo", "libstatic", TagKind::Static)
            .available("libfoo", &["pkg.core"])
            .available("libstatic", &["pkg.core"]);
        let graph = b.build();
        let index = collect_all(&graph, &graph.bundles(), b.config());

        let explained = explain(&graph, &index, "pkg.core", "libstatic").unwrap();
        assert_eq!(explained.membership, Membership::Indirect);
        assert_eq!(
            explained.path.names(),
            vec![
                Name::new("pkg.core"),
                Name::new("libfoo"),
                Name::new("libstatic")
            ]
        );
        assert!(explain(&graph, &index, "pkg.core", "libnothere").is_none());
    }
}
