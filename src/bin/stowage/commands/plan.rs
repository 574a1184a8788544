//! `stowage plan` command

use std::collections::BTreeMap;

use anyhow::{bail, Result};

use crate::cli::PlanArgs;
use crate::commands::{emit_errors, plan};
use stowage::builder::{BundlePlan, KeyMaterial};
use stowage::core::BundleErrors;
use stowage::util::diagnostic::{emit, suggestions};
use stowage::util::{Diagnostic, Name};

pub fn execute(args: PlanArgs, color: bool) -> Result<()> {
    let planned = plan(&args.graph)?;

    if let Some(bundle) = &args.bundle {
        if !planned.plans.contains_key(bundle.as_str()) {
            bail!(
                "bundle `{}` not found in {}\n\
                 help: run `stowage check` to list every bundle",
                bundle,
                args.graph.graph.display()
            );
        }
    }

    let selected: Vec<(&Name, &Result<BundlePlan, BundleErrors>)> = planned
        .plans
        .iter()
        .filter(|(name, _)| args.bundle.as_deref().map_or(true, |b| **name == b))
        .collect();

    let mut failed = 0;
    let mut ok = BTreeMap::new();
    for (name, result) in &selected {
        match result {
            Ok(plan) => {
                for error in &plan.deferred_errors {
                    let warning = Diagnostic::warning(error.to_string())
                        .with_context("deferred until packaging");
                    emit(&warning, color);
                }
                ok.insert(**name, plan);
            }
            Err(errors) => {
                failed += 1;
                emit_errors(errors, color);
            }
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ok)?);
    } else {
        for plan in ok.values() {
            print_plan(plan);
        }
    }

    if failed > 0 {
        bail!(
            "{} of {} bundle{} failed\n{}",
            failed,
            selected.len(),
            if selected.len() == 1 { "" } else { "s" },
            suggestions::PLAN_FAILED
        );
    }
    Ok(())
}

fn print_plan(plan: &BundlePlan) {
    println!(
        "{} (variation {}, min_sdk {}, {})",
        plan.bundle, plan.variation_name, plan.min_sdk, plan.payload_type
    );
    for file in &plan.files {
        let mut line = format!("  {}", file.path());
        if file.transitive {
            line.push_str(" [transitive]");
        }
        if file.jni {
            line.push_str(" [jni]");
        }
        println!("{line}");
        for link in file.symlink_paths() {
            println!("    -> {link}");
        }
    }
    if !plan.provide_native_libs.is_empty() {
        println!("  provides: {}", plan.provide_native_libs.join(", "));
    }
    if !plan.require_native_libs.is_empty() {
        println!("  requires: {}", plan.require_native_libs.join(", "));
    }
    if !plan.required_modules.is_empty() {
        let names: Vec<&str> = plan.required_modules.iter().map(|n| n.as_str()).collect();
        println!("  platform modules: {}", names.join(", "));
    }
    if let Some(key) = &plan.key {
        let state = match key {
            KeyMaterial::Resolved { .. } => "",
            KeyMaterial::Missing { .. } => " (missing)",
        };
        println!("  key: {}{}", key.name(), state);
    }
    println!("  fingerprint: {}", plan.fingerprint());
    println!();
}
