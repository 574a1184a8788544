//! Command implementations.

pub mod check;
pub mod completions;
pub mod explain;
pub mod plan;

use anyhow::{Context, Result};

use stowage::core::BundleErrors;
use stowage::ops::{plan_file, Planned};
use stowage::util::config::load_project_config;
use stowage::util::diagnostic::emit;
use stowage::util::Config;

use crate::cli::GraphArgs;

/// Merged configuration with command-line overrides applied last.
pub fn load_config(args: &GraphArgs) -> Result<Config> {
    let cwd = std::env::current_dir().context("failed to get current directory")?;
    let mut config = load_project_config(&cwd);

    if !args.arches.is_empty() {
        config.targets.arches = args.arches.clone();
    }
    if let Some(id) = &args.build_id {
        config.build.build_id = Some(id.clone());
    }
    if args.unbundled {
        config.build.unbundled_build = true;
    }
    if args.allow_missing_dependencies {
        config.build.allow_missing_dependencies = true;
    }
    Ok(config)
}

/// Load the graph file and plan every bundle.
pub fn plan(args: &GraphArgs) -> Result<Planned> {
    let config = load_config(args)?;
    plan_file(&args.graph, &config)
}

/// Print every error of a failed bundle to stderr.
pub fn emit_errors(errors: &BundleErrors, color: bool) {
    for error in errors.iter() {
        emit(&error.to_diagnostic(), color);
        eprintln!();
    }
}
