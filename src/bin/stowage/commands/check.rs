//! `stowage check` command

use anyhow::{bail, Result};

use crate::cli::CheckArgs;
use crate::commands::{emit_errors, plan};

pub fn execute(args: CheckArgs, color: bool) -> Result<()> {
    let planned = plan(&args.graph)?;

    for errors in planned.failures() {
        emit_errors(errors, color);
    }

    let bundles = planned.plans.len();
    let failed = planned.failures().count();
    if failed > 0 {
        bail!(
            "{} error{} in {} of {} bundle{}",
            planned.error_count(),
            if planned.error_count() == 1 { "" } else { "s" },
            failed,
            bundles,
            if bundles == 1 { "" } else { "s" }
        );
    }

    println!(
        "checked {} bundle{}, no errors",
        bundles,
        if bundles == 1 { "" } else { "s" }
    );
    Ok(())
}
