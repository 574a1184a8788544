//! `stowage explain` command

use anyhow::{anyhow, Result};

use crate::cli::ExplainArgs;
use crate::commands::plan;
use stowage::resolver::Membership;

pub fn execute(args: ExplainArgs) -> Result<()> {
    let planned = plan(&args.graph)?;

    if !planned.plans.contains_key(args.bundle.as_str()) {
        return Err(anyhow!(
            "bundle `{}` not found in {}",
            args.bundle,
            args.graph.graph.display()
        ));
    }

    let explained = planned.explain(&args.bundle, &args.unit).ok_or_else(|| {
        anyhow!(
            "unit `{}` is not packaged in bundle `{}`\n\
             help: run `stowage plan --bundle {}` to see the payload",
            args.unit,
            args.bundle,
            args.bundle
        )
    })?;

    let membership = match explained.membership {
        Membership::Direct => "a direct",
        Membership::Indirect => "an indirect",
    };
    println!(
        "{} is {} member of {}",
        explained.unit, membership, explained.bundle
    );
    if !explained.variants.is_empty() {
        let variants: Vec<&str> = explained
            .variants
            .iter()
            .map(|v| if v.is_empty() { "platform" } else { v.as_str() })
            .collect();
        println!("variants: {}", variants.join(", "));
    }
    println!();
    println!("path:{}", explained.path);

    Ok(())
}
