//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use stowage::core::Arch;

/// Stowage - bundle membership, variant and payload planning
#[derive(Parser)]
#[command(name = "stowage")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Plan the payload of every bundle in a graph file
    Plan(PlanArgs),

    /// Validate every bundle and print diagnostics only
    Check(CheckArgs),

    /// Explain why a unit is packaged in a bundle
    Explain(ExplainArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Graph and build settings shared by the planning commands.
#[derive(Args)]
pub struct GraphArgs {
    /// Graph file declaring bundles and units
    pub graph: PathBuf,

    /// Device architecture, primary first (repeatable)
    #[arg(long = "arch", value_name = "ARCH", value_parser = parse_arch)]
    pub arches: Vec<Arch>,

    /// Build identifier appended to application install directories
    #[arg(long, env = "STOWAGE_BUILD_ID")]
    pub build_id: Option<String>,

    /// Plan bundles built without the platform image
    #[arg(long)]
    pub unbundled: bool,

    /// Defer errors about missing signing material to packaging time
    #[arg(long)]
    pub allow_missing_dependencies: bool,
}

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub graph: GraphArgs,

    /// Only print the plan of this bundle
    #[arg(long, short)]
    pub bundle: Option<String>,

    /// Print plans as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub graph: GraphArgs,
}

#[derive(Args)]
pub struct ExplainArgs {
    #[command(flatten)]
    pub graph: GraphArgs,

    /// Bundle to inspect
    pub bundle: String,

    /// Unit to explain
    pub unit: String,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}

fn parse_arch(s: &str) -> Result<Arch, String> {
    match s {
        "arm" => Ok(Arch::Arm),
        "arm64" => Ok(Arch::Arm64),
        "x86" => Ok(Arch::X86),
        "x86_64" => Ok(Arch::X86_64),
        other => Err(format!(
            "unknown architecture `{other}` (expected arm, arm64, x86 or x86_64)"
        )),
    }
}
