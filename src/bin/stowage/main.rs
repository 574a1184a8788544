//! Stowage CLI - bundle payload planning

use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging; stdout is reserved for plans
    let filter = if cli.verbose {
        EnvFilter::new("stowage=debug")
    } else {
        EnvFilter::new("stowage=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let color = !cli.no_color && std::io::stderr().is_terminal();

    // Execute command
    match cli.command {
        Commands::Plan(args) => commands::plan::execute(args, color),
        Commands::Check(args) => commands::check::execute(args, color),
        Commands::Explain(args) => commands::explain::execute(args),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
