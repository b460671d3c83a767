//! Loom, a package and build manager for Verilog/SystemVerilog projects.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod build;
mod cache_cmd;
mod lock;
mod tree;
mod update;

#[derive(Parser)]
#[command(name = "loom")]
#[command(version)]
#[command(about = "A package and build manager for Verilog/SystemVerilog", long_about = None)]
struct Cli {
    /// Enable debug logging.
    #[arg(long, global = true)]
    verbose: bool,

    /// Cache directory (defaults to ~/.loom/cache).
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve dependencies and write Loom.lock
    Lock {
        /// Fail instead of touching the network.
        #[arg(long)]
        offline: bool,

        /// Re-resolve everything, ignoring the existing lockfile.
        #[arg(long)]
        update: bool,

        /// Ignore Loom.local overrides.
        #[arg(long)]
        no_local: bool,
    },

    /// Re-resolve a single package to its latest matching revision
    Update {
        /// Package name to update.
        package: String,

        /// Fail instead of touching the network.
        #[arg(long)]
        offline: bool,

        /// Ignore Loom.local overrides.
        #[arg(long)]
        no_local: bool,
    },

    /// Parse project sources through the incremental build cache
    Build {
        /// Active target set, comma-separated (e.g. "fpga,sim").
        #[arg(long)]
        targets: Option<String>,
    },

    /// Inspect and maintain the caches
    Cache {
        #[command(subcommand)]
        action: cache_cmd::CacheAction,
    },

    /// Print the dependency tree recorded in Loom.lock
    Tree,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let cache_root = cli
        .cache_dir
        .clone()
        .unwrap_or_else(loom_pkg::SourceCache::default_root);

    match cli.command {
        Commands::Lock {
            offline,
            update,
            no_local,
        } => lock::run(&cache_root, offline, update, no_local),
        Commands::Update {
            package,
            offline,
            no_local,
        } => update::run(&cache_root, &package, offline, no_local),
        Commands::Build { targets } => build::run(&cache_root, targets.as_deref()),
        Commands::Cache { action } => cache_cmd::run(&cache_root, &action),
        Commands::Tree => tree::run(),
    }
}
