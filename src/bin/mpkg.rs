//! mpkg CLI - source-based package management.
//!
//! Usage:
//!   mpkg --config /etc/mpkg.toml install <pkg>
//!   mpkg upgrade <pkg>
//!   mpkg autoremove

use anyhow::Result;
use clap::{Parser, Subcommand};
use mpkg::{Config, ops, output};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mpkg")]
#[command(about = "Source-based package manager")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(
        long,
        global = true,
        env = "MPKG_CONFIG",
        default_value = "/etc/mpkg.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show recipe metadata and installed state
    Info { package: String },
    /// Build a package, installing missing dependencies first
    Build { package: String },
    /// Install a previously built package
    Install { package: String },
    /// Remove an installed package
    Remove { package: String },
    /// List orphaned packages
    Orphans,
    /// Remove all orphaned packages
    Autoremove,
    /// Remove, rebuild, and reinstall a package
    Rebuild { package: String },
    /// Rebuild every installed package in dependency order
    RebuildSystem,
    /// Rebuild a package when its recipe version is newer
    Upgrade { package: String },
    /// List installed packages with versions
    ListInstalled,
    /// Mark a package as manually requested
    MarkManual { package: String },
    /// Synchronize the recipe tree
    Sync,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        output::error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let cfg = Config::load(&cli.config)?;
    output::set_color(cfg.color);

    match cli.command {
        Commands::Info { package } => ops::info(&cfg, &package),
        Commands::Build { package } => ops::build(&cfg, &package),
        Commands::Install { package } => ops::install(&cfg, &package),
        Commands::Remove { package } => ops::remove(&cfg, &package),
        Commands::Orphans => ops::orphans(&cfg),
        Commands::Autoremove => ops::autoremove(&cfg),
        Commands::Rebuild { package } => ops::rebuild(&cfg, &package),
        Commands::RebuildSystem => ops::rebuild_system(&cfg),
        Commands::Upgrade { package } => ops::upgrade(&cfg, &package),
        Commands::ListInstalled => ops::list_installed(&cfg),
        Commands::MarkManual { package } => ops::mark_manual(&cfg, &package),
        Commands::Sync => ops::sync(&cfg),
    }
}
