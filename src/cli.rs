// src/cli.rs
//! CLI definitions for blackarch-aio

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "blackarch-aio")]
#[command(author = "BlackArch AIO Contributors")]
#[command(version)]
#[command(about = "BlackArch installer and self-repairing system updater", long_about = None)]
pub struct Cli {
    /// Configuration file (default: /etc/blackarch-aio/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full BlackArch installation
    Install,

    /// Unified system update with automatic repair
    Update,

    /// Install missing AUR helpers
    FixHelpers,

    /// Rank mirrors and install a fresh mirrorlist
    Mirrors {
        /// Two-letter country code (default: geolocated)
        #[arg(long)]
        country: Option<String>,
    },

    /// Upgrade pending kernel packages, rebuild DKMS modules and initramfs
    KernelUpgrade,

    /// Apply preventive fixes (libjodycode, dracut, kernel-install)
    SystemFixes,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Commands {
    /// Name used in the run report
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Install => "install",
            Commands::Update => "update",
            Commands::FixHelpers => "fix-helpers",
            Commands::Mirrors { .. } => "mirrors",
            Commands::KernelUpgrade => "kernel-upgrade",
            Commands::SystemFixes => "system-fixes",
            Commands::Completions { .. } => "completions",
        }
    }
}
