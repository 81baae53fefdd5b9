use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "regmigrate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StateArgs {
    /// Path to the migration config (TOML)
    #[arg(short, long, env = "REGMIGRATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the state file (defaults to the config's state_file, or
    /// <config>.state.json next to the config)
    #[arg(long, env = "REGMIGRATE_STATE")]
    pub state: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Migrate images from the source registry to the target registry
    Migrate {
        #[command(flatten)]
        args: StateArgs,

        /// Log what would be copied without copying or recording status
        #[arg(long)]
        dry_run: bool,
    },

    /// Discover tags and print the images that still need migrating
    Plan {
        #[command(flatten)]
        args: StateArgs,
    },

    /// Summarize the state file without contacting any registry
    Status {
        #[command(flatten)]
        args: StateArgs,
    },

    /// Show version information
    Version,
}
