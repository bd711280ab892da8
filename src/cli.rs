use clap::{Parser, Subcommand};

/// `sprintguard` — reactive sprint-policy enforcement for a hosted project
/// tracker.
#[derive(Parser, Debug)]
#[command(name = "sprintguard")]
#[command(version = "0.3.0")]
#[command(about = "Detects and reverts out-of-policy sprint task edits.", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the webhook gateway and enforcement worker
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Activate monitoring: flag the relevant sprints and seed snapshots
    Setup,

    /// Validate configuration and probe the tracker collections
    Check,
}
