use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use sprintguard::cli::{Cli, Commands};
use sprintguard::{Config, app, doctor, setup};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();
    let config = Config::load_or_init()?;

    match cli.command {
        Commands::Serve { host, port } => app::serve(config, host, port).await,
        Commands::Setup => setup::run(&config).await,
        Commands::Check => doctor::run(&config).await,
    }
}
