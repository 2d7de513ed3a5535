// Kestrel task and reflex engine
// Main entry point for the kestrel binary

use clap::Parser;
use kestrel_engine::cli::{Cli, Command, ConfigAction};
use kestrel_engine::config::Config;
use kestrel_engine::handlers::{
    handle_config_show, handle_events, handle_placements, handle_simulate, OutputFormat,
};
use kestrel_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // Initialize telemetry; an explicit --log wins over the config level
    // (RUST_LOG still wins over both)
    init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Kestrel Engine v{} ({} - {})", version, commit, timestamp);

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Handle commands
    match cli.command {
        Command::Simulate {
            task,
            ticks,
            seed,
            persist,
        } => handle_simulate(&task, ticks, seed, persist, &config, format).await,

        Command::Placements { limit } => handle_placements(limit, &config, format).await,

        Command::Events { limit } => handle_events(limit, &config, format).await,

        Command::Config { action } => match action {
            ConfigAction::Show => handle_config_show(&config, format),
            ConfigAction::Validate => {
                // Loading already validated it
                println!("Configuration is valid");
                Ok(())
            }
        },
    }
}
