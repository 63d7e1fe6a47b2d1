// Chorus
// Main entry point for the chorus binary

use clap::Parser;
use chorus_engine::cli::{Cli, Command, SecretAction};
use chorus_engine::config::Config;
use chorus_engine::handlers::{
    handle_check, handle_personas, handle_run, handle_secret_set, OutputFormat,
};
use chorus_engine::telemetry::init_telemetry_with_level;

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

    // --log wins over the config file; RUST_LOG wins over both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Chorus v{} ({} - {})", version, commit, timestamp);

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Handle commands
    match cli.command {
        Command::Run { personas } => {
            tracing::info!("Starting personas...");
            handle_run(&config, &personas).await
        }

        Command::Check => handle_check(&config, format).await,

        Command::Personas => handle_personas(&config, format),

        Command::Secret { action } => match action {
            SecretAction::Set { key } => handle_secret_set(&config, &key),
        },
    }
}
