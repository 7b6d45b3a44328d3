//! askvid CLI entry point.

use anyhow::Result;
use askvid::cli::{commands, Cli, Commands};
use askvid::config::Settings;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let settings = match &cli.config {
        Some(path) => Settings::load_from(Some(&Settings::expand_path(path)))?,
        None => Settings::load()?,
    };
    let settings = match cli.provider {
        Some(provider) => settings.with_provider(provider),
        None => settings,
    };

    // Initialize logging; -v flags override the configured level
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("askvid={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Ensure data directories exist
    std::fs::create_dir_all(settings.videos_dir())?;

    // Execute command
    match &cli.command {
        Commands::Load { url } => {
            commands::run_load(url, settings).await?;
        }

        Commands::Ask { url } => {
            commands::run_ask(url, settings).await?;
        }

        Commands::Batch {
            url,
            questions,
            output,
            independent,
        } => {
            commands::run_batch(url, questions.clone(), output.clone(), *independent, settings)
                .await?;
        }

        Commands::Cache { action } => {
            commands::run_cache(action, settings)?;
        }

        Commands::Config { action } => {
            commands::run_config(action, &settings, cli.config.as_deref())?;
        }
    }

    Ok(())
}
