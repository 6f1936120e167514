//! vidlens CLI entry point.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vidlens::cli::commands::{self, AnalyzeOptions};
use vidlens::cli::{Cli, Commands};
use vidlens::config::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.as_deref().map(Settings::expand_path);
    let settings = Settings::load_from(config_path.as_ref())?;

    // Initialize logging
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("vidlens={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    std::fs::create_dir_all(settings.temp_dir())?;

    // Execute command
    match cli.command {
        Commands::Doctor => {
            commands::run_doctor(&settings)?;
        }

        Commands::Analyze {
            input,
            analysis_type,
            language,
            segments,
            segment_duration,
            frame_interval,
            provider,
            output,
            json,
        } => {
            let options = AnalyzeOptions {
                analysis_type,
                language,
                segments,
                segment_duration,
                frame_interval,
                provider,
                output,
                json,
            };
            commands::run_analyze(&input, options, settings).await?;
        }

        Commands::Serve { host, port } => {
            commands::run_serve(host, port, settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(&action, settings, config_path)?;
        }
    }

    Ok(())
}
