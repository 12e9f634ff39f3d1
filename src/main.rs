//! opsum - summarization coordination for a shared ordered op log
//!
//! Main entry point for the opsum CLI.

mod cli;
mod cmd_config;
mod cmd_simulate;

use std::path::PathBuf;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use opsum_config::{ConfigLoader, LogFormat, LoggingConfig};

use crate::cli::{Cli, Commands};

/// Initialize tracing with console and optional file output.
///
/// `RUST_LOG` wins over the configured level. When a log directory is set,
/// a daily rolling file gets the same events without ANSI colors.
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let (file_layer, guard) = match &logging.directory {
        Some(directory) => {
            let log_dir = PathBuf::from(ConfigLoader::expand_path(directory));
            std::fs::create_dir_all(&log_dir)?;
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("opsum")
                .filename_suffix("log")
                .max_log_files(logging.max_log_files)
                .build(&log_dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            (
                Some(fmt::layer().with_writer(non_blocking).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    let (json_layer, pretty_layer) = match logging.format {
        LogFormat::Json => (Some(fmt::layer().json().with_writer(std::io::stderr)), None),
        LogFormat::Pretty => (
            None,
            Some(fmt::layer().with_target(true).with_writer(std::io::stderr)),
        ),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::CheckConfig => cmd_config::handle_check_config(cli.config.as_deref()),
        Commands::Simulate {
            ops,
            nack_every,
            json,
        } => {
            let config = ConfigLoader::load_or_default(cli.config.as_deref())?;
            let _guard = init_tracing(&config.logging)?;
            cmd_simulate::handle_simulate(config, ops, nack_every, json).await
        }
    }
}
