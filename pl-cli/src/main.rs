//! PrayLock CLI - command-line interface for the PrayLock client engine.
//!
//! Drives the engine headlessly: inspect window state and queues, force
//! queue passes, run enforcement checks, and watch engine events. Useful
//! for debugging the sync core without a device build.

mod commands;

use clap::{Parser, Subcommand};
use tracing::info;

use pl_core::config::{AppConfig, ConfigHandle};
use pl_core::error::PlResult;
use pl_core::logging;
use pl_core::platform::Platform;

/// PrayLock - prayer habit engine CLI.
#[derive(Parser)]
#[command(
    name = "praylock",
    version,
    about = "PrayLock client engine CLI",
    long_about = "A command-line interface for the PrayLock client engine.\n\
                   Inspects prayer-window state, drives the offline retry queues,\n\
                   and reconciles PRAYLOCK enforcement from the terminal."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json).
    #[arg(short = 'f', long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output for scripting.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show window state, queue depths, and service health.
    Status,
    /// Inspect and drive the retry queues.
    Queues {
        #[command(subcommand)]
        action: commands::queues::QueuesAction,
    },
    /// Run PRAYLOCK enforcement checks.
    Enforce {
        #[command(subcommand)]
        action: commands::enforce::EnforceAction,
    },
    /// View and modify PRAYLOCK settings.
    Settings {
        #[command(subcommand)]
        action: commands::settings::SettingsAction,
    },
    /// Watch engine events in real time.
    Watch,
}

#[tokio::main]
async fn main() -> PlResult<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let log_dir = Platform::data_dir()
        .unwrap_or_else(|_| std::path::PathBuf::from("."))
        .join("logs");
    let _guard = logging::init_logging(log_level, &log_dir, false)?;

    let config_path = cli.config.as_deref().map(std::path::Path::new);
    let config = if let Some(path) = config_path {
        AppConfig::load_from_file(path)?
    } else {
        AppConfig::load_default()?
    };
    let config_handle = ConfigHandle::new(config);

    info!("PrayLock CLI v{}", pl_core::constants::APP_VERSION);

    match cli.command {
        Commands::Status => commands::status::run(config_handle, cli.format).await,
        Commands::Queues { action } => {
            commands::queues::run(config_handle, action, cli.format).await
        }
        Commands::Enforce { action } => {
            commands::enforce::run(config_handle, action, cli.format).await
        }
        Commands::Settings { action } => {
            commands::settings::run(config_handle, action, cli.format).await
        }
        Commands::Watch => commands::watch::run(config_handle).await,
    }
}
