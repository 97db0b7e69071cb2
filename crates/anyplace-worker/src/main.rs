//! Anyplace worker host - runs the offline caching worker from a terminal.
//!
//! Each invocation delivers one platform event (install, activate, fetch,
//! sync) to the worker against the on-disk cache, or keeps it alive to
//! deliver periodic sync on a timer.

mod commands;
mod host;

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use anyplace_core::{
    DiskCacheStorage, HttpFetcher, NetworkStatus, ServiceWorker, WorkerConfig, WorkerParts,
};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use host::{TerminalHost, TerminalNotifier};

/// Log file name prefix inside the log directory
const LOG_FILE_PREFIX: &str = "anyplace.log";

#[derive(Parser)]
#[command(name = "anyplace", version, about = "Offline caching worker for the Anyplace timeline")]
struct Cli {
    /// Behave as if the client reported itself offline
    #[arg(long, global = true)]
    offline: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true, env = "ANYPLACE_LOG_DIR")]
    log_dir: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Seed the cache with the static asset manifest
    Install,
    /// Take control of open clients
    Activate,
    /// Report periodic sync support
    Ready,
    /// Fetch a URL through the worker and print the body
    Fetch {
        url: String,
        /// Write the body to this file instead of stdout
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
    },
    /// Run one background sync of the timeline document
    Sync {
        /// Sync tag to deliver (defaults to the configured tag)
        #[arg(long)]
        tag: Option<String>,
    },
    /// Deliver periodic sync on a timer until interrupted
    Watch {
        /// Seconds between syncs (defaults to the configured interval)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Print the timeline document, newest entry first
    Timeline,
    /// List cached entries with their age
    Keys,
    /// Delete caches left behind by previous worker versions
    Prune,
    /// Print the effective configuration
    Config {
        /// Write it to the config file so it can be edited
        #[arg(long)]
        save: bool,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

pub struct Runtime {
    pub worker: ServiceWorker,
    pub storage: Arc<DiskCacheStorage>,
    pub host: Arc<TerminalHost>,
    pub config: WorkerConfig,
}

fn build_runtime(config: WorkerConfig, offline: bool) -> Result<Runtime> {
    let cache_dir = config.cache_dir()?;
    let storage = Arc::new(
        DiskCacheStorage::new(cache_dir.clone())
            .with_context(|| format!("Failed to open cache directory {}", cache_dir.display()))?,
    );
    let fetcher = Arc::new(
        HttpFetcher::new(config.origin_url()?, config.request_timeout())
            .context("Failed to build HTTP client")?,
    );
    let host = Arc::new(TerminalHost::default());
    let worker = ServiceWorker::new(
        &config,
        WorkerParts {
            storage: storage.clone(),
            fetcher,
            connectivity: Arc::new(NetworkStatus::new(!offline)),
            notifier: Arc::new(TerminalNotifier),
            host: host.clone(),
        },
    )?;
    Ok(Runtime {
        worker,
        storage,
        host,
        config,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_deref());

    let config = WorkerConfig::load()?;
    info!(cache = %config.cache_name, origin = %config.origin, "Anyplace worker starting");
    let runtime = build_runtime(config, cli.offline)?;

    match cli.command {
        Command::Install => commands::install(&runtime).await,
        Command::Activate => commands::activate(&runtime).await,
        Command::Ready => commands::ready(&runtime).await,
        Command::Fetch { url, output } => commands::fetch(&runtime, &url, output.as_deref()).await,
        Command::Sync { tag } => commands::sync(&runtime, tag).await,
        Command::Watch { interval } => commands::watch(&runtime, interval).await,
        Command::Timeline => commands::timeline(&runtime).await,
        Command::Keys => commands::keys(&runtime).await,
        Command::Prune => commands::prune(&runtime).await,
        Command::Config { save } => commands::config(&runtime, save),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_fetch_with_global_offline() {
        let cli = Cli::try_parse_from(["anyplace", "fetch", "http://localhost:8080/", "--offline"])
            .unwrap();
        assert!(cli.offline);
        assert!(matches!(cli.command, Command::Fetch { ref url, output: None } if url == "http://localhost:8080/"));
    }

    #[test]
    fn test_parse_watch_interval() {
        let cli = Cli::try_parse_from(["anyplace", "watch", "--interval", "60"]).unwrap();
        assert!(matches!(cli.command, Command::Watch { interval: Some(60) }));
    }
}
