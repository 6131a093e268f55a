use anyhow::{Context, Result};
use clap::Parser;
use std::{fmt::Debug, path::PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use getstats_server::config::{AppConfig, CliConfig, FileConfig};
use getstats_server::server::{metrics, run_server, RequestsLoggingLevel};
use getstats_server::stats_store::open_stats_db;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[clap(about = "Collects stats reports over HTTP into a self-extending SQLite table")]
struct CliArgs {
    /// Path to a TOML config file. Values in the file override the flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite database file, created if missing.
    #[clap(long, value_parser = parse_path, default_value = "getstats.db")]
    pub db_path: PathBuf,

    /// The address to listen on.
    #[clap(long, default_value = "0.0.0.0")]
    pub host: String,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 8080)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping). 0 disables it.
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// How many payloads may wait for the writer before requests are refused.
    #[clap(long, default_value_t = 1024)]
    pub queue_capacity: usize,

    /// Keep each report's JSON in the getstats_json table.
    #[clap(long, default_value_t = false, action = clap::ArgAction::Set)]
    pub store_raw_json: bool,

    /// Flatten each report into a row of the getstats table.
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub store_normalized: bool,

    /// Log at debug level unless LOG_LEVEL says otherwise.
    #[clap(long)]
    pub debug: bool,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_path: self.db_path.clone(),
            host: self.host.clone(),
            port: self.port,
            metrics_port: self.metrics_port,
            logging_level: self.logging_level.clone(),
            queue_capacity: self.queue_capacity,
            store_raw_json: self.store_raw_json,
            store_normalized: self.store_normalized,
            debug: self.debug,
        }
    }
}

fn init_tracing(debug: bool) -> Result<()> {
    let default_level = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")
}

/// Cancels `token` on Ctrl-C or, on unix, SIGTERM.
async fn wait_for_shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("Could not listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown requested");
    token.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    init_tracing(config.debug)?;
    if let Some(path) = &cli_args.config {
        info!("Loaded config file {:?}", path);
    }

    info!("Opening SQLite stats database at {:?}...", config.db_path);
    let conn = open_stats_db(&config.db_path)?;

    info!("Initializing metrics...");
    metrics::init_metrics();

    info!(
        "Writer queue capacity {}, raw json {}, normalized {}",
        config.queue_capacity, config.writer.store_raw_json, config.writer.store_normalized
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_shutdown_signal(shutdown.clone()));

    run_server(
        config.server_config(),
        conn,
        config.writer,
        config.queue_capacity,
        shutdown,
    )
    .await?;

    info!("Bye");
    Ok(())
}
