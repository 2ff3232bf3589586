//! Command-line interface: `serve` starts the HTTP + WebSocket control
//! surface, `audit` runs one audit synchronously against a sitemap or URL
//! list without starting a server, `validate` checks a config file.
//!
//! Grounded on the teacher's `Cli`/`Commands`/`setup_logging` shape
//! (`cli.rs`), subcommands replaced with the ones this system needs.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::{Config, EnvOverrides};
use crate::error::Result;
use crate::events::EventBus;
use crate::run::RunManager;

#[derive(Parser)]
#[command(name = "site-auditor")]
#[command(about = "Sitemap-driven website audit pipeline")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, help = "Enable verbose (debug) logging")]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP + WebSocket control surface.
    Serve {
        #[arg(short, long, default_value = "8080", help = "Bind port")]
        port: u16,

        #[arg(long, default_value = "0.0.0.0", help = "Bind address")]
        bind: String,
    },

    /// Run one audit to completion against a sitemap or URL list, without
    /// starting a server.
    Audit {
        #[arg(long, help = "Sitemap URL to crawl")]
        sitemap_url: Option<String>,

        #[arg(long, help = "Direct URL to audit (repeatable)")]
        url: Vec<String>,

        #[arg(short, long, help = "Directory the run's artifacts are written under")]
        output: PathBuf,

        #[arg(long, help = "Configuration file; merged under the CLI flags above")]
        config: Option<PathBuf>,
    },

    /// Validate a configuration file without running anything.
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        config: PathBuf,
    },
}

pub async fn run(cli: Cli, shutdown: tokio::sync::broadcast::Receiver<()>) -> Result<()> {
    match cli.command {
        Commands::Serve { port, bind } => run_serve(port, &bind, shutdown).await,
        Commands::Audit { sitemap_url, url, output, config } => {
            run_audit(sitemap_url, url, output, config, shutdown).await
        }
        Commands::Validate { config } => run_validate(config).await,
    }
}

async fn run_serve(
    port: u16,
    bind: &str,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> Result<()> {
    let addr: SocketAddr = format!("{bind}:{port}")
        .parse()
        .map_err(|e| crate::error::AuditError::ConfigError(format!("invalid bind address: {e}")))?;

    let bus = EventBus::new();
    let runs = RunManager::new(bus.clone(), EnvOverrides::from_env());
    let runs_for_shutdown = runs.clone();
    let router = crate::server::build_router(runs, bus);

    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| crate::error::AuditError::ConfigError(format!("failed to bind {addr}: {e}")))?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            info!("shutting down control surface, cancelling runs in flight");
            runs_for_shutdown.cancel_all();
        })
        .await
        .map_err(|e| crate::error::AuditError::ConfigError(e.to_string()))?;
    Ok(())
}

async fn run_audit(
    sitemap_url: Option<String>,
    urls: Vec<String>,
    output_dir: PathBuf,
    config_path: Option<PathBuf>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> Result<()> {
    let mut config = load_config_file(config_path).await?;
    if sitemap_url.is_some() {
        config.sitemap_url = sitemap_url;
    }
    if !urls.is_empty() {
        config.urls = urls;
    }
    config.output_dir = output_dir.display().to_string();
    config.validate()?;

    let bus = EventBus::new();
    let runs = RunManager::new(bus, EnvOverrides::from_env());
    let handle = runs.start(config).await?;
    info!("started run {}", handle.run_id);

    loop {
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_millis(250)) => {
                if let Some(summary) = runs.summary(&handle.run_id).await {
                    info!(
                        "run {} finished: {} pages audited",
                        handle.run_id,
                        summary.total_urls
                    );
                    println!("{}", serde_json::to_string_pretty(&summary).unwrap_or_default());
                    break;
                }
            }
            _ = shutdown.recv() => {
                info!("cancelling run {} on shutdown signal", handle.run_id);
                handle.cancel();
                break;
            }
        }
    }

    Ok(())
}

async fn run_validate(config_path: PathBuf) -> Result<()> {
    let config = load_config_file(Some(config_path.clone())).await?;
    config.validate()?;
    println!("configuration is valid: {}", config_path.display());
    println!("  outputDir: {}", config.output_dir);
    println!("  concurrency: {}", config.concurrency);
    println!("  maxPages: {}", config.max_pages);
    Ok(())
}

async fn load_config_file(path: Option<PathBuf>) -> Result<Config> {
    let Some(path) = path else { return Ok(Config::default()) };
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| crate::error::AuditError::ConfigError(format!("failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| crate::error::AuditError::ConfigError(format!("failed to parse {}: {e}", path.display())))
}

/// Initializes `tracing-subscriber`'s fmt layer at `INFO`, or `DEBUG` under
/// `--verbose`, exactly as the teacher's `setup_logging` does.
pub fn setup_logging(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).with_target(false).init();
}
