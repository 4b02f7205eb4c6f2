//! tinysocks - Minimal SOCKS5 CONNECT proxy server

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

use tinysocks::{config::ConfigManager, ConnectionManager};

/// CLI arguments for tinysocks
#[derive(Parser, Debug)]
#[command(name = "tinysocks")]
#[command(about = "tinysocks - Minimal SOCKS5 CONNECT proxy server")]
#[command(version)]
#[command(long_about = "
tinysocks - Minimal SOCKS5 CONNECT proxy server

Supports no-authentication negotiation, the CONNECT command, and IPv4 or
domain-name destinations.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  TINYSOCKS_BIND_ADDR        - Bind address (e.g., 127.0.0.1:45672)
  TINYSOCKS_BUFFER_SIZE      - Relay buffer size in bytes
  TINYSOCKS_CONNECT_TIMEOUT  - Target dial timeout (e.g., 10s)
  TINYSOCKS_LOG_LEVEL        - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "tinysocks.toml")]
    pub config: PathBuf,

    /// Bind address (overrides config file)
    #[arg(short, long, help = "Bind address (e.g., 127.0.0.1:45672)")]
    pub bind: Option<String>,

    /// Port to bind to (overrides config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Relay buffer size in bytes
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Target dial timeout in seconds
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long)]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long)]
    pub verbose: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let log_filter = init_tracing(&args);

    let mut config = ConfigManager::load(&args.config)?;

    config.merge_with_cli_args(
        args.bind.as_deref(),
        args.port,
        args.buffer_size,
        args.connect_timeout,
    )?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    config
        .validate()
        .context("Final configuration validation failed")?;

    if let Some(handle) = log_filter {
        handle
            .reload(EnvFilter::new(effective_level(args.verbose, &config.logging.level)))
            .context("Failed to apply configured log level")?;
    }

    if args.validate_config {
        info!("Configuration is valid");
        info!("  Bind address: {}", config.server.bind_addr);
        info!("  Buffer size: {} bytes", config.server.buffer_size);
        info!("  Connect timeout: {:?}", config.server.connect_timeout);
        info!("  Shutdown timeout: {:?}", config.server.shutdown_timeout);
        return Ok(());
    }

    info!("Starting tinysocks v{}", env!("CARGO_PKG_VERSION"));

    let mut manager = ConnectionManager::new(Arc::new(config));
    manager.bind().await?;
    let shutdown = manager.shutdown_coordinator();

    let server_handle = tokio::spawn(async move {
        if let Err(e) = manager.start().await {
            error!("Server error: {:#}", e);
        }
        if let Err(e) = manager.wait_for_connections_to_close().await {
            error!("Error during connection cleanup: {:#}", e);
        }
    });

    if let Err(e) = shutdown.listen_for_signals().await {
        error!("Error setting up signal handlers: {:#}", e);
    }
    shutdown.trigger();

    if let Err(e) = server_handle.await {
        error!("Server task failed: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}

type LogFilterHandle = reload::Handle<EnvFilter, Registry>;

/// Initialize tracing/logging before configuration is resolved.
///
/// `RUST_LOG` fixes the filter for the whole run. Otherwise the command-line
/// level is used until the configured level is known, and the returned handle
/// swaps it in.
fn init_tracing(args: &CliArgs) -> Option<LogFilterHandle> {
    fn fmt_layer<S>() -> tracing_subscriber::fmt::Layer<S>
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(true)
            .with_level(true)
    }

    if let Ok(env_filter) = EnvFilter::try_from_default_env() {
        tracing_subscriber::registry().with(env_filter).with(fmt_layer()).init();
        return None;
    }

    let bootstrap_level = effective_level(args.verbose, args.log_level.as_deref().unwrap_or("info"));
    let (filter_layer, handle) = reload::Layer::new(EnvFilter::new(bootstrap_level));
    tracing_subscriber::registry().with(filter_layer).with(fmt_layer()).init();
    Some(handle)
}

/// `--verbose` forces debug regardless of the configured level
fn effective_level(verbose: bool, level: &str) -> &str {
    if verbose {
        "debug"
    } else {
        level
    }
}
