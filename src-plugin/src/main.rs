//! Generator bitmaps plugin binary.
//!
//! Connects to the host, registers the menu item and writes a PNG snapshot
//! of the active document each time it is clicked.

use bitmaps_common::logging::{ensure_log_dir, LOG_FILE_PREFIX};
use bitmaps_plugin::config::{load_config, load_config_from, PluginConfig, SnapshotMode};
use bitmaps_plugin::host::{Host, HostClient};
use bitmaps_plugin::listener;
use bitmaps_plugin::session::Session;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "generator-bitmaps")]
#[command(about = "Save snapshots of the active document from a Generator host")]
#[command(version)]
struct Cli {
    /// Config file to load instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Generator host address
    #[arg(long)]
    host: Option<String>,

    /// Generator port
    #[arg(long)]
    port: Option<u16>,

    /// Output PNG path (relative paths resolve next to the executable)
    #[arg(long, short)]
    output: Option<String>,

    /// Snapshot mode: flattened or first_layer
    #[arg(long, value_parser = parse_mode)]
    mode: Option<SnapshotMode>,

    /// Skip the snapshot taken right after startup
    #[arg(long)]
    no_initial_snapshot: bool,

    /// Enable debug logging
    #[arg(long, short)]
    verbose: bool,
}

fn parse_mode(s: &str) -> Result<SnapshotMode, String> {
    SnapshotMode::from_str(s)
        .ok_or_else(|| format!("unknown mode '{}', expected flattened or first_layer", s))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose);

    info!("Generator bitmaps starting (pid: {})...", std::process::id());

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create Tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let code = runtime.block_on(run(config));
    info!("Generator bitmaps stopped");
    code
}

/// Config file plus command line overrides.
fn resolve_config(cli: &Cli) -> Result<PluginConfig, String> {
    let mut config = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    };

    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(output) = &cli.output {
        config.output_path = output.clone();
    }
    if let Some(mode) = cli.mode {
        config.snapshot_mode = mode;
    }
    if cli.no_initial_snapshot {
        config.snapshot_on_start = false;
    }

    config.validate()?;
    Ok(config)
}

async fn run(config: PluginConfig) -> ExitCode {
    let address = config.address();
    info!("Connecting to Generator at {}", address);
    let client = match HostClient::connect(&address, config.request_timeout()).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to connect to {}: {}", address, e);
            return ExitCode::FAILURE;
        }
    };

    let session = Arc::new(Session::new(client.clone(), config));
    info!("Snapshots will be written to {}", session.output_path().display());

    // Subscribe before initializing so no menu event is missed.
    let events = client.subscribe();
    listener::initialize(&session).await;

    let shutdown = async {
        tokio::select! {
            _ = shutdown_signal() => {}
            _ = client.closed() => warn!("Connection to Generator closed"),
        }
    };
    listener::run(session, events, shutdown).await;

    ExitCode::SUCCESS
}

/// Resolves on SIGINT, SIGTERM or SIGHUP (Ctrl+C elsewhere).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (Ok(mut sigterm), Ok(mut sigint), Ok(mut sighup)) = (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
            signal(SignalKind::hangup()),
        ) else {
            error!("Failed to install signal handlers");
            return std::future::pending().await;
        };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
            _ = sighup.recv() => info!("Received SIGHUP"),
        }
    }

    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C"),
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Console output plus a daily rolling file in the log directory.
///
/// `RUST_LOG` wins over `--verbose`. The returned guard flushes the file
/// writer and must live until exit.
fn init_logging(verbose: bool) -> Option<WorkerGuard> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match ensure_log_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        Err(e) => {
            eprintln!("Failed to create log directory, logging to console only: {}", e);
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}
