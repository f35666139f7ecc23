use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use picam_relay::camera::CaptureCommand;
use picam_relay::config::RelayConfig;
use picam_relay::state::AppState;
use picam_relay::web;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// picam-relay command line arguments
#[derive(Parser, Debug)]
#[command(name = "picam-relay")]
#[command(version, about = "Camera stream relay and signaling gateway", long_about = None)]
struct CliArgs {
    /// Listen address
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    address: Option<String>,

    /// Listen port (the PORT environment variable is honored when unset)
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// Primary capture command override, e.g. "ffmpeg -i /dev/video0 ..."
    #[arg(long, value_name = "COMMAND")]
    camera_cmd: Option<String>,

    /// Fallback capture command override
    #[arg(long, value_name = "COMMAND")]
    fallback_cmd: Option<String>,

    /// Reply with an error frame when a message references an unknown peer
    #[arg(long)]
    report_unknown_peer: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting picam-relay v{}", env!("CARGO_PKG_VERSION"));

    let mut config = RelayConfig::default();
    if let Some(addr) = args.address {
        config.web.bind_address = addr;
    }
    config.web.port = resolve_port(args.port, config.web.port);
    if let Some(ref cmd) = args.camera_cmd {
        config.camera.primary = parse_capture_command(cmd)?;
    }
    if let Some(ref cmd) = args.fallback_cmd {
        config.camera.fallback = parse_capture_command(cmd)?;
    }
    if args.report_unknown_peer {
        config.camera.report_unknown_peer = true;
    }

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Create application state
    let state = AppState::new(config.clone(), shutdown_tx.clone());

    // Create router
    let app = web::create_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.web.bind_address, config.web.port)
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid bind address: {}", config.web.bind_address))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!("Pi camera relay running on {}", local_addr);
    tracing::info!("Legacy WebSocket: ws://{}/camera-stream", local_addr);
    tracing::info!("WebRTC signaling: ws://{}/webrtc-signaling", local_addr);
    tracing::info!("HTTP API: http://{}/api/camera/", local_addr);

    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    cleanup(&shutdown_state).await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    // Build filter string based on effective level
    let filter = match effective_level {
        LogLevel::Error => "picam_relay=error,tower_http=error",
        LogLevel::Warn => "picam_relay=warn,tower_http=warn",
        LogLevel::Info => "picam_relay=info,tower_http=info",
        LogLevel::Debug => "picam_relay=debug,tower_http=debug",
        LogLevel::Trace => "picam_relay=trace,tower_http=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

/// Resolve the listen port: CLI flag, then PORT env var, then default.
fn resolve_port(cli_port: Option<u16>, default: u16) -> u16 {
    cli_port
        .or_else(|| {
            std::env::var("PORT")
                .ok()
                .and_then(|value| value.parse().ok())
        })
        .unwrap_or(default)
}

/// Parse a whitespace-separated command override into a capture command.
fn parse_capture_command(raw: &str) -> anyhow::Result<CaptureCommand> {
    let mut parts = raw.split_whitespace().map(str::to_string);
    let program = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty capture command"))?;
    Ok(CaptureCommand::Custom {
        program,
        args: parts.collect(),
    })
}

/// Wait for CTRL+C or SIGTERM, then fan the shutdown signal out.
async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received, shutting down gracefully");
    let _ = shutdown_tx.send(());
}

/// Clean up subsystems on shutdown
async fn cleanup(state: &Arc<AppState>) {
    state.session.stop().await;
    tracing::info!("Capture process stopped");
}
