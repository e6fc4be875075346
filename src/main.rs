use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webrtc_vision::config::AppConfig;
use webrtc_vision::events::RoomBus;
use webrtc_vision::inference::{DetectorHandle, NullDetector, RemoteDetector};
use webrtc_vision::session::{SessionRegistry, SignalingController};
use webrtc_vision::state::AppState;
use webrtc_vision::web;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// webrtc-vision command line arguments
#[derive(Parser, Debug)]
#[command(name = "webrtc-vision")]
#[command(version, about = "Real-time WebRTC object detection streaming server", long_about = None)]
struct CliArgs {
    /// Listen address (overrides config file)
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    address: Option<String>,

    /// HTTP port (overrides config file)
    #[arg(short = 'p', long, value_name = "PORT")]
    http_port: Option<u16>,

    /// Inference engine endpoint (overrides config file)
    #[arg(long, value_name = "URL")]
    inference_endpoint: Option<String>,

    /// Path to JSON configuration file
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = CliArgs::parse();

    // Initialize logging with CLI arguments
    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting webrtc-vision v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (defaults when no file is given)
    let mut config = match &args.config {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            AppConfig::load(path)?
        }
        None => AppConfig::default(),
    };

    // Apply CLI argument overrides to config (only if explicitly specified)
    if let Some(address) = args.address {
        config.web.bind_address = address;
    }
    if let Some(port) = args.http_port {
        config.web.http_port = port;
    }
    if let Some(endpoint) = args.inference_endpoint {
        config.inference.endpoint = Some(endpoint);
    }

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Inference backend: remote engine when configured, otherwise a null
    // backend (server-mode sessions then report empty detections)
    let detector = match &config.inference.endpoint {
        Some(endpoint) => {
            tracing::info!("Using remote inference engine at {}", endpoint);
            Arc::new(DetectorHandle::new(Box::new(RemoteDetector::new(
                endpoint.clone(),
                Duration::from_millis(config.inference.request_timeout_ms),
            )?)))
        }
        None => {
            tracing::warn!(
                "No inference endpoint configured; server-mode sessions will report no detections"
            );
            Arc::new(DetectorHandle::new(Box::new(NullDetector)))
        }
    };

    // Per-session event rooms
    let events = Arc::new(RoomBus::new());
    tracing::info!("Event bus initialized");

    // Session registry and signaling controller
    let registry = Arc::new(SessionRegistry::new(
        config.session.max_sessions,
        config.metrics.window_capacity,
    ));
    let controller = SignalingController::new(
        Arc::clone(&registry),
        Arc::clone(&events),
        Arc::clone(&detector),
        config.stream.clone(),
        Duration::from_millis(config.session.negotiation_timeout_ms),
    );

    let state = AppState::new(
        config.clone(),
        Arc::clone(&registry),
        Arc::clone(&controller),
        Arc::clone(&events),
        detector,
        shutdown_tx.clone(),
    );

    // Sweep sessions whose transport died without an explicit close
    {
        let controller = Arc::clone(&controller);
        let interval = Duration::from_secs(config.session.cleanup_interval_secs);
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => controller.sweep().await,
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
        tracing::info!("Session cleanup task started");
    }

    // Create router
    let app = web::create_router(state.clone());

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.web.bind_address, config.web.http_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Starting HTTP server on {}", listener.local_addr()?);

    // Setup graceful shutdown
    let shutdown_signal = {
        let shutdown_tx = shutdown_tx.clone();
        async move {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install CTRL+C handler");
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(());
        }
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);
    if let Err(e) = server.await {
        tracing::error!("HTTP server error: {}", e);
    }

    // Close every live session before exiting
    registry.close_all().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    // Build filter string based on effective level
    let filter = match effective_level {
        LogLevel::Error => "webrtc_vision=error,tower_http=error",
        LogLevel::Warn => "webrtc_vision=warn,tower_http=warn",
        LogLevel::Info => "webrtc_vision=info,tower_http=info",
        LogLevel::Verbose => "webrtc_vision=debug,tower_http=info",
        LogLevel::Debug => "webrtc_vision=debug,tower_http=debug",
        LogLevel::Trace => "webrtc_vision=trace,tower_http=debug",
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
