//! sync-server - standalone headless server for the network-synchronised
//! playback coordinator.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sync_core::clock::ClockProvider;
use sync_core::control::server::ControlServer;
use sync_core::events::{EventBridge, EventEmitter, LoggingEventEmitter};
use sync_core::lifecycle::{Lifecycle, ProcessLifecycle};
use sync_core::pipeline::{FakePipeline, MediaPipeline};
use sync_core::protocol_constants::EVENT_CHANNEL_CAPACITY;
use sync_core::runtime::{TaskSpawner, TokioSpawner};
use sync_core::{Orchestrator, Playlist};
use tokio::signal;

use crate::config::ServerConfig;

/// sync-server - headless coordinator hosting a playlist for a fleet of
/// playback clients.
#[derive(Parser, Debug)]
#[command(name = "sync-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to a playlist file (YAML list of {uri, duration_ns}).
    #[arg(long, value_name = "FILE")]
    playlist: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SYNC_LOG_LEVEL")]
    log_level: tracing::Level,

    /// Control-plane bind port (overrides config file).
    #[arg(short = 'p', long, env = "SYNC_BIND_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level);

    tracing::info!("sync-server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ServerConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(port) = args.port {
        config.bind_port = port;
    }

    let spawner: Arc<TokioSpawner> = Arc::new(TokioSpawner::current());
    let event_bridge = Arc::new(EventBridge::new(EVENT_CHANNEL_CAPACITY));
    event_bridge.set_external_emitter(Arc::new(LoggingEventEmitter));
    let events: Arc<dyn EventEmitter> = event_bridge;

    let clock = Arc::new(
        ClockProvider::bind((config.clock_address.as_str(), config.clock_port))
            .await
            .context("failed to bind clock provider")?,
    );
    tracing::info!(
        "[Clock] provider listening on {}",
        clock.local_addr().context("clock provider has no local address")?
    );
    {
        let clock = clock.clone();
        spawner.spawn(async move {
            if let Err(e) = clock.serve().await {
                tracing::error!("[Clock] provider loop ended: {e}");
            }
        });
    }

    let control = ControlServer::new(events.clone(), spawner.clone());
    let bound_port = control
        .start(&config.bind_address, config.bind_port)
        .await
        .context("failed to start control server")?;
    tracing::info!("[Control] bound to {}:{bound_port}", config.bind_address);

    let pipeline: Arc<dyn MediaPipeline> = Arc::new(FakePipeline::new());
    let orchestrator = Arc::new(Orchestrator::new(
        clock,
        pipeline,
        control,
        events,
        config.latency_ns,
        config.stream_start_delay_ns,
    ));

    if let Some(path) = args.playlist {
        let playlist = config::load_playlist(&path).context("failed to load playlist")?;
        orchestrator.set_playlist(playlist);
    } else {
        tracing::warn!("no --playlist given; orchestrator started with an empty playlist");
        orchestrator.set_playlist(Playlist::empty());
    }

    let lifecycle: Arc<dyn Lifecycle> = Arc::new(ProcessLifecycle);
    shutdown_signal().await;
    tracing::info!("shutdown signal received");
    lifecycle.request_shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn init_logging(level: tracing::Level) {
    use tracing_subscriber::EnvFilter;

    tracing_log::LogTracer::init().expect("failed to install log-to-tracing bridge");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
