//! sync-client - standalone headless playback client for the
//! network-synchronised playback coordinator.
//!
//! Drives a [`FakePipeline`] rather than a real decoder (the media
//! pipeline itself is an external collaborator, out of scope for the
//! core); this binary exists to exercise the full client state machine
//! end-to-end against a real control-plane connection.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sync_core::control::client::ControlClient;
use sync_core::events::{EventBridge, EventEmitter, LoggingEventEmitter};
use sync_core::pipeline::{FakePipeline, MediaPipeline};
use sync_core::playback::state_machine::PlaybackStateMachine;
use sync_core::protocol_constants::EVENT_CHANNEL_CAPACITY;
use sync_core::runtime::{TaskSpawner, TokioSpawner};
use tokio::signal;

use crate::config::{resolve_client_id, ClientConfig};

/// sync-client - headless playback client for the coordinator.
#[derive(Parser, Debug)]
#[command(name = "sync-client")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SYNC_LOG_LEVEL")]
    log_level: tracing::Level,

    /// Coordinator address (overrides config file).
    #[arg(short = 'H', long, env = "SYNC_SERVER_ADDRESS")]
    server_address: Option<String>,

    /// Coordinator port (overrides config file).
    #[arg(short = 'P', long, env = "SYNC_SERVER_PORT")]
    server_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level);

    tracing::info!("sync-client v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ClientConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(addr) = args.server_address {
        config.server_address = addr;
    }
    if let Some(port) = args.server_port {
        config.server_port = port;
    }
    let client_id = resolve_client_id(config.id.take());
    tracing::info!("client id: {client_id}");

    let spawner: Arc<TokioSpawner> = Arc::new(TokioSpawner::current());
    let event_bridge = Arc::new(EventBridge::new(EVENT_CHANNEL_CAPACITY));
    event_bridge.set_external_emitter(Arc::new(LoggingEventEmitter));
    let events: Arc<dyn EventEmitter> = event_bridge;

    let control = ControlClient::connect(&config.server_address, config.server_port, &client_id)
        .await
        .context("failed to connect to coordinator")?;
    let mut state_rx = control.spawn_reader(&spawner);

    let pipeline: Arc<dyn MediaPipeline> = Arc::new(FakePipeline::new());
    let state_machine = Arc::new(PlaybackStateMachine::new(client_id, pipeline.clone(), events));

    {
        let state_machine = state_machine.clone();
        let mut bus = pipeline.subscribe();
        spawner.spawn(async move {
            while let Some(message) = bus.recv().await {
                state_machine.on_pipeline_message(message);
            }
        });
    }

    let driver = {
        let state_machine = state_machine.clone();
        async move {
            loop {
                if state_rx.changed().await.is_err() {
                    tracing::error!("[Control] coordinator connection lost");
                    return;
                }
                if let Some(state) = state_rx.borrow_and_update().clone() {
                    state_machine.on_sync_state(state).await;
                }
            }
        }
    };

    tokio::select! {
        _ = driver => {}
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }
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
