//! End-to-end scenarios spanning the clock pair, control plane,
//! orchestrator, and playback state machine together.

use std::sync::Arc;
use std::time::Duration;

use sync_core::clock::ClockProvider;
use sync_core::control::client::ControlClient;
use sync_core::control::server::ControlServer;
use sync_core::events::NoopEventEmitter;
use sync_core::pipeline::{FakePipeline, MediaPipeline, PipelineState};
use sync_core::playback::state_machine::PlaybackStateMachine;
use sync_core::runtime::TokioSpawner;
use sync_core::{Orchestrator, Playlist, Track};

async fn spawn_client(
    addr: &str,
    port: u16,
    id: &str,
) -> (Arc<PlaybackStateMachine>, Arc<FakePipeline>) {
    let control = ControlClient::connect(addr, port, id).await.unwrap();
    let spawner: Arc<TokioSpawner> = Arc::new(TokioSpawner::current());
    let mut state_rx = control.spawn_reader(&spawner);

    let pipeline = Arc::new(FakePipeline::new());
    let state_machine = Arc::new(PlaybackStateMachine::new(id, pipeline.clone(), Arc::new(NoopEventEmitter)));

    let sm = state_machine.clone();
    tokio::spawn(async move {
        loop {
            if state_rx.changed().await.is_err() {
                return;
            }
            let state = state_rx.borrow_and_update().clone();
            if let Some(state) = state {
                sm.on_sync_state(state).await;
            }
        }
    });

    (state_machine, pipeline)
}

/// Scenario S1: two clients joining a fresh playlist both reach PLAYING
/// with the same URI programmed.
#[tokio::test]
async fn scenario_s1_two_client_cold_start() {
    let clock = Arc::new(ClockProvider::bind("127.0.0.1:0").await.unwrap());
    let clock_for_serve = clock.clone();
    tokio::spawn(async move {
        let _ = clock_for_serve.serve().await;
    });

    let control = ControlServer::new(Arc::new(NoopEventEmitter), Arc::new(TokioSpawner::current()));
    let port = control.start("127.0.0.1", 0).await.unwrap();

    let pipeline: Arc<dyn MediaPipeline> = Arc::new(FakePipeline::new());
    let orchestrator = Orchestrator::new(
        clock,
        pipeline,
        control.clone(),
        Arc::new(NoopEventEmitter),
        300_000_000,
        500_000_000,
    );
    orchestrator.set_playlist(Playlist::new(vec![Track::new("file:///a", 60_000_000_000)]));

    let (sm1, pipeline1) = spawn_client("127.0.0.1", port, "c1").await;
    let (sm2, pipeline2) = spawn_client("127.0.0.1", port, "c2").await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(pipeline1.current_uri().as_deref(), Some("file:///a"));
    assert_eq!(pipeline2.current_uri().as_deref(), Some("file:///a"));
    assert_eq!(pipeline1.current_state(), PipelineState::Playing);
    assert_eq!(pipeline2.current_state(), PipelineState::Playing);
    assert_eq!(pipeline1.current_base_time(), pipeline2.current_base_time());
    drop((sm1, sm2));
}

/// Scenario S3 (shape): pausing then unpausing advances
/// `base_time_offset` by roughly the elapsed pause duration and both
/// sides observe paused/unpaused transitions.
#[tokio::test]
async fn scenario_s3_pause_unpause_round_trip() {
    let clock = Arc::new(ClockProvider::bind("127.0.0.1:0").await.unwrap());
    let clock_for_serve = clock.clone();
    tokio::spawn(async move {
        let _ = clock_for_serve.serve().await;
    });

    let control = ControlServer::new(Arc::new(NoopEventEmitter), Arc::new(TokioSpawner::current()));
    let port = control.start("127.0.0.1", 0).await.unwrap();

    let pipeline: Arc<dyn MediaPipeline> = Arc::new(FakePipeline::new());
    let orchestrator = Orchestrator::new(
        clock,
        pipeline,
        control.clone(),
        Arc::new(NoopEventEmitter),
        300_000_000,
        500_000_000,
    );
    orchestrator.set_playlist(Playlist::new(vec![Track::new("file:///a", 60_000_000_000)]));

    let (sm, client_pipeline) = spawn_client("127.0.0.1", port, "c1").await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(client_pipeline.current_state(), PipelineState::Playing);

    orchestrator.set_paused(true);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client_pipeline.current_state(), PipelineState::Paused);

    let offset_before = orchestrator.current_state().base_time_offset;
    tokio::time::sleep(Duration::from_millis(50)).await;
    orchestrator.set_paused(false);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(client_pipeline.current_state(), PipelineState::Playing);
    assert!(orchestrator.current_state().base_time_offset > offset_before);
    drop(sm);
}

/// Scenario S6: a client that sends garbage instead of a hello is
/// disconnected without ever receiving a SyncState, and other sessions are
/// unaffected.
#[tokio::test]
async fn scenario_s6_malformed_hello_does_not_disturb_other_sessions() {
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    let control = ControlServer::new(Arc::new(NoopEventEmitter), Arc::new(TokioSpawner::current()));
    let port = control.start("127.0.0.1", 0).await.unwrap();

    let clock = Arc::new(ClockProvider::bind("127.0.0.1:0").await.unwrap());
    let pipeline: Arc<dyn MediaPipeline> = Arc::new(FakePipeline::new());
    let orchestrator = Orchestrator::new(
        clock,
        pipeline,
        control.clone(),
        Arc::new(NoopEventEmitter),
        0,
        0,
    );
    orchestrator.set_playlist(Playlist::new(vec![Track::new("a", 1)]));

    let mut good_client = ControlClient::connect("127.0.0.1", port, "well-behaved").await.unwrap();
    let first = good_client.recv().await.unwrap();
    assert_eq!(first.playlist.current_uri(), Some("a"));

    let mut bad_client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    bad_client.write_all(b"not-json\n").await.unwrap();
    drop(bad_client);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(control.session_count(), 1);
}
