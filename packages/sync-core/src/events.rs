//! Event system for observing coordinator activity.
//!
//! Domain code (the orchestrator, the control server, the playback state
//! machine) depends on the [`EventEmitter`] trait rather than a concrete
//! channel, so it can be unit tested without standing up real sockets and
//! so a future transport (metrics exporter, admin UI) can subscribe
//! without the domain knowing about it.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

/// Events describing coordinator activity, broadcast for observers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinatorEvent {
    /// A client completed the control-plane handshake.
    ClientJoined { client_id: String },
    /// A client's control connection closed.
    ClientLeft { client_id: String },
    /// The orchestrator published a new `SyncState` version.
    StateVersionAdvanced { version: u64 },
    /// Playback advanced to a new track.
    TrackChanged { track_index: u64 },
    /// Playback reached the end of the playlist.
    PlaylistEnded,
    /// A client's clock consumer finished its initial sync window.
    ClockSynced { client_id: String, sample_count: usize },
    /// A client issued an alignment seek to correct drift.
    AlignmentSeek { client_id: String, drift_ns: i64 },
}

/// Trait for emitting coordinator events without knowledge of transport.
pub trait EventEmitter: Send + Sync {
    /// Emits a coordinator event.
    fn emit(&self, event: CoordinatorEvent);
}

/// No-op emitter, used in tests that don't care about event delivery.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit(&self, _event: CoordinatorEvent) {}
}

/// Logs every event at debug level. Useful standalone or layered under a
/// real bridge during development.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit(&self, event: CoordinatorEvent) {
        tracing::debug!(?event, "coordinator_event");
    }
}

/// Bridges domain events onto a `tokio::sync::broadcast` channel.
///
/// Orchestrator and control-plane code hold this behind an `Arc<dyn
/// EventEmitter>`; anything interested in coordinator activity (a future
/// admin endpoint, a test harness) subscribes via [`EventBridge::subscribe`].
/// An optional external emitter can additionally be attached after
/// construction, mirroring how a platform-specific sink is wired in later.
#[derive(Clone)]
pub struct EventBridge {
    tx: broadcast::Sender<CoordinatorEvent>,
    external: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl EventBridge {
    /// Creates a bridge with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            external: Arc::new(RwLock::new(None)),
        }
    }

    /// Attaches an external emitter that receives a copy of every event in
    /// addition to the broadcast channel.
    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external.write() = Some(emitter);
    }

    /// Subscribes to the broadcast channel.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.tx.subscribe()
    }
}

impl EventEmitter for EventBridge {
    fn emit(&self, event: CoordinatorEvent) {
        if let Some(ref emitter) = *self.external.read() {
            emitter.emit(event.clone());
        }
        if let Err(e) = self.tx.send(event) {
            log::trace!("[EventBridge] no subscribers: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_delivers_to_subscriber() {
        let bridge = EventBridge::new(16);
        let mut rx = bridge.subscribe();
        bridge.emit(CoordinatorEvent::ClientJoined {
            client_id: "kitchen".into(),
        });
        let received = rx.try_recv().unwrap();
        assert!(matches!(received, CoordinatorEvent::ClientJoined { client_id } if client_id == "kitchen"));
    }

    #[test]
    fn bridge_with_no_subscribers_does_not_panic() {
        let bridge = EventBridge::new(16);
        bridge.emit(CoordinatorEvent::PlaylistEnded);
    }

    #[test]
    fn external_emitter_also_receives_events() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Counter(AtomicUsize);
        impl EventEmitter for Counter {
            fn emit(&self, _event: CoordinatorEvent) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let bridge = EventBridge::new(16);
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        bridge.set_external_emitter(counter.clone());
        bridge.emit(CoordinatorEvent::PlaylistEnded);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
