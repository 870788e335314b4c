//! The abstract media pipeline collaborator.
//!
//! Everything downstream of "decode and render a frame" is out of scope:
//! the orchestrator and the playback state machine only ever talk to this
//! trait. [`FakePipeline`] is the in-memory double both use in tests and
//! the one the `sync-client` binary drives when no real decoder is wired
//! up.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::sync_state::Transform;

/// Playback state a pipeline can be driven through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Null,
    Paused,
    Playing,
}

/// Seek flags mirroring the flushing/key-unit/snap-after combination used
/// for alignment seeks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeekFlags {
    pub flush: bool,
    pub key_unit: bool,
    pub snap_after: bool,
}

impl SeekFlags {
    /// The flag combination used for drift-correction alignment seeks.
    #[must_use]
    pub fn alignment() -> Self {
        Self {
            flush: true,
            key_unit: true,
            snap_after: true,
        }
    }
}

/// Asynchronous messages a pipeline reports on its bus.
#[derive(Debug, Clone)]
pub enum PipelineMessage {
    /// The pipeline's clock slaved successfully and reports the sample
    /// count behind the estimate (forwarded for observability only).
    ClockSyncStatistics { sample_count: usize },
    /// A state transition completed.
    StateChanged { new_state: PipelineState },
    /// An asynchronous operation (typically a seek) completed.
    AsyncDone,
    /// End of stream for the current URI.
    Eos,
    /// A fatal pipeline error.
    Error(String),
}

/// The external collaborator every client embeds.
///
/// Implementations own a decoder/sink chain; this crate only needs to
/// program it and read back position/duration/state-change outcomes.
pub trait MediaPipeline: Send + Sync {
    /// Programs the URI to play next. Takes effect on the next `Playing`
    /// transition.
    fn set_uri(&self, uri: &str);

    /// Sets target pipeline latency in nanoseconds.
    fn set_latency(&self, latency_ns: u64);

    /// Sets the absolute reference-clock instant playback should be
    /// running against.
    fn set_base_time(&self, base_time_ns: u64);

    /// Applies a per-client video transform chain. A default identity
    /// transform is a no-op for pipelines without video output.
    fn set_transform(&self, transform: &Transform);

    /// Requests a state transition. Returns `false` if the transition
    /// failed.
    fn set_state(&self, state: PipelineState) -> bool;

    /// Current playback position, if known.
    fn query_position(&self) -> Option<u64>;

    /// Current stream duration, if known.
    fn query_duration(&self) -> Option<u64>;

    /// Whether the current source is a live stream (cannot be seeked).
    fn is_live(&self) -> bool;

    /// Issues an alignment seek to `position_ns`. Returns `false` if the
    /// seek could not be started at all; callers fall through to the
    /// done-seeking phase without blocking.
    fn seek(&self, position_ns: u64, flags: SeekFlags) -> bool;

    /// Subscribes to this pipeline's bus messages.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<PipelineMessage>;
}

/// An in-memory double that mimics state transitions and position
/// advancement without any real decode/render work.
pub struct FakePipeline {
    inner: Mutex<FakeInner>,
    bus_tx: mpsc::UnboundedSender<PipelineMessage>,
    bus_rx: Mutex<Option<mpsc::UnboundedReceiver<PipelineMessage>>>,
}

struct FakeInner {
    uri: Option<String>,
    latency_ns: u64,
    base_time_ns: u64,
    state: PipelineState,
    position_ns: u64,
    duration_ns: Option<u64>,
    live: bool,
    transform: Transform,
    seek_result: bool,
}

impl Default for FakePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePipeline {
    /// Creates a pipeline with no URI programmed, `Null` state, and a
    /// fixed duration of 60s once a URI is set (overridable with
    /// [`FakePipeline::set_fake_duration`]).
    #[must_use]
    pub fn new() -> Self {
        let (bus_tx, bus_rx) = mpsc::unbounded_channel();
        Self {
            inner: Mutex::new(FakeInner {
                uri: None,
                latency_ns: 0,
                base_time_ns: 0,
                state: PipelineState::Null,
                position_ns: 0,
                duration_ns: None,
                live: false,
                transform: Transform::default(),
                seek_result: true,
            }),
            bus_tx,
            bus_rx: Mutex::new(Some(bus_rx)),
        }
    }

    /// Overrides the duration reported by `query_duration` for the
    /// currently-programmed URI.
    pub fn set_fake_duration(&self, duration_ns: Option<u64>) {
        self.inner.lock().duration_ns = duration_ns;
    }

    /// Marks this pipeline as a live source (disables alignment seeking).
    pub fn set_fake_live(&self, live: bool) {
        self.inner.lock().live = live;
    }

    /// Sets the outcome the next `seek()` call will report.
    pub fn set_fake_seek_result(&self, result: bool) {
        self.inner.lock().seek_result = result;
    }

    /// Advances the simulated playback position, for tests driving EOS.
    pub fn advance_position(&self, delta_ns: u64) {
        self.inner.lock().position_ns += delta_ns;
    }

    /// Pushes an end-of-stream message onto the bus, as a real decoder
    /// would when it exhausts a URI.
    pub fn emit_eos(&self) {
        let _ = self.bus_tx.send(PipelineMessage::Eos);
    }

    /// Pushes an error message onto the bus.
    pub fn emit_error(&self, message: impl Into<String>) {
        let _ = self.bus_tx.send(PipelineMessage::Error(message.into()));
    }

    /// Returns the currently programmed URI, for assertions in tests.
    #[must_use]
    pub fn current_uri(&self) -> Option<String> {
        self.inner.lock().uri.clone()
    }

    /// Returns the currently applied transform, for assertions in tests.
    #[must_use]
    pub fn current_transform(&self) -> Transform {
        self.inner.lock().transform.clone()
    }

    /// Returns the currently applied base time, for assertions in tests.
    #[must_use]
    pub fn current_base_time(&self) -> u64 {
        self.inner.lock().base_time_ns
    }

    /// Returns the current pipeline state, for assertions in tests.
    #[must_use]
    pub fn current_state(&self) -> PipelineState {
        self.inner.lock().state
    }
}

impl MediaPipeline for FakePipeline {
    fn set_uri(&self, uri: &str) {
        let mut inner = self.inner.lock();
        inner.uri = Some(uri.to_string());
        inner.position_ns = 0;
    }

    fn set_latency(&self, latency_ns: u64) {
        self.inner.lock().latency_ns = latency_ns;
    }

    fn set_base_time(&self, base_time_ns: u64) {
        self.inner.lock().base_time_ns = base_time_ns;
    }

    fn set_transform(&self, transform: &Transform) {
        self.inner.lock().transform = transform.clone();
    }

    fn set_state(&self, state: PipelineState) -> bool {
        self.inner.lock().state = state;
        let _ = self.bus_tx.send(PipelineMessage::StateChanged { new_state: state });
        true
    }

    fn query_position(&self) -> Option<u64> {
        Some(self.inner.lock().position_ns)
    }

    fn query_duration(&self) -> Option<u64> {
        self.inner.lock().duration_ns
    }

    fn is_live(&self) -> bool {
        self.inner.lock().live
    }

    fn seek(&self, position_ns: u64, _flags: SeekFlags) -> bool {
        let mut inner = self.inner.lock();
        let ok = inner.seek_result;
        if ok {
            inner.position_ns = position_ns;
        }
        drop(inner);
        if ok {
            let _ = self.bus_tx.send(PipelineMessage::AsyncDone);
        }
        ok
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<PipelineMessage> {
        self.bus_rx
            .lock()
            .take()
            .expect("FakePipeline::subscribe called more than once")
    }
}

/// Convenience alias for sharing a pipeline across the tasks that drive it.
pub type SharedPipeline = Arc<dyn MediaPipeline>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_state_reports_on_bus() {
        let pipeline = FakePipeline::new();
        let mut rx = pipeline.subscribe();
        pipeline.set_state(PipelineState::Playing);
        let msg = rx.try_recv().unwrap();
        assert!(matches!(
            msg,
            PipelineMessage::StateChanged {
                new_state: PipelineState::Playing
            }
        ));
    }

    #[test]
    fn seek_updates_position_and_signals_async_done() {
        let pipeline = FakePipeline::new();
        let mut rx = pipeline.subscribe();
        assert!(pipeline.seek(20_000_000_000, SeekFlags::alignment()));
        assert_eq!(pipeline.query_position(), Some(20_000_000_000));
        assert!(matches!(rx.try_recv().unwrap(), PipelineMessage::AsyncDone));
    }

    #[test]
    fn failed_seek_does_not_move_position() {
        let pipeline = FakePipeline::new();
        pipeline.set_fake_seek_result(false);
        assert!(!pipeline.seek(5_000_000_000, SeekFlags::alignment()));
        assert_eq!(pipeline.query_position(), Some(0));
    }
}
