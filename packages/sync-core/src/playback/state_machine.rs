//! Client-side playback state machine — the most intricate part of the
//! core.
//!
//! A single lock (`last_state`) serializes SyncState-driven mutation
//! against the pipeline-bus task, and the three-state seek flag is a
//! separate atomic precisely because it must be observed from an
//! asynchronous pipeline callback without taking that lock.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::ClockConsumer;
use crate::events::{CoordinatorEvent, EventEmitter};
use crate::pipeline::{PipelineMessage, PipelineState, SeekFlags, SharedPipeline};
use crate::playback::transform::apply_transform;
use crate::protocol_constants::SEEK_TOLERANCE_NS;
use crate::sync_state::SyncState;

/// The three-value seek phase, stored as a monotonically advancing atomic
/// so the pipeline-bus task can observe it without locking
/// `PlaybackStateMachine::last_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SeekPhase {
    NeedSeek = 0,
    InSeek = 1,
    DoneSeek = 2,
}

impl SeekPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::NeedSeek,
            1 => Self::InSeek,
            _ => Self::DoneSeek,
        }
    }
}

/// Drives a `MediaPipeline` into alignment with a stream of `SyncState`
/// updates for one client.
pub struct PlaybackStateMachine {
    client_id: String,
    pipeline: SharedPipeline,
    events: Arc<dyn EventEmitter>,
    last_state: Mutex<Option<SyncState>>,
    clock: Mutex<Option<ClockConsumer>>,
    seek_phase: AtomicU8,
    seek_offset_ns: AtomicU64,
    started: std::sync::atomic::AtomicBool,
}

impl PlaybackStateMachine {
    /// Creates a state machine for `client_id`, driving `pipeline`.
    pub fn new(client_id: impl Into<String>, pipeline: SharedPipeline, events: Arc<dyn EventEmitter>) -> Self {
        Self {
            client_id: client_id.into(),
            pipeline,
            events,
            last_state: Mutex::new(None),
            clock: Mutex::new(None),
            seek_phase: AtomicU8::new(SeekPhase::DoneSeek as u8),
            seek_offset_ns: AtomicU64::new(0),
            started: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn seek_phase(&self) -> SeekPhase {
        SeekPhase::from_u8(self.seek_phase.load(Ordering::Acquire))
    }

    fn set_seek_phase(&self, phase: SeekPhase) {
        self.seek_phase.store(phase as u8, Ordering::Release);
    }

    /// Handles one `SyncState` update from the control client.
    pub async fn on_sync_state(&self, new_state: SyncState) {
        let old_state = self.last_state.lock().clone();
        *self.last_state.lock() = Some(new_state.clone());

        if !self.started.load(Ordering::SeqCst) {
            self.handle_first_update(new_state).await;
            return;
        }

        let old_state = match old_state {
            Some(s) => s,
            None => {
                // started was already true but we lost our cached state
                // (shouldn't normally happen); treat as a full reset.
                self.reset_and_reprogram(&new_state);
                return;
            }
        };

        if old_state.stopped != new_state.stopped {
            self.pipeline.set_state(PipelineState::Null);
            self.reset_and_reprogram(&new_state);
        } else if old_state.playlist.current_track_index() != new_state.playlist.current_track_index() {
            self.pipeline.set_state(PipelineState::Null);
            self.reset_and_reprogram(&new_state);
        } else if old_state.paused != new_state.paused {
            if !new_state.paused {
                let seek_offset = self.seek_offset_ns.load(Ordering::SeqCst);
                self.pipeline
                    .set_base_time(new_state.base_time + new_state.base_time_offset + seek_offset);
                self.pipeline.set_state(PipelineState::Playing);
            } else {
                self.pipeline.set_state(PipelineState::Paused);
            }
        } else if old_state.base_time != new_state.base_time {
            self.pipeline.set_state(PipelineState::Null);
            self.reset_and_reprogram(&new_state);
        } else {
            self.pipeline.set_latency(new_state.latency);
            apply_transform(self.pipeline.as_ref(), &new_state, &self.client_id);
        }
    }

    async fn handle_first_update(&self, state: SyncState) {
        if self.clock.lock().is_none() {
            let addr = format!("{}:{}", state.clock_address, state.clock_port)
                .parse()
                .ok();
            if let Some(addr) = addr {
                match ClockConsumer::connect(addr).await {
                    Ok(consumer) => *self.clock.lock() = Some(consumer),
                    Err(e) => {
                        tracing::warn!("[Playback] failed to connect clock consumer: {e}");
                        return;
                    }
                }
            } else {
                tracing::warn!("[Playback] invalid clock address in SyncState, staying in WAITING_FOR_CLOCK");
                return;
            }
        }

        let mut consumer = self.clock.lock().take().expect("clock just populated");
        let result = consumer.wait_for_sync().await;
        let sample_count = consumer.sample_count();
        *self.clock.lock() = Some(consumer);

        match result {
            Ok(()) => {
                self.events.emit(CoordinatorEvent::ClockSynced {
                    client_id: self.client_id.clone(),
                    sample_count,
                });
                self.started.store(true, Ordering::SeqCst);
                self.reset_and_reprogram(&state);
            }
            Err(e) => {
                tracing::warn!("[Playback] clock sync timed out: {e}; staying in WAITING_FOR_CLOCK");
            }
        }
    }

    fn reset_and_reprogram(&self, state: &SyncState) {
        self.seek_offset_ns.store(0, Ordering::SeqCst);
        self.update_pipeline(state, false);
    }

    /// The client's reprogramming step: program URI/latency and transform,
    /// decide the seek phase, and apply base time if the fleet is not
    /// paused.
    ///
    /// `advance` mirrors the server's own `Orchestrator::update_pipeline`:
    /// when set, the cursor is bumped locally before reprogramming (adding
    /// the departing track's duration plus `stream_start_delay` to
    /// `base_time_offset`) instead of waiting for the next server-pushed
    /// `SyncState` to carry the advance, which would cost one round trip of
    /// silence between tracks. The locally-advanced state is written back
    /// into `last_state` so later diffing against it stays correct.
    fn update_pipeline(&self, state: &SyncState, advance: bool) {
        let mut state = state.clone();
        if advance {
            let can_advance = !state.playlist.is_at_end() && !state.playlist.is_on_last_track();
            if !can_advance {
                return;
            }
            let current_index = state.playlist.current_track_index();
            let duration = state
                .playlist
                .current_track()
                .map(|t| {
                    if t.duration_is_unknown() {
                        self.pipeline.query_duration().unwrap_or(0)
                    } else {
                        t.duration_ns
                    }
                })
                .unwrap_or(0);
            state.base_time_offset += duration + state.stream_start_delay;
            state.playlist = state.playlist.set_current_track(current_index + 1);
            *self.last_state.lock() = Some(state.clone());
        }
        let state = &state;

        if let Some(uri) = state.playlist.current_uri() {
            self.pipeline.set_uri(uri);
        }
        self.pipeline.set_latency(state.latency);
        apply_transform(self.pipeline.as_ref(), state, &self.client_id);

        if self.pipeline.is_live() {
            self.set_seek_phase(SeekPhase::DoneSeek);
        } else {
            self.set_seek_phase(SeekPhase::NeedSeek);
        }

        if state.stopped {
            self.pipeline.set_state(PipelineState::Null);
            return;
        }

        if !state.paused {
            let seek_offset = self.seek_offset_ns.load(Ordering::SeqCst);
            self.pipeline
                .set_base_time(state.base_time + state.base_time_offset + seek_offset);
            self.pipeline.set_state(PipelineState::Playing);
        } else {
            self.pipeline.set_state(PipelineState::Paused);
        }
    }

    /// Handles one pipeline bus message: fast-seek alignment and EOS
    /// advance.
    pub fn on_pipeline_message(&self, message: PipelineMessage) {
        match message {
            PipelineMessage::StateChanged {
                new_state: PipelineState::Playing,
            } => self.maybe_align_seek(),
            PipelineMessage::StateChanged { .. } => {}
            PipelineMessage::AsyncDone => self.maybe_complete_seek(),
            PipelineMessage::Eos => self.on_eos(),
            PipelineMessage::Error(message) => {
                tracing::warn!("[Playback] pipeline error: {message}; seek falls through to DONE");
                self.set_seek_phase(SeekPhase::DoneSeek);
            }
            PipelineMessage::ClockSyncStatistics { .. } => {}
        }
    }

    fn maybe_align_seek(&self) {
        if self.seek_phase() != SeekPhase::NeedSeek {
            return;
        }
        let Some(state) = self.last_state.lock().clone() else {
            return;
        };
        let Some(clock) = self.clock.lock().as_ref().map(ClockConsumer::now_ns) else {
            self.set_seek_phase(SeekPhase::DoneSeek);
            return;
        };
        let cur_pos = clock.saturating_sub(state.base_time).saturating_sub(state.base_time_offset);
        if cur_pos > SEEK_TOLERANCE_NS {
            self.set_seek_phase(SeekPhase::InSeek);
            let issued = self.pipeline.seek(cur_pos, SeekFlags::alignment());
            if !issued {
                self.set_seek_phase(SeekPhase::DoneSeek);
            } else {
                self.events.emit(CoordinatorEvent::AlignmentSeek {
                    client_id: self.client_id.clone(),
                    drift_ns: cur_pos as i64,
                });
            }
        } else {
            self.set_seek_phase(SeekPhase::DoneSeek);
        }
    }

    fn maybe_complete_seek(&self) {
        if self.seek_phase() != SeekPhase::InSeek {
            return;
        }
        if let Some(actual) = self.pipeline.query_position() {
            self.seek_offset_ns.store(actual, Ordering::SeqCst);
            if let Some(state) = self.last_state.lock().clone() {
                self.pipeline
                    .set_base_time(state.base_time + state.base_time_offset + actual);
            }
        }
        self.set_seek_phase(SeekPhase::DoneSeek);
    }

    fn on_eos(&self) {
        self.pipeline.set_state(PipelineState::Null);
        if let Some(state) = self.last_state.lock().clone() {
            self.update_pipeline(&state, true);
        }
    }

    /// Current seek phase, exposed for tests and diagnostics.
    #[must_use]
    pub fn current_seek_phase(&self) -> SeekPhase {
        self.seek_phase()
    }
}
