//! Server-side orchestrator.
//!
//! Translates intents (set a playlist, pause, stop) into mutations of the
//! canonical `SyncState`, drives the local `MediaPipeline` for URI
//! programming and EOS detection, and publishes every mutation through the
//! control server.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::clock::ClockProvider;
use crate::control::server::ControlServer;
use crate::events::{CoordinatorEvent, EventEmitter};
use crate::pipeline::{PipelineState, SharedPipeline};
use crate::protocol_constants::{NO_CURRENT_TRACK, PROTOCOL_VERSION};
use crate::sync_state::{Playlist, SyncState};

struct Inner {
    state: SyncState,
    last_pause_time: Option<u64>,
    last_duration: u64,
}

/// Owns the canonical `SyncState` and mediates every transition to it.
pub struct Orchestrator {
    inner: RwLock<Inner>,
    clock: Arc<ClockProvider>,
    pipeline: SharedPipeline,
    control: Arc<ControlServer>,
    events: Arc<dyn EventEmitter>,
}

impl Orchestrator {
    /// Creates an orchestrator with an empty playlist, not yet playing.
    pub fn new(
        clock: Arc<ClockProvider>,
        pipeline: SharedPipeline,
        control: Arc<ControlServer>,
        events: Arc<dyn EventEmitter>,
        latency_ns: u64,
        stream_start_delay_ns: u64,
    ) -> Self {
        let clock_addr = clock
            .local_addr()
            .map(|a| a.ip().to_string())
            .unwrap_or_default();
        let clock_port = clock.local_addr().map(|a| a.port()).unwrap_or(0);
        let mut state = SyncState::build(Playlist::empty(), latency_ns, stream_start_delay_ns);
        state.clock_address = clock_addr;
        state.clock_port = clock_port;
        Self {
            inner: RwLock::new(Inner {
                state,
                last_pause_time: None,
                last_duration: 0,
            }),
            clock,
            pipeline,
            control,
            events,
        }
    }

    /// A snapshot of the current `SyncState`.
    #[must_use]
    pub fn current_state(&self) -> SyncState {
        self.inner.read().state.clone()
    }

    /// Replaces the current playlist. If the current track URI or index
    /// changes, transitions the pipeline through `Null` and reprograms it
    /// via `update_pipeline(false)`; otherwise just publishes the new
    /// track listing.
    pub fn set_playlist(&self, playlist: Playlist) {
        let track_changed = {
            let inner = self.inner.read();
            inner.state.playlist.current_uri() != playlist.current_uri()
                || inner.state.playlist.current_track_index() != playlist.current_track_index()
        };
        {
            let mut inner = self.inner.write();
            inner.state.playlist = playlist;
        }
        if track_changed {
            self.pipeline.set_state(PipelineState::Null);
            self.update_pipeline(false);
        } else {
            self.publish();
        }
    }

    /// Pauses or unpauses the fleet.
    pub fn set_paused(&self, paused: bool) {
        let already = self.inner.read().state.paused;
        if already == paused {
            return;
        }
        if paused {
            let now = self.clock.now_ns();
            self.inner.write().last_pause_time = Some(now);
            self.pipeline.set_state(PipelineState::Paused);
        } else {
            let now = self.clock.now_ns();
            let mut inner = self.inner.write();
            if let Some(last_pause) = inner.last_pause_time.take() {
                inner.state.base_time_offset += now.saturating_sub(last_pause);
            }
            let base_time = inner.state.base_time;
            let base_time_offset = inner.state.base_time_offset;
            drop(inner);
            self.pipeline.set_base_time(base_time + base_time_offset);
            self.pipeline.set_state(PipelineState::Playing);
        }
        self.inner.write().state.paused = paused;
        self.publish();
    }

    /// Stops or resumes the fleet.
    pub fn set_stopped(&self, stopped: bool) {
        let already = self.inner.read().state.stopped;
        if already == stopped {
            return;
        }
        if stopped {
            self.pipeline.set_state(PipelineState::Null);
        } else {
            self.pipeline.set_state(PipelineState::Playing);
        }
        self.inner.write().state.stopped = stopped;
        self.publish();
    }

    /// Called when the pipeline reports end-of-stream for the current
    /// track.
    pub fn on_eos(&self) {
        self.events.emit(CoordinatorEvent::StateVersionAdvanced {
            version: self.inner.read().state.version,
        });
        let has_next = {
            let inner = self.inner.read();
            !inner.state.playlist.is_at_end() && !inner.state.playlist.is_on_last_track()
        };
        if has_next {
            self.update_pipeline(true);
        } else {
            self.inner.write().state.playlist = self
                .inner
                .read()
                .state
                .playlist
                .set_current_track(NO_CURRENT_TRACK);
            self.events.emit(CoordinatorEvent::PlaylistEnded);
            self.publish();
        }
    }

    /// Reprograms the local pipeline and publishes the resulting state;
    /// `advance` selects whether this is a track advance or a fresh start.
    pub fn update_pipeline(&self, advance: bool) {
        if advance {
            let can_advance = {
                let inner = self.inner.read();
                !inner.state.playlist.is_at_end() && !inner.state.playlist.is_on_last_track()
            };
            if !can_advance {
                return;
            }
            let mut inner = self.inner.write();
            let current_index = inner.state.playlist.current_track_index();
            let duration = inner
                .state
                .playlist
                .current_track()
                .map(|t| {
                    if t.duration_is_unknown() {
                        inner.last_duration
                    } else {
                        t.duration_ns
                    }
                })
                .unwrap_or(inner.last_duration);
            inner.state.base_time_offset += duration + inner.state.stream_start_delay;
            let next_index = current_index + 1;
            inner.state.playlist = inner.state.playlist.set_current_track(next_index);
        }

        let uri = {
            let inner = self.inner.read();
            inner.state.playlist.current_uri().map(str::to_string)
        };
        if let Some(uri) = &uri {
            self.pipeline.set_uri(uri);
        }
        self.pipeline.set_latency(self.inner.read().state.latency);

        let (stopped, paused) = {
            let inner = self.inner.read();
            (inner.state.stopped, inner.state.paused)
        };

        if !stopped && !paused {
            if !advance {
                let now = self.clock.now_ns();
                let mut inner = self.inner.write();
                inner.state.base_time = now;
                inner.state.base_time_offset = 0;
            }
            let (base_time, base_time_offset) = {
                let inner = self.inner.read();
                (inner.state.base_time, inner.state.base_time_offset)
            };
            self.pipeline.set_base_time(base_time + base_time_offset);
        }

        let target = match (stopped, paused) {
            (true, _) => PipelineState::Null,
            (false, true) => PipelineState::Paused,
            (false, false) => PipelineState::Playing,
        };
        self.pipeline.set_state(target);

        if let Some(duration) = self.pipeline.query_duration() {
            self.inner.write().last_duration = duration;
        }

        self.publish();

        if let Some(index) = {
            let inner = self.inner.read();
            (!inner.state.playlist.is_at_end()).then(|| inner.state.playlist.current_track_index())
        } {
            self.events.emit(CoordinatorEvent::TrackChanged { track_index: index });
        }
    }

    fn publish(&self) {
        let mut inner = self.inner.write();
        inner.state.version = PROTOCOL_VERSION;
        let snapshot = inner.state.clone();
        drop(inner);
        self.control.set_sync_info(snapshot.clone());
        self.events.emit(CoordinatorEvent::StateVersionAdvanced {
            version: snapshot.version,
        });
    }
}
