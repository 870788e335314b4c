//! Sync Core - shared library for the network-synchronised playback
//! coordinator.
//!
//! This crate provides the core functionality shared by the coordinator
//! server and its fleet of playback clients: the canonical shared state
//! document, a wall-clock synchronisation pair, the TCP control plane that
//! distributes state changes, the server-side orchestrator, and the
//! client-side playback state machine that drives an external media
//! pipeline into alignment.
//!
//! # Architecture
//!
//! - [`sync_state`]: the canonical `SyncState`/`Playlist` document and its
//!   wire form
//! - [`clock`]: UDP ping/pong wall-clock provider and consumer
//! - [`control`]: the TCP control plane (wire framing, server, client)
//! - [`orchestrator`]: server-side state mutation and broadcast
//! - [`pipeline`]: the abstract media pipeline a client drives
//! - [`playback`]: the client-side playback state machine and video
//!   transform chain
//! - [`events`]: event system for observing coordinator activity
//! - [`runtime`]: task spawning abstraction for async runtime independence
//! - [`lifecycle`]: process lifecycle abstraction
//! - [`error`]: centralized error types
//! - [`protocol_constants`]: fixed wire-contract constants

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod control;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod orchestrator;
pub mod pipeline;
pub mod playback;
pub mod protocol_constants;
pub mod runtime;
pub mod sync_state;

pub use clock::{ClockConsumer, ClockError, ClockProvider};
pub use error::{ErrorCode, SyncError, SyncResult};
pub use events::{CoordinatorEvent, EventBridge, EventEmitter};
pub use lifecycle::{Lifecycle, NoopLifecycle, ProcessLifecycle};
pub use orchestrator::Orchestrator;
pub use pipeline::{MediaPipeline, PipelineState};
pub use playback::state_machine::PlaybackStateMachine;
pub use playback::transform::apply_transform;
pub use runtime::{TaskSpawner, TokioSpawner};
pub use sync_state::{InvalidFrame, Playlist, SyncState, Track, Transform};
