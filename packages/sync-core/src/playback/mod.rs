//! Client-side playback: the state machine that drives a `MediaPipeline`
//! into alignment, and the video transform chain it applies.

pub mod state_machine;
pub mod transform;

pub use state_machine::{PlaybackStateMachine, SeekPhase};
pub use transform::{apply_transform, build_chain, TransformStage};
