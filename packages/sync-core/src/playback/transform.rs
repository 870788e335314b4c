//! Per-client video transform chain.
//!
//! A transform is always applied crop → rotate → scale → box offset,
//! regardless of which keys are present; absent keys are identity for
//! that stage. This module turns the `transform` dictionary entry for one
//! client id into an ordered list of stages a real `MediaPipeline`
//! implementation can fold into a filter graph.

use crate::sync_state::{BoxOffset, Crop, Scale, Transform};

/// One stage of the fixed-order transform chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformStage {
    Crop(Crop),
    Rotate(i32),
    Scale(Scale),
    BoxOffset(BoxOffset),
}

/// Builds the ordered stage list for `transform`, omitting stages that are
/// identity (absent in the source dictionary).
#[must_use]
pub fn build_chain(transform: &Transform) -> Vec<TransformStage> {
    let mut stages = Vec::new();
    if let Some(crop) = transform.crop {
        stages.push(TransformStage::Crop(crop));
    }
    if let Some(rotate) = transform.rotate {
        stages.push(TransformStage::Rotate(rotate));
    }
    if let Some(scale) = transform.scale {
        stages.push(TransformStage::Scale(scale));
    }
    if let Some(offset) = transform.offset {
        stages.push(TransformStage::BoxOffset(offset));
    }
    stages
}

/// Looks up and applies a client's transform onto a pipeline, if the
/// `SyncState` carries one for `client_id`. A no-op if absent or identity.
pub fn apply_transform(
    pipeline: &dyn crate::pipeline::MediaPipeline,
    state: &crate::sync_state::SyncState,
    client_id: &str,
) {
    let transform = state.transform.get(client_id).cloned().unwrap_or_default();
    pipeline.set_transform(&transform);
}
