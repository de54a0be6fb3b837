//! Application state for the API server.

use std::sync::Arc;

use palisade_core::DetectionPipeline;

/// Shared application state.
///
/// The pipeline is immutable after construction, so handlers share it
/// without locking.
#[derive(Clone)]
pub struct AppState {
    /// The detection pipeline.
    pub pipeline: Arc<DetectionPipeline>,
}

impl AppState {
    /// Creates application state around a constructed pipeline.
    pub fn new(pipeline: DetectionPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}
