//! Pose-detector collaborator contract.
//!
//! The model service lives outside this crate; the workflow only needs raw
//! detection rows back. An empty list is a valid result (nothing detected),
//! while model or input errors surface as [`DetectionFailure`] so the
//! ingestion retry policy can tell them apart from workflow errors.

use async_trait::async_trait;

use poseflow_core::keypoints::RawDetection;

/// Error raised by the external detection model.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct DetectionFailure {
    pub message: String,
}

impl DetectionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// The pretrained pose-detection model.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Run detection over raw image bytes.
    async fn detect(&self, image_bytes: &[u8]) -> Result<Vec<RawDetection>, DetectionFailure>;

    /// Version tag recorded on processed images and batches.
    fn version(&self) -> &str;
}
