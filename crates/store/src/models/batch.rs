//! Batch entity and DTOs.

use serde::{Deserialize, Serialize};

use poseflow_core::batch_lifecycle::BatchStatus;
use poseflow_core::keypoints::KeypointSchema;
use poseflow_core::progress::{percentage, BatchCounters};
use poseflow_core::types::{DbId, Timestamp, UserId};

/// An upload batch and its derived progress snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    pub id: DbId,
    pub name: String,
    pub description: Option<String>,

    /// Schema every image in the batch is annotated against.
    pub schema: KeypointSchema,
    /// Declared size of the batch; image creation is capped at this.
    pub total_images: u32,

    pub status: BatchStatus,
    /// Snapshot written only by the progress tracker, always derived from
    /// current child image states.
    pub counters: BatchCounters,

    pub priority: i32,
    /// Quality-gate threshold images are held against before annotation.
    pub quality_threshold: f64,
    /// Set when a verifier escalated part of this batch for a second opinion.
    pub second_opinion_required: bool,

    // Detection bookkeeping
    pub detection_started_at: Option<Timestamp>,
    pub detection_completed_at: Option<Timestamp>,
    pub detector_version: Option<String>,
    pub avg_detection_confidence: Option<f64>,

    pub uploaded_by: UserId,
    pub uploaded_at: Timestamp,
}

impl Batch {
    /// Completion percentage derived from the counter snapshot.
    pub fn progress_percentage(&self) -> f64 {
        percentage(self.counters.completed, self.total_images)
    }
}

/// DTO for creating a new batch.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBatch {
    pub name: String,
    pub description: Option<String>,
    pub schema: KeypointSchema,
    pub total_images: u32,
    /// Defaults to 5 if omitted.
    pub priority: Option<i32>,
    /// Defaults to 7.0 if omitted.
    pub quality_threshold: Option<f64>,
    pub uploaded_by: UserId,
}
