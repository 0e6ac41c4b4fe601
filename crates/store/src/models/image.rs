//! Image entity and DTOs.

use serde::{Deserialize, Serialize};

use poseflow_core::image_workflow::ImageStatus;
use poseflow_core::keypoints::{KeypointSet, RawDetection};
use poseflow_core::types::{DbId, Timestamp, UserId};

/// A single image inside a batch.
#[derive(Debug, Clone, Serialize)]
pub struct Image {
    pub id: DbId,
    pub batch_id: DbId,

    pub file_name: String,
    pub storage_path: String,

    pub status: ImageStatus,

    // Detection results
    /// Raw detector output, kept for audit; `None` until processed.
    pub detections: Option<Vec<RawDetection>>,
    /// Schema-normalized candidate keypoints; `None` until processed.
    pub keypoints: Option<KeypointSet>,
    pub detection_attempts: u32,
    pub last_detection_error: Option<String>,
    pub detector_version: Option<String>,

    // Assignment tracking
    pub current_annotator: Option<UserId>,
    pub current_verifier: Option<UserId>,
    /// At most one active assignment covers an image at a time.
    pub current_assignment: Option<DbId>,

    // Quality
    pub quality_score: Option<f64>,
    pub has_quality_issues: bool,
    pub is_difficult_case: bool,
    pub requires_specialist_review: bool,

    pub created_at: Timestamp,
    pub last_status_change: Timestamp,
}

/// DTO for creating a new image.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateImage {
    pub batch_id: DbId,
    pub file_name: String,
    pub storage_path: String,
}

/// Result of a successful detection pass, applied in one store call.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub detections: Vec<RawDetection>,
    pub keypoints: KeypointSet,
    pub detector_version: String,
    /// Attempts it took to get here (1-based).
    pub attempts: u32,
    /// Flagged when the detector found too few confident points.
    pub has_quality_issues: bool,
}
