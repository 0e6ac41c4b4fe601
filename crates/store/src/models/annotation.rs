//! Annotation entity and DTOs.

use serde::{Deserialize, Serialize};

use poseflow_core::annotation::{AnnotationStatus, DifficultyRating};
use poseflow_core::keypoints::KeypointSet;
use poseflow_core::types::{DbId, Timestamp};

/// One annotator pass over one image.
///
/// Revisions never overwrite: each pass is a new record with a bumped
/// `version`, and every revision points at the version-1 root of its chain so
/// lineage queries are a single lookup.
#[derive(Debug, Clone, Serialize)]
pub struct Annotation {
    pub id: DbId,
    pub image_id: DbId,
    pub assignment_id: DbId,

    /// Refined keypoints, the primary output.
    pub keypoints: KeypointSet,

    // Annotator feedback
    pub self_assessment: Option<f64>,
    pub difficulty: Option<DifficultyRating>,
    pub notes: Option<String>,
    pub time_spent_seconds: u32,

    // Versioning
    pub version: i32,
    pub is_revision: bool,
    /// Version-1 root of the revision chain; `None` on the root itself.
    pub original_annotation: Option<DbId>,
    pub revision_reason: Option<String>,

    pub status: AnnotationStatus,
    pub created_at: Timestamp,
    pub submitted_at: Option<Timestamp>,
}

/// DTO for creating a new annotation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAnnotation {
    pub image_id: DbId,
    pub assignment_id: DbId,
    pub keypoints: KeypointSet,
    pub self_assessment: Option<f64>,
    pub difficulty: Option<DifficultyRating>,
    pub notes: Option<String>,
    pub time_spent_seconds: u32,
    pub revision_reason: Option<String>,
}
