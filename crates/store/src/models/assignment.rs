//! Assignment entity and DTOs.

use serde::{Deserialize, Serialize};

use poseflow_core::assignment::{AssignmentStatus, AssignmentType};
use poseflow_core::identity::UserRef;
use poseflow_core::types::{DbId, Timestamp, UserId};

/// A work order handing a group of images to one annotator.
#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub id: DbId,
    pub batch_id: DbId,
    /// Images covered by this assignment, all from `batch_id`.
    pub image_ids: Vec<DbId>,

    pub annotator: UserId,
    pub assigned_by: UserId,

    pub assignment_type: AssignmentType,
    pub status: AssignmentStatus,
    pub priority: i32,
    pub special_instructions: Option<String>,

    // Progress, recomputed from child annotations on every submission.
    pub images_total: u32,
    pub images_completed: u32,
    pub progress_percentage: f64,

    // Timing
    pub due_date: Option<Timestamp>,
    pub assigned_at: Timestamp,
    pub acknowledged_at: Option<Timestamp>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

/// DTO for creating a new assignment.
///
/// Carries the full [`UserRef`] of the annotator so the capacity check can
/// run inside the same store call that links the images.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAssignment {
    pub image_ids: Vec<DbId>,
    pub annotator: UserRef,
    pub assigned_by: UserId,
    pub assignment_type: AssignmentType,
    /// Defaults to 5 if omitted.
    pub priority: Option<i32>,
    pub due_date: Option<Timestamp>,
    pub special_instructions: Option<String>,
}
