//! Assignment lifecycle, priorities, capacity, and overdue checks.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::identity::UserRef;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Lowest assignment priority.
pub const PRIORITY_MIN: i32 = 1;

/// Highest assignment priority. Higher means more urgent.
pub const PRIORITY_MAX: i32 = 10;

/// Default priority for new assignments and batches.
pub const PRIORITY_DEFAULT: i32 = 5;

/// Validate that a priority is within `[1, 10]`.
pub fn validate_priority(priority: i32) -> Result<(), CoreError> {
    if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&priority) {
        return Err(CoreError::Validation(format!(
            "priority must be between {PRIORITY_MIN} and {PRIORITY_MAX}, got {priority}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Assignment type
// ---------------------------------------------------------------------------

/// Why an assignment was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentType {
    /// First pass over freshly detected images.
    Initial,
    /// Re-annotation after a verifier requested changes.
    Revision,
    /// Spot check of already approved work.
    QualityCheck,
    /// Independent second pass requested during verification.
    SecondOpinion,
}

impl AssignmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Revision => "revision",
            Self::QualityCheck => "quality_check",
            Self::SecondOpinion => "second_opinion",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "initial" => Ok(Self::Initial),
            "revision" => Ok(Self::Revision),
            "quality_check" => Ok(Self::QualityCheck),
            "second_opinion" => Ok(Self::SecondOpinion),
            _ => Err(CoreError::Validation(format!(
                "Invalid assignment type '{s}'. Must be one of: initial, revision, quality_check, second_opinion"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Assignment status
// ---------------------------------------------------------------------------

/// Lifecycle status of an assignment.
///
/// Overdue is deliberately not a status: it is a pure function of the due
/// date and the clock, so storing it would only let it go stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    Acknowledged,
    InProgress,
    Submitted,
    Cancelled,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::Acknowledged => "acknowledged",
            Self::InProgress => "in_progress",
            Self::Submitted => "submitted",
            Self::Cancelled => "cancelled",
        }
    }

    /// Active assignments count against an annotator's capacity.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Assigned | Self::Acknowledged | Self::InProgress)
    }

    /// Acknowledgement is optional: work may start straight from `Assigned`.
    pub fn valid_transitions(&self) -> &'static [AssignmentStatus] {
        use AssignmentStatus::*;
        match self {
            Assigned => &[Acknowledged, InProgress, Cancelled],
            Acknowledged => &[InProgress, Cancelled],
            InProgress => &[Submitted, Cancelled],
            Submitted | Cancelled => &[],
        }
    }

    pub fn can_transition(&self, to: AssignmentStatus) -> bool {
        self.valid_transitions().contains(&to)
    }
}

/// Validate a transition for assignment `id`.
pub fn validate_transition(
    id: DbId,
    from: AssignmentStatus,
    to: AssignmentStatus,
) -> Result<(), CoreError> {
    if from.can_transition(to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            entity: "assignment",
            id,
            from: from.as_str(),
            to: to.as_str(),
        })
    }
}

// ---------------------------------------------------------------------------
// Capacity and progress
// ---------------------------------------------------------------------------

/// Reject an assignment when the annotator is already at capacity.
pub fn check_capacity(annotator: &UserRef, active: usize) -> Result<(), CoreError> {
    if active >= annotator.max_concurrent_batches as usize {
        return Err(CoreError::CapacityExceeded {
            annotator: annotator.id,
            active,
            limit: annotator.max_concurrent_batches,
        });
    }
    Ok(())
}

/// Completion percentage of an assignment, in `0.0..=100.0`.
pub fn progress_percentage(images_completed: u32, images_total: u32) -> f64 {
    if images_total == 0 {
        return 0.0;
    }
    f64::from(images_completed) / f64::from(images_total) * 100.0
}

/// Whether an assignment is overdue at `now`. Pure query, never stored.
pub fn is_overdue(due_date: Option<Timestamp>, now: Timestamp) -> bool {
    due_date.is_some_and(|due| now > due)
}
