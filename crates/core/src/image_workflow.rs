//! Image workflow status and its transition table.
//!
//! The table is strict: every transition not listed here is rejected and
//! leaves the stored status untouched. Transitions are always validated
//! against the current stored status, which is what resolves racing writers.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

/// Workflow status of a single image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    /// Uploaded, awaiting detection.
    Uploaded,
    /// Detection exhausted its retries; only an explicit retry re-queues it.
    DetectionFailed,
    /// Candidate keypoints are available; ready for assignment.
    Detected,
    /// Covered by an active assignment.
    Assigned,
    /// An annotator is working on it.
    InProgress,
    /// Annotation finished but not yet submitted.
    Annotated,
    /// Annotation submitted, awaiting a verifier.
    Submitted,
    /// A verifier has picked it up.
    UnderReview,
    /// Verified and accepted.
    Approved,
    /// Verified and rejected without re-annotation.
    Rejected,
    /// A verifier requested another pass; re-enters the assignment pool.
    RequiresRevision,
    /// Batch was cancelled while this image was still in flight.
    Cancelled,
}

impl ImageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::DetectionFailed => "detection_failed",
            Self::Detected => "detected",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Annotated => "annotated",
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::RequiresRevision => "requires_revision",
            Self::Cancelled => "cancelled",
        }
    }

    /// No further transitions are possible out of a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }

    /// Settled images no longer block batch completion. This includes
    /// `DetectionFailed`, which sits out of the workflow until an explicit
    /// retry but must not hold the rest of the batch hostage.
    pub fn is_settled(&self) -> bool {
        self.is_terminal() || matches!(self, Self::DetectionFailed)
    }

    /// Statuses that count toward a batch's `assigned_count`.
    pub fn is_assigned_work(&self) -> bool {
        matches!(
            self,
            Self::Assigned | Self::InProgress | Self::Annotated | Self::Submitted | Self::UnderReview
        )
    }

    /// Images an annotator may be handed: freshly detected or sent back for
    /// another pass.
    pub fn is_assignable(&self) -> bool {
        matches!(self, Self::Detected | Self::RequiresRevision)
    }

    /// Returns the set of statuses reachable from `self`.
    pub fn valid_transitions(&self) -> &'static [ImageStatus] {
        use ImageStatus::*;
        match self {
            Uploaded => &[Detected, DetectionFailed, Cancelled],
            DetectionFailed => &[Uploaded, Cancelled],
            Detected => &[Assigned, Cancelled],
            Assigned => &[InProgress, Cancelled],
            InProgress => &[Annotated, Cancelled],
            Annotated => &[Submitted, Cancelled],
            Submitted => &[UnderReview, Cancelled],
            UnderReview => &[Approved, Rejected, RequiresRevision, Cancelled],
            RequiresRevision => &[Assigned, Cancelled],
            Approved | Rejected | Cancelled => &[],
        }
    }

    pub fn can_transition(&self, to: ImageStatus) -> bool {
        self.valid_transitions().contains(&to)
    }
}

/// Validate a transition for image `id`, producing the canonical error.
pub fn validate_transition(id: DbId, from: ImageStatus, to: ImageStatus) -> Result<(), CoreError> {
    if from.can_transition(to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            entity: "image",
            id,
            from: from.as_str(),
            to: to.as_str(),
        })
    }
}
