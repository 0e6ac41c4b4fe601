//! Batch lifecycle status, derived forward-only from child image states.
//!
//! A batch never has its status written directly by request handlers. The
//! progress tracker derives a candidate status from the current child image
//! statuses and advances the batch when the candidate sits further along the
//! lifecycle. Cancellation and archiving are the only explicit moves.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::image_workflow::ImageStatus;
use crate::types::DbId;

/// Lifecycle status of an image batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Uploaded,
    Detecting,
    Detected,
    ReadyForAnnotation,
    Assigned,
    InProgress,
    Completed,
    Archived,
    Cancelled,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Detecting => "detecting",
            Self::Detected => "detected",
            Self::ReadyForAnnotation => "ready_for_annotation",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Archived => "archived",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Archived | Self::Cancelled)
    }

    /// Position along the main lifecycle chain. `Cancelled` sits outside the
    /// chain and has no rank.
    fn rank(&self) -> Option<u8> {
        match self {
            Self::Uploaded => Some(0),
            Self::Detecting => Some(1),
            Self::Detected => Some(2),
            Self::ReadyForAnnotation => Some(3),
            Self::Assigned => Some(4),
            Self::InProgress => Some(5),
            Self::Completed => Some(6),
            Self::Archived => Some(7),
            Self::Cancelled => None,
        }
    }

    /// Whether the tracker may move a batch from `self` to `candidate`.
    /// Movement is forward-only along the chain; cancelled and archived
    /// batches never move.
    pub fn can_advance_to(&self, candidate: BatchStatus) -> bool {
        match (self.rank(), candidate.rank()) {
            (Some(from), Some(to)) => to > from && *self != Self::Archived,
            _ => false,
        }
    }
}

/// Derive the lifecycle position implied by the current child image states.
///
/// `Detected` (detection finished, quality gate not yet passed),
/// `ReadyForAnnotation`, `Archived`, and `Cancelled` are not derivable from
/// children alone; the first two come from the explicit quality-gate step and
/// the last two from explicit operations.
pub fn derive_status(children: &[ImageStatus]) -> BatchStatus {
    if children.is_empty() {
        return BatchStatus::Uploaded;
    }
    if children.iter().all(|s| s.is_settled()) {
        return BatchStatus::Completed;
    }
    let any = |pred: fn(&ImageStatus) -> bool| children.iter().any(pred);

    // Any image past assignment, or any already judged while others remain,
    // means annotation work is underway.
    if any(|s| {
        matches!(
            s,
            ImageStatus::InProgress
                | ImageStatus::Annotated
                | ImageStatus::Submitted
                | ImageStatus::UnderReview
                | ImageStatus::RequiresRevision
                | ImageStatus::Approved
                | ImageStatus::Rejected
        )
    }) {
        return BatchStatus::InProgress;
    }
    if any(|s| matches!(s, ImageStatus::Assigned)) {
        return BatchStatus::Assigned;
    }
    if any(|s| matches!(s, ImageStatus::Uploaded)) {
        if any(|s| matches!(s, ImageStatus::Detected | ImageStatus::DetectionFailed)) {
            return BatchStatus::Detecting;
        }
        return BatchStatus::Uploaded;
    }
    // Detection has finished for every image.
    BatchStatus::Detected
}

/// Validate an explicit transition (cancel, archive, detection kickoff).
pub fn validate_transition(id: DbId, from: BatchStatus, to: BatchStatus) -> Result<(), CoreError> {
    let ok = match to {
        BatchStatus::Cancelled => !from.is_terminal(),
        BatchStatus::Archived => from == BatchStatus::Completed,
        _ => from.can_advance_to(to),
    };
    if ok {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            entity: "batch",
            id,
            from: from.as_str(),
            to: to.as_str(),
        })
    }
}
