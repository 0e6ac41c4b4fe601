//! Annotation status machine, versioning, and self-assessment rules.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::thresholds::validate_unit_range;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Annotation status
// ---------------------------------------------------------------------------

/// Status of a single annotation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationStatus {
    /// Created when the annotator starts work.
    Draft,
    /// All keypoints placed, not yet handed over.
    Completed,
    /// Handed over for verification.
    Submitted,
    /// A verifier is judging it.
    UnderReview,
    /// Accepted. Terminal.
    Approved,
    /// A verifier asked for another pass; superseded by a new version. Terminal.
    RevisionRequested,
}

impl AnnotationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Completed => "completed",
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::RevisionRequested => "revision_requested",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::RevisionRequested)
    }

    /// An active annotation blocks any further submission for its image.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn valid_transitions(&self) -> &'static [AnnotationStatus] {
        use AnnotationStatus::*;
        match self {
            Draft => &[Completed],
            Completed => &[Submitted],
            Submitted => &[UnderReview],
            UnderReview => &[Approved, RevisionRequested],
            Approved | RevisionRequested => &[],
        }
    }

    pub fn can_transition(&self, to: AnnotationStatus) -> bool {
        self.valid_transitions().contains(&to)
    }
}

/// Validate a transition for annotation `id`.
pub fn validate_transition(
    id: DbId,
    from: AnnotationStatus,
    to: AnnotationStatus,
) -> Result<(), CoreError> {
    if from.can_transition(to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            entity: "annotation",
            id,
            from: from.as_str(),
            to: to.as_str(),
        })
    }
}

// ---------------------------------------------------------------------------
// Difficulty rating
// ---------------------------------------------------------------------------

/// Annotator's self-reported difficulty for an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyRating {
    Easy,
    Medium,
    Hard,
    VeryHard,
}

impl DifficultyRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::VeryHard => "very_hard",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            "very_hard" => Ok(Self::VeryHard),
            _ => Err(CoreError::Validation(format!(
                "Invalid difficulty rating '{s}'. Must be one of: easy, medium, hard, very_hard"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Versioning and self-assessment
// ---------------------------------------------------------------------------

/// Version number for the next annotation of an image.
pub fn next_version(prior_max: Option<i32>) -> i32 {
    prior_max.map_or(1, |v| v + 1)
}

/// Validate an annotator's quality self-assessment (0-1).
pub fn validate_self_assessment(score: f64) -> Result<(), CoreError> {
    validate_unit_range(score, "quality self-assessment")
}
