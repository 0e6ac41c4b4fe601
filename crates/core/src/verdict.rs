//! Verification decisions, rejection taxonomy, scoring, and the pure
//! outcome computation applied by the decision engine.

use serde::{Deserialize, Serialize};

use crate::annotation::AnnotationStatus;
use crate::error::CoreError;
use crate::image_workflow::ImageStatus;
use crate::thresholds::validate_score_range;

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// A verifier's judgment of a submitted annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationDecision {
    Approved,
    ApprovedWithCorrections,
    MinorRevisionNeeded,
    MajorRevisionNeeded,
    Rejected,
}

impl VerificationDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::ApprovedWithCorrections => "approved_with_corrections",
            Self::MinorRevisionNeeded => "minor_revision_needed",
            Self::MajorRevisionNeeded => "major_revision_needed",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "approved" => Ok(Self::Approved),
            "approved_with_corrections" => Ok(Self::ApprovedWithCorrections),
            "minor_revision_needed" => Ok(Self::MinorRevisionNeeded),
            "major_revision_needed" => Ok(Self::MajorRevisionNeeded),
            "rejected" => Ok(Self::Rejected),
            _ => Err(CoreError::Validation(format!(
                "Invalid verification decision '{s}'"
            ))),
        }
    }

    /// Approval is strictly two-state; "pending" is the absence of a
    /// verification record, never a third boolean value.
    pub fn is_approving(&self) -> bool {
        matches!(self, Self::Approved | Self::ApprovedWithCorrections)
    }

    pub fn needs_revision(&self) -> bool {
        matches!(self, Self::MinorRevisionNeeded | Self::MajorRevisionNeeded)
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected)
    }
}

// ---------------------------------------------------------------------------
// Rejection taxonomy
// ---------------------------------------------------------------------------

/// Structured reason attached to a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    PoorImageQuality,
    IncorrectKeypoints,
    AnatomicalErrors,
    IncompleteAnnotation,
    TechnicalIssues,
    GuidelinesViolation,
    Other,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PoorImageQuality => "poor_image_quality",
            Self::IncorrectKeypoints => "incorrect_keypoints",
            Self::AnatomicalErrors => "anatomical_errors",
            Self::IncompleteAnnotation => "incomplete_annotation",
            Self::TechnicalIssues => "technical_issues",
            Self::GuidelinesViolation => "guidelines_violation",
            Self::Other => "other",
        }
    }
}

/// Rejections must carry a structured reason for downstream analysis.
pub fn validate_rejection_has_reason(
    decision: VerificationDecision,
    reason: Option<RejectionReason>,
) -> Result<(), CoreError> {
    if decision.is_rejection() && reason.is_none() {
        return Err(CoreError::Validation(
            "A rejection must include a rejection_reason".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

/// Verifier scoring rubric. `overall_quality` and `certainty_level` are
/// mandatory; the finer-grained scores are optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationScores {
    pub overall_quality: i32,
    pub anatomical_accuracy: Option<i32>,
    pub technical_precision: Option<i32>,
    pub completeness: Option<i32>,
    pub certainty_level: i32,
}

impl VerificationScores {
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_score_range(self.overall_quality, "overall_quality")?;
        validate_score_range(self.certainty_level, "certainty_level")?;
        if let Some(score) = self.anatomical_accuracy {
            validate_score_range(score, "anatomical_accuracy")?;
        }
        if let Some(score) = self.technical_precision {
            validate_score_range(score, "technical_precision")?;
        }
        if let Some(score) = self.completeness {
            validate_score_range(score, "completeness")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// The state changes a decision implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionOutcome {
    pub annotation_status: AnnotationStatus,
    pub image_status: ImageStatus,
    /// Whether the image re-enters the assignment pool.
    pub needs_reassignment: bool,
}

/// Compute the outcome of a decision.
///
/// A rejection is terminal for the image unless the verifier judged it
/// re-annotatable, in which case it behaves like a revision request.
pub fn decision_outcome(
    decision: VerificationDecision,
    can_be_reannotated: bool,
) -> DecisionOutcome {
    if decision.is_approving() {
        return DecisionOutcome {
            annotation_status: AnnotationStatus::Approved,
            image_status: ImageStatus::Approved,
            needs_reassignment: false,
        };
    }
    if decision.needs_revision() {
        return DecisionOutcome {
            annotation_status: AnnotationStatus::RevisionRequested,
            image_status: ImageStatus::RequiresRevision,
            needs_reassignment: true,
        };
    }
    // Rejected.
    if can_be_reannotated {
        DecisionOutcome {
            annotation_status: AnnotationStatus::RevisionRequested,
            image_status: ImageStatus::RequiresRevision,
            needs_reassignment: true,
        }
    } else {
        DecisionOutcome {
            annotation_status: AnnotationStatus::RevisionRequested,
            image_status: ImageStatus::Rejected,
            needs_reassignment: false,
        }
    }
}
