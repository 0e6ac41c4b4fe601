//! Verification entity and DTOs.

use serde::{Deserialize, Serialize};

use poseflow_core::keypoints::KeypointSet;
use poseflow_core::types::{DbId, Timestamp, UserId};
use poseflow_core::verdict::{RejectionReason, VerificationDecision, VerificationScores};

/// A verifier's immutable judgment of one annotation.
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub id: DbId,
    /// One-to-one: at most one verification exists per annotation.
    pub annotation_id: DbId,
    pub verifier: UserId,

    pub decision: VerificationDecision,
    /// The verifier's own corrections, when the decision carries any.
    pub corrected_keypoints: Option<KeypointSet>,
    pub scores: VerificationScores,

    // Rejection taxonomy
    pub rejection_reason: Option<RejectionReason>,
    pub rejection_details: Option<String>,
    pub can_be_reannotated: bool,

    pub requires_second_opinion: bool,
    pub feedback_to_annotator: Option<String>,

    pub verified_at: Timestamp,
}

/// DTO for creating a new verification.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateVerification {
    pub annotation_id: DbId,
    pub verifier: UserId,
    pub decision: VerificationDecision,
    pub corrected_keypoints: Option<KeypointSet>,
    pub scores: VerificationScores,
    pub rejection_reason: Option<RejectionReason>,
    pub rejection_details: Option<String>,
    pub can_be_reannotated: bool,
    pub requires_second_opinion: bool,
    pub feedback_to_annotator: Option<String>,
}
