//! Verification operations.
//!
//! Creation is the idempotency gate for the decision engine: the existence
//! check, the submitted-status precondition, the second-opinion verifier
//! rule, and the insert all happen inside one lock scope, so of two racing
//! `decide` calls exactly one creates the row.

use chrono::Utc;

use poseflow_core::annotation::AnnotationStatus;
use poseflow_core::error::CoreError;
use poseflow_core::types::DbId;
use poseflow_core::verdict::validate_rejection_has_reason;

use crate::models::{CreateVerification, Verification};

use super::EntityStore;

impl EntityStore {
    /// Insert the one verification an annotation may ever have.
    pub fn create_verification(
        &self,
        input: CreateVerification,
    ) -> Result<Verification, CoreError> {
        input.scores.validate()?;
        validate_rejection_has_reason(input.decision, input.rejection_reason)?;

        let mut inner = self.write();
        let annotation_id = input.annotation_id;
        let annotation = inner
            .annotations
            .get(&annotation_id)
            .ok_or(CoreError::NotFound { entity: "annotation", id: annotation_id })?;

        if inner.verification_by_annotation.contains_key(&annotation_id) {
            return Err(CoreError::AlreadyVerified { annotation: annotation_id });
        }
        if annotation.status != AnnotationStatus::Submitted {
            return Err(CoreError::InvalidTransition {
                entity: "annotation",
                id: annotation_id,
                from: annotation.status.as_str(),
                to: AnnotationStatus::UnderReview.as_str(),
            });
        }

        // A chain escalated for a second opinion must be judged by a
        // different verifier than the one who escalated it.
        let image_id = annotation.image_id;
        let conflicted = inner
            .annotations_by_image
            .get(&image_id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.verification_by_annotation.get(id))
            .filter_map(|id| inner.verifications.get(id))
            .any(|v| v.requires_second_opinion && v.verifier == input.verifier);
        if conflicted {
            return Err(CoreError::SameVerifierConflict { verifier: input.verifier });
        }

        let id = inner.next_id();
        let record = Verification {
            id,
            annotation_id,
            verifier: input.verifier,
            decision: input.decision,
            corrected_keypoints: input.corrected_keypoints,
            scores: input.scores,
            rejection_reason: input.rejection_reason,
            rejection_details: input.rejection_details,
            can_be_reannotated: input.can_be_reannotated,
            requires_second_opinion: input.requires_second_opinion,
            feedback_to_annotator: input.feedback_to_annotator,
            verified_at: Utc::now(),
        };
        inner.verifications.insert(id, record.clone());
        inner.verification_by_annotation.insert(annotation_id, id);
        Ok(record)
    }

    /// Fetch a verification by id.
    pub fn verification(&self, id: DbId) -> Result<Verification, CoreError> {
        self.read()
            .verifications
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound { entity: "verification", id })
    }

    /// The verification judging an annotation, if one exists.
    pub fn verification_for_annotation(&self, annotation_id: DbId) -> Option<Verification> {
        let inner = self.read();
        inner
            .verification_by_annotation
            .get(&annotation_id)
            .and_then(|id| inner.verifications.get(id))
            .cloned()
    }
}
