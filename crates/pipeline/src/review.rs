//! Verification decision engine.

use poseflow_core::annotation::AnnotationStatus;
use poseflow_core::error::CoreError;
use poseflow_core::identity::{self, UserRef};
use poseflow_core::image_workflow::ImageStatus;
use poseflow_core::keypoints::{validate_keypoint_set, KeypointSet};
use poseflow_core::types::DbId;
use poseflow_core::verdict::{decision_outcome, RejectionReason, VerificationDecision, VerificationScores};
use poseflow_events::NotificationBus;
use poseflow_store::models::{CreateVerification, Verification};
use poseflow_store::EntityStore;

use crate::progress::ProgressTracker;

/// Parameters for [`ReviewEngine::decide`].
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub decision: VerificationDecision,
    pub scores: VerificationScores,
    pub corrected_keypoints: Option<KeypointSet>,
    pub rejection_reason: Option<RejectionReason>,
    pub rejection_details: Option<String>,
    /// Whether a rejected image may go back to the pool instead of dying.
    pub can_be_reannotated: bool,
    /// Escalate the chain for a mandatory second opinion by another verifier.
    pub requires_second_opinion: bool,
    pub feedback_to_annotator: Option<String>,
}

pub struct ReviewEngine;

impl ReviewEngine {
    /// Apply a verifier's judgment to a submitted annotation.
    ///
    /// The verification insert is the atomic gate: of two racing calls on
    /// the same annotation exactly one creates the record, and only that
    /// caller goes on to move the image. The loser sees `AlreadyVerified`.
    pub fn decide(
        store: &EntityStore,
        bus: &NotificationBus,
        annotation_id: DbId,
        verifier: &UserRef,
        request: DecisionRequest,
    ) -> Result<Verification, CoreError> {
        identity::require(verifier.can_verify(), "verify annotations", verifier)?;

        let annotation = store.annotation(annotation_id)?;
        let image = store.image(annotation.image_id)?;
        let batch = store.batch(image.batch_id)?;
        if let Some(corrections) = &request.corrected_keypoints {
            validate_keypoint_set(&batch.schema, corrections)?;
        }

        let verification = store.create_verification(CreateVerification {
            annotation_id,
            verifier: verifier.id,
            decision: request.decision,
            corrected_keypoints: request.corrected_keypoints,
            scores: request.scores,
            rejection_reason: request.rejection_reason,
            rejection_details: request.rejection_details,
            can_be_reannotated: request.can_be_reannotated,
            requires_second_opinion: request.requires_second_opinion,
            feedback_to_annotator: request.feedback_to_annotator,
        })?;

        store.set_current_verifier(image.id, Some(verifier.id))?;
        store.transition_annotation(annotation_id, AnnotationStatus::UnderReview)?;
        store.transition_image(image.id, ImageStatus::UnderReview)?;

        let outcome = decision_outcome(request.decision, request.can_be_reannotated);
        store.transition_annotation(annotation_id, outcome.annotation_status)?;
        store.transition_image(image.id, outcome.image_status)?;
        // Settled or back in the pool; either way the assignment is done
        // with this image.
        store.clear_image_assignment(image.id)?;

        if request.requires_second_opinion {
            store.mark_second_opinion_required(batch.id)?;
        }

        ProgressTracker::recompute(store, bus, batch.id)?;
        tracing::info!(
            annotation_id,
            image_id = image.id,
            decision = request.decision.as_str(),
            image_status = outcome.image_status.as_str(),
            "verification recorded"
        );
        Ok(verification)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use poseflow_core::annotation::AnnotationStatus;
    use poseflow_core::assignment::AssignmentType;
    use poseflow_core::error::CoreError;
    use poseflow_core::identity::{Role, UserRef};
    use poseflow_core::image_workflow::ImageStatus;
    use poseflow_core::keypoints::{Keypoint, KeypointSchema, KeypointSet, SchemaKeypoint};
    use poseflow_core::types::UserId;
    use poseflow_core::verdict::{RejectionReason, VerificationDecision, VerificationScores};
    use poseflow_events::NotificationBus;
    use poseflow_store::models::{CreateBatch, CreateImage};
    use poseflow_store::EntityStore;

    use crate::scheduler::{AssignmentRequest, Scheduler};
    use crate::submission::{AnnotationDraft, Submission};

    use super::{DecisionRequest, ReviewEngine};

    fn schema() -> KeypointSchema {
        KeypointSchema::new(
            "infant-pose",
            "v2",
            vec![SchemaKeypoint { label: "head".into(), required: true }],
        )
    }

    fn keypoints() -> KeypointSet {
        KeypointSet {
            schema_name: "infant-pose".to_string(),
            schema_version: "v2".to_string(),
            points: vec![Keypoint {
                label: "head".to_string(),
                x: 10.0,
                y: 12.0,
                confidence: 0.95,
                visible: true,
                note: None,
            }],
        }
    }

    fn scores() -> VerificationScores {
        VerificationScores {
            overall_quality: 8,
            anatomical_accuracy: None,
            technical_precision: None,
            completeness: None,
            certainty_level: 9,
        }
    }

    fn approve() -> DecisionRequest {
        DecisionRequest {
            decision: VerificationDecision::Approved,
            scores: scores(),
            corrected_keypoints: None,
            rejection_reason: None,
            rejection_details: None,
            can_be_reannotated: true,
            requires_second_opinion: false,
            feedback_to_annotator: None,
        }
    }

    struct Fixture {
        store: EntityStore,
        bus: NotificationBus,
        verifier: UserRef,
        image_id: i64,
        annotation_id: i64,
    }

    fn fixture() -> Fixture {
        let store = EntityStore::new();
        let bus = NotificationBus::default();
        let batch = store
            .create_batch(CreateBatch {
                name: "session".to_string(),
                description: None,
                schema: schema(),
                total_images: 1,
                priority: None,
                quality_threshold: None,
                uploaded_by: UserId::new_v4(),
            })
            .unwrap();
        let image = store
            .create_image(CreateImage {
                batch_id: batch.id,
                file_name: "a.png".to_string(),
                storage_path: "x/a.png".to_string(),
            })
            .unwrap();
        store.transition_image(image.id, ImageStatus::Detected).unwrap();

        let annotator = UserRef::new(UserId::new_v4(), Role::Annotator, 5);
        let admin = UserRef::new(UserId::new_v4(), Role::Admin, 10);
        let assignment = Scheduler::assign(
            &store,
            &bus,
            AssignmentRequest {
                image_ids: vec![image.id],
                annotator,
                assigned_by: admin,
                assignment_type: AssignmentType::Initial,
                priority: None,
                due_date: None,
                special_instructions: None,
            },
        )
        .unwrap();
        let annotation = Submission::submit(
            &store,
            &bus,
            assignment.id,
            image.id,
            &annotator,
            AnnotationDraft {
                keypoints: keypoints(),
                self_assessment: None,
                difficulty: None,
                notes: None,
                time_spent_seconds: 60,
                revision_reason: None,
            },
        )
        .unwrap();

        Fixture {
            store,
            bus,
            verifier: UserRef::new(UserId::new_v4(), Role::Verifier, 5),
            image_id: image.id,
            annotation_id: annotation.id,
        }
    }

    #[test]
    fn approval_settles_the_image() {
        let f = fixture();
        let verification = ReviewEngine::decide(
            &f.store,
            &f.bus,
            f.annotation_id,
            &f.verifier,
            approve(),
        )
        .unwrap();

        assert_eq!(verification.decision, VerificationDecision::Approved);
        let image = f.store.image(f.image_id).unwrap();
        assert_eq!(image.status, ImageStatus::Approved);
        assert!(image.current_assignment.is_none());
        assert_eq!(
            f.store.annotation(f.annotation_id).unwrap().status,
            AnnotationStatus::Approved
        );
    }

    #[test]
    fn revision_request_reopens_the_image() {
        let f = fixture();
        let mut request = approve();
        request.decision = VerificationDecision::MajorRevisionNeeded;
        ReviewEngine::decide(&f.store, &f.bus, f.annotation_id, &f.verifier, request).unwrap();

        let image = f.store.image(f.image_id).unwrap();
        assert_eq!(image.status, ImageStatus::RequiresRevision);
        assert!(image.current_assignment.is_none());
        assert_eq!(
            f.store.annotation(f.annotation_id).unwrap().status,
            AnnotationStatus::RevisionRequested
        );
    }

    #[test]
    fn rejection_honors_reannotatability() {
        let f = fixture();
        let mut request = approve();
        request.decision = VerificationDecision::Rejected;
        request.rejection_reason = Some(RejectionReason::PoorImageQuality);
        request.can_be_reannotated = false;
        ReviewEngine::decide(&f.store, &f.bus, f.annotation_id, &f.verifier, request).unwrap();
        assert_eq!(f.store.image(f.image_id).unwrap().status, ImageStatus::Rejected);
    }

    #[test]
    fn second_decide_is_already_verified() {
        let f = fixture();
        ReviewEngine::decide(&f.store, &f.bus, f.annotation_id, &f.verifier, approve()).unwrap();
        let other = UserRef::new(UserId::new_v4(), Role::Verifier, 5);
        let err = ReviewEngine::decide(&f.store, &f.bus, f.annotation_id, &other, approve())
            .unwrap_err();
        assert_matches!(err, CoreError::AlreadyVerified { annotation } if annotation == f.annotation_id);
        // Still exactly one verification.
        assert!(f.store.verification_for_annotation(f.annotation_id).is_some());
    }

    #[test]
    fn annotator_cannot_verify() {
        let f = fixture();
        let annotator = UserRef::new(UserId::new_v4(), Role::Annotator, 5);
        let err = ReviewEngine::decide(&f.store, &f.bus, f.annotation_id, &annotator, approve())
            .unwrap_err();
        assert_matches!(err, CoreError::Forbidden(_));
    }

    #[test]
    fn corrections_are_schema_validated() {
        let f = fixture();
        let mut request = approve();
        request.decision = VerificationDecision::ApprovedWithCorrections;
        let mut corrections = keypoints();
        corrections.points[0].confidence = 1.4;
        request.corrected_keypoints = Some(corrections);
        let err = ReviewEngine::decide(&f.store, &f.bus, f.annotation_id, &f.verifier, request)
            .unwrap_err();
        assert_matches!(err, CoreError::Validation(_));
        // Gate ran before the insert; the annotation is still verifiable.
        assert!(f.store.verification_for_annotation(f.annotation_id).is_none());
    }

    #[test]
    fn second_opinion_flags_the_batch() {
        let f = fixture();
        let mut request = approve();
        request.decision = VerificationDecision::MinorRevisionNeeded;
        request.requires_second_opinion = true;
        ReviewEngine::decide(&f.store, &f.bus, f.annotation_id, &f.verifier, request).unwrap();

        let image = f.store.image(f.image_id).unwrap();
        let batch = f.store.batch(image.batch_id).unwrap();
        assert!(batch.second_opinion_required);
    }
}
