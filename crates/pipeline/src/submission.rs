//! Annotation submission and the revision chain.

use poseflow_core::annotation::{AnnotationStatus, DifficultyRating};
use poseflow_core::assignment::AssignmentStatus;
use poseflow_core::error::CoreError;
use poseflow_core::identity::{self, UserRef};
use poseflow_core::image_workflow::ImageStatus;
use poseflow_core::keypoints::{validate_keypoint_set, KeypointSet};
use poseflow_core::types::DbId;
use poseflow_events::NotificationBus;
use poseflow_store::models::{Annotation, CreateAnnotation};
use poseflow_store::EntityStore;

use crate::progress::ProgressTracker;
use crate::scheduler::Scheduler;

/// The annotator's finished work for one image.
#[derive(Debug, Clone)]
pub struct AnnotationDraft {
    pub keypoints: KeypointSet,
    pub self_assessment: Option<f64>,
    pub difficulty: Option<DifficultyRating>,
    pub notes: Option<String>,
    pub time_spent_seconds: u32,
    pub revision_reason: Option<String>,
}

pub struct Submission;

impl Submission {
    /// Submit refined keypoints for one image of an assignment.
    ///
    /// Creates the next version in the image's revision chain and hands it
    /// over for verification. The store rejects a second submission while an
    /// earlier one is still in flight (`DuplicateSubmission`).
    pub fn submit(
        store: &EntityStore,
        bus: &NotificationBus,
        assignment_id: DbId,
        image_id: DbId,
        annotator: &UserRef,
        draft: AnnotationDraft,
    ) -> Result<Annotation, CoreError> {
        identity::require(annotator.can_annotate(), "submit annotations", annotator)?;

        let assignment = store.assignment(assignment_id)?;
        if assignment.annotator != annotator.id {
            return Err(CoreError::Forbidden(format!(
                "assignment {assignment_id} belongs to a different annotator"
            )));
        }

        let image = store.image(image_id)?;
        let schema = store.batch(image.batch_id)?.schema;
        validate_keypoint_set(&schema, &draft.keypoints)?;

        // Opening the image on submit is fine; annotators often work
        // straight out of the queue.
        if image.status == ImageStatus::Assigned {
            Scheduler::start_image(store, image_id)?;
        }

        let annotation = store.create_annotation(CreateAnnotation {
            image_id,
            assignment_id,
            keypoints: draft.keypoints,
            self_assessment: draft.self_assessment,
            difficulty: draft.difficulty,
            notes: draft.notes,
            time_spent_seconds: draft.time_spent_seconds,
            revision_reason: draft.revision_reason,
        })?;
        store.transition_annotation(annotation.id, AnnotationStatus::Completed)?;
        let annotation = store.transition_annotation(annotation.id, AnnotationStatus::Submitted)?;

        store.transition_image(image_id, ImageStatus::Annotated)?;
        store.transition_image(image_id, ImageStatus::Submitted)?;

        let completed = store.submitted_image_count(assignment_id)?;
        let assignment = store.set_assignment_progress(assignment_id, completed)?;
        if completed == assignment.images_total
            && assignment.status == AssignmentStatus::InProgress
        {
            store.transition_assignment(assignment_id, AssignmentStatus::Submitted)?;
        }

        ProgressTracker::recompute(store, bus, image.batch_id)?;
        tracing::info!(
            annotation_id = annotation.id,
            image_id,
            assignment_id,
            version = annotation.version,
            "annotation submitted"
        );
        Ok(annotation)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use poseflow_core::assignment::{AssignmentStatus, AssignmentType};
    use poseflow_core::error::CoreError;
    use poseflow_core::identity::{Role, UserRef};
    use poseflow_core::image_workflow::ImageStatus;
    use poseflow_core::keypoints::{Keypoint, KeypointSchema, KeypointSet, SchemaKeypoint};
    use poseflow_core::types::UserId;
    use poseflow_events::NotificationBus;
    use poseflow_store::models::{CreateBatch, CreateImage};
    use poseflow_store::EntityStore;

    use crate::scheduler::{AssignmentRequest, Scheduler};

    use super::{AnnotationDraft, Submission};

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

    fn draft() -> AnnotationDraft {
        AnnotationDraft {
            keypoints: keypoints(),
            self_assessment: Some(0.9),
            difficulty: None,
            notes: None,
            time_spent_seconds: 90,
            revision_reason: None,
        }
    }

    struct Fixture {
        store: EntityStore,
        bus: NotificationBus,
        annotator: UserRef,
        image_ids: Vec<i64>,
        assignment_id: i64,
    }

    fn fixture(count: u32) -> Fixture {
        let store = EntityStore::new();
        let bus = NotificationBus::default();
        let batch = store
            .create_batch(CreateBatch {
                name: "session".to_string(),
                description: None,
                schema: schema(),
                total_images: count,
                priority: None,
                quality_threshold: None,
                uploaded_by: UserId::new_v4(),
            })
            .unwrap();
        let image_ids: Vec<i64> = (0..count)
            .map(|i| {
                let image = store
                    .create_image(CreateImage {
                        batch_id: batch.id,
                        file_name: format!("{i}.png"),
                        storage_path: format!("x/{i}.png"),
                    })
                    .unwrap();
                store.transition_image(image.id, ImageStatus::Detected).unwrap();
                image.id
            })
            .collect();
        let annotator = UserRef::new(UserId::new_v4(), Role::Annotator, 5);
        let admin = UserRef::new(UserId::new_v4(), Role::Admin, 10);
        let assignment = Scheduler::assign(
            &store,
            &bus,
            AssignmentRequest {
                image_ids: image_ids.clone(),
                annotator,
                assigned_by: admin,
                assignment_type: AssignmentType::Initial,
                priority: None,
                due_date: None,
                special_instructions: None,
            },
        )
        .unwrap();
        Fixture { store, bus, annotator, image_ids, assignment_id: assignment.id }
    }

    #[test]
    fn submit_walks_image_to_submitted() {
        let f = fixture(1);
        let annotation = Submission::submit(
            &f.store,
            &f.bus,
            f.assignment_id,
            f.image_ids[0],
            &f.annotator,
            draft(),
        )
        .unwrap();

        assert_eq!(annotation.version, 1);
        assert!(annotation.submitted_at.is_some());
        assert_eq!(
            f.store.image(f.image_ids[0]).unwrap().status,
            ImageStatus::Submitted
        );
    }

    #[test]
    fn last_submission_completes_the_assignment() {
        let f = fixture(2);
        Submission::submit(&f.store, &f.bus, f.assignment_id, f.image_ids[0], &f.annotator, draft())
            .unwrap();
        let mid = f.store.assignment(f.assignment_id).unwrap();
        assert_eq!(mid.images_completed, 1);
        assert_eq!(mid.progress_percentage, 50.0);
        assert_eq!(mid.status, AssignmentStatus::InProgress);

        Submission::submit(&f.store, &f.bus, f.assignment_id, f.image_ids[1], &f.annotator, draft())
            .unwrap();
        let done = f.store.assignment(f.assignment_id).unwrap();
        assert_eq!(done.images_completed, 2);
        assert_eq!(done.progress_percentage, 100.0);
        assert_eq!(done.status, AssignmentStatus::Submitted);
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn duplicate_submission_is_rejected() {
        let f = fixture(1);
        Submission::submit(&f.store, &f.bus, f.assignment_id, f.image_ids[0], &f.annotator, draft())
            .unwrap();
        let err = Submission::submit(
            &f.store,
            &f.bus,
            f.assignment_id,
            f.image_ids[0],
            &f.annotator,
            draft(),
        )
        .unwrap_err();
        assert_matches!(err, CoreError::DuplicateSubmission { image } if image == f.image_ids[0]);
        // The first annotation remains the sole pass for the image.
        assert_eq!(f.store.annotations_for_image(f.image_ids[0]).len(), 1);
    }

    #[test]
    fn wrong_annotator_is_forbidden() {
        let f = fixture(1);
        let stranger = UserRef::new(UserId::new_v4(), Role::Annotator, 5);
        let err = Submission::submit(
            &f.store,
            &f.bus,
            f.assignment_id,
            f.image_ids[0],
            &stranger,
            draft(),
        )
        .unwrap_err();
        assert_matches!(err, CoreError::Forbidden(_));
    }

    #[test]
    fn payload_is_validated_against_the_batch_schema() {
        let f = fixture(1);
        let mut bad = draft();
        bad.keypoints.points[0].label = "tail".to_string();
        let err = Submission::submit(
            &f.store,
            &f.bus,
            f.assignment_id,
            f.image_ids[0],
            &f.annotator,
            bad,
        )
        .unwrap_err();
        assert_matches!(err, CoreError::Validation(_));
        // Nothing was created and the image is untouched.
        assert!(f.store.annotations_for_image(f.image_ids[0]).is_empty());
        assert_eq!(
            f.store.image(f.image_ids[0]).unwrap().status,
            ImageStatus::Assigned
        );
    }
}
