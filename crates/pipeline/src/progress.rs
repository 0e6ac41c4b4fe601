//! Batch progress tracking and lifecycle management.
//!
//! The tracker is the only writer of batch counters and derived status. It
//! recomputes everything from the current child image states, so running it
//! twice, or after a partial failure, always lands on the same result.

use poseflow_core::assignment::AssignmentStatus;
use poseflow_core::batch_lifecycle::{derive_status, BatchStatus};
use poseflow_core::error::CoreError;
use poseflow_core::image_workflow::ImageStatus;
use poseflow_core::progress::BatchCounters;
use poseflow_core::types::DbId;
use poseflow_events::{NotificationBus, WorkflowEvent};
use poseflow_store::models::Batch;
use poseflow_store::EntityStore;

pub struct ProgressTracker;

impl ProgressTracker {
    /// Recompute counters and lifecycle position from child image states.
    ///
    /// Idempotent; called after every state-changing operation. Publishes a
    /// progress event, or a completed event on the transition into
    /// `completed`.
    pub fn recompute(
        store: &EntityStore,
        bus: &NotificationBus,
        batch_id: DbId,
    ) -> Result<Batch, CoreError> {
        let statuses = store.image_statuses_for_batch(batch_id)?;
        let counters = BatchCounters::from_statuses(&statuses);
        let batch = store.set_batch_counters(batch_id, counters)?;

        // Cancelled and archived batches keep their counters fresh but
        // never move again.
        if batch.status.is_terminal() {
            return Ok(batch);
        }

        let derived = derive_status(&statuses);
        let (batch, moved) = store.advance_batch(batch_id, derived)?;
        tracing::debug!(
            batch_id,
            status = batch.status.as_str(),
            completed = counters.completed,
            "batch progress recomputed"
        );

        if moved && batch.status == BatchStatus::Completed {
            tracing::info!(batch_id, "batch completed");
            bus.publish(WorkflowEvent::completed(batch_id, counters));
        } else {
            bus.publish(WorkflowEvent::progress(batch_id, counters));
        }
        Ok(batch)
    }

    /// Quality gate between detection and annotation.
    ///
    /// Fails while any detected image is flagged or scores below the
    /// batch's threshold.
    pub fn mark_ready(store: &EntityStore, batch_id: DbId) -> Result<Batch, CoreError> {
        let batch = store.batch(batch_id)?;
        if batch.status != BatchStatus::Detected {
            return Err(CoreError::InvalidTransition {
                entity: "batch",
                id: batch_id,
                from: batch.status.as_str(),
                to: BatchStatus::ReadyForAnnotation.as_str(),
            });
        }
        let gated = store
            .images_for_batch(batch_id)?
            .iter()
            .filter(|image| image.status == ImageStatus::Detected)
            .filter(|image| {
                image.has_quality_issues
                    || image
                        .quality_score
                        .is_some_and(|score| score < batch.quality_threshold)
            })
            .count();
        if gated > 0 {
            return Err(CoreError::ConstraintViolation(format!(
                "{gated} images fall below the quality gate of batch {batch_id}"
            )));
        }
        store.transition_batch(batch_id, BatchStatus::ReadyForAnnotation)
    }

    /// Cancel a batch. Irreversible: every non-terminal image and every
    /// active assignment is force-cancelled with it.
    pub fn cancel_batch(
        store: &EntityStore,
        bus: &NotificationBus,
        batch_id: DbId,
    ) -> Result<Batch, CoreError> {
        store.transition_batch(batch_id, BatchStatus::Cancelled)?;

        for image in store.images_for_batch(batch_id)? {
            if !image.status.is_terminal() {
                store.transition_image(image.id, ImageStatus::Cancelled)?;
                store.clear_image_assignment(image.id)?;
            }
        }
        for assignment in store.assignments_for_batch(batch_id) {
            if assignment.status.is_active() {
                store.transition_assignment(assignment.id, AssignmentStatus::Cancelled)?;
            }
        }

        let statuses = store.image_statuses_for_batch(batch_id)?;
        let counters = BatchCounters::from_statuses(&statuses);
        let batch = store.set_batch_counters(batch_id, counters)?;
        tracing::info!(batch_id, "batch cancelled");
        bus.publish(WorkflowEvent::progress(batch_id, counters));
        Ok(batch)
    }

    /// Archive a completed batch.
    pub fn archive_batch(store: &EntityStore, batch_id: DbId) -> Result<Batch, CoreError> {
        store.transition_batch(batch_id, BatchStatus::Archived)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use poseflow_core::assignment::{AssignmentStatus, AssignmentType};
    use poseflow_core::batch_lifecycle::BatchStatus;
    use poseflow_core::error::CoreError;
    use poseflow_core::identity::{Role, UserRef};
    use poseflow_core::image_workflow::ImageStatus;
    use poseflow_core::keypoints::{KeypointSchema, SchemaKeypoint};
    use poseflow_core::types::UserId;
    use poseflow_events::{EventKind, NotificationBus};
    use poseflow_store::models::{CreateBatch, CreateImage};
    use poseflow_store::EntityStore;

    use crate::scheduler::{AssignmentRequest, Scheduler};

    use super::ProgressTracker;

    fn seed(store: &EntityStore, total: u32) -> (i64, Vec<i64>) {
        let batch = store
            .create_batch(CreateBatch {
                name: "session".to_string(),
                description: None,
                schema: KeypointSchema::new(
                    "infant-pose",
                    "v2",
                    vec![SchemaKeypoint { label: "head".into(), required: true }],
                ),
                total_images: total,
                priority: None,
                quality_threshold: None,
                uploaded_by: UserId::new_v4(),
            })
            .unwrap();
        let images = (0..total)
            .map(|i| {
                store
                    .create_image(CreateImage {
                        batch_id: batch.id,
                        file_name: format!("{i}.png"),
                        storage_path: format!("x/{i}.png"),
                    })
                    .unwrap()
                    .id
            })
            .collect();
        (batch.id, images)
    }

    #[test]
    fn recompute_derives_counters_and_status() {
        let store = EntityStore::new();
        let bus = NotificationBus::default();
        let (batch_id, images) = seed(&store, 2);

        store.transition_image(images[0], ImageStatus::Detected).unwrap();
        let batch = ProgressTracker::recompute(&store, &bus, batch_id).unwrap();
        assert_eq!(batch.status, BatchStatus::Detecting);

        store.transition_image(images[1], ImageStatus::Detected).unwrap();
        let batch = ProgressTracker::recompute(&store, &bus, batch_id).unwrap();
        assert_eq!(batch.status, BatchStatus::Detected);
        assert_eq!(batch.counters.completed, 0);
    }

    #[test]
    fn recompute_is_idempotent() {
        let store = EntityStore::new();
        let bus = NotificationBus::default();
        let (batch_id, images) = seed(&store, 1);
        store.transition_image(images[0], ImageStatus::Detected).unwrap();

        let first = ProgressTracker::recompute(&store, &bus, batch_id).unwrap();
        let second = ProgressTracker::recompute(&store, &bus, batch_id).unwrap();
        assert_eq!(first.status, second.status);
        assert_eq!(first.counters, second.counters);
    }

    #[test]
    fn completion_publishes_a_completed_event() {
        let store = EntityStore::new();
        let bus = NotificationBus::default();
        let (batch_id, images) = seed(&store, 1);
        let mut events = bus.subscribe();

        // Walk the lone image to a terminal state by hand.
        for status in [
            ImageStatus::Detected,
            ImageStatus::Assigned,
            ImageStatus::InProgress,
            ImageStatus::Annotated,
            ImageStatus::Submitted,
            ImageStatus::UnderReview,
            ImageStatus::Approved,
        ] {
            store.transition_image(images[0], status).unwrap();
        }
        let batch = ProgressTracker::recompute(&store, &bus, batch_id).unwrap();
        assert_eq!(batch.status, BatchStatus::Completed);
        assert_eq!(batch.counters.approved, 1);
        assert_eq!(events.try_recv().unwrap().kind, EventKind::Completed);
    }

    #[test]
    fn quality_gate_blocks_flagged_images() {
        let store = EntityStore::new();
        let bus = NotificationBus::default();
        let (batch_id, images) = seed(&store, 1);
        store.transition_image(images[0], ImageStatus::Detected).unwrap();
        store.set_image_quality(images[0], Some(5.0), false, false).unwrap();
        ProgressTracker::recompute(&store, &bus, batch_id).unwrap();

        assert_matches!(
            ProgressTracker::mark_ready(&store, batch_id).unwrap_err(),
            CoreError::ConstraintViolation(_)
        );
        store.set_image_quality(images[0], Some(8.0), false, false).unwrap();
        let batch = ProgressTracker::mark_ready(&store, batch_id).unwrap();
        assert_eq!(batch.status, BatchStatus::ReadyForAnnotation);
    }

    #[test]
    fn quality_gate_requires_detection_to_be_done() {
        let store = EntityStore::new();
        let (batch_id, _) = seed(&store, 1);
        assert_matches!(
            ProgressTracker::mark_ready(&store, batch_id).unwrap_err(),
            CoreError::InvalidTransition { entity: "batch", .. }
        );
    }

    #[test]
    fn cancel_cascades_to_children() {
        let store = EntityStore::new();
        let bus = NotificationBus::default();
        let (batch_id, images) = seed(&store, 2);
        for &id in &images {
            store.transition_image(id, ImageStatus::Detected).unwrap();
        }
        let annotator = UserRef::new(UserId::new_v4(), Role::Annotator, 5);
        let admin = UserRef::new(UserId::new_v4(), Role::Admin, 10);
        let assignment = Scheduler::assign(
            &store,
            &bus,
            AssignmentRequest {
                image_ids: images.clone(),
                annotator,
                assigned_by: admin,
                assignment_type: AssignmentType::Initial,
                priority: None,
                due_date: None,
                special_instructions: None,
            },
        )
        .unwrap();

        let batch = ProgressTracker::cancel_batch(&store, &bus, batch_id).unwrap();
        assert_eq!(batch.status, BatchStatus::Cancelled);
        for &id in &images {
            let image = store.image(id).unwrap();
            assert_eq!(image.status, ImageStatus::Cancelled);
            assert!(image.current_assignment.is_none());
        }
        assert_eq!(
            store.assignment(assignment.id).unwrap().status,
            AssignmentStatus::Cancelled
        );
    }

    #[test]
    fn cancel_is_irreversible() {
        let store = EntityStore::new();
        let bus = NotificationBus::default();
        let (batch_id, images) = seed(&store, 1);
        ProgressTracker::cancel_batch(&store, &bus, batch_id).unwrap();

        assert_matches!(
            ProgressTracker::cancel_batch(&store, &bus, batch_id).unwrap_err(),
            CoreError::InvalidTransition { .. }
        );
        // Recompute still refreshes counters without reviving the batch.
        let batch = ProgressTracker::recompute(&store, &bus, batch_id).unwrap();
        assert_eq!(batch.status, BatchStatus::Cancelled);
        assert_eq!(store.image(images[0]).unwrap().status, ImageStatus::Cancelled);
    }

    #[test]
    fn archive_only_after_completion() {
        let store = EntityStore::new();
        let bus = NotificationBus::default();
        let (batch_id, images) = seed(&store, 1);
        assert!(ProgressTracker::archive_batch(&store, batch_id).is_err());

        for status in [
            ImageStatus::Detected,
            ImageStatus::Assigned,
            ImageStatus::InProgress,
            ImageStatus::Annotated,
            ImageStatus::Submitted,
            ImageStatus::UnderReview,
            ImageStatus::Rejected,
        ] {
            store.transition_image(images[0], status).unwrap();
        }
        ProgressTracker::recompute(&store, &bus, batch_id).unwrap();
        let batch = ProgressTracker::archive_batch(&store, batch_id).unwrap();
        assert_eq!(batch.status, BatchStatus::Archived);
    }
}
