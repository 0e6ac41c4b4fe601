//! Assignment scheduling.

use std::collections::HashMap;

use poseflow_core::assignment::{AssignmentStatus, AssignmentType, PRIORITY_DEFAULT};
use poseflow_core::error::CoreError;
use poseflow_core::identity::{self, UserRef};
use poseflow_core::image_workflow::ImageStatus;
use poseflow_core::types::{DbId, Timestamp};
use poseflow_events::NotificationBus;
use poseflow_store::models::{Assignment, CreateAssignment, Image};
use poseflow_store::EntityStore;

use crate::progress::ProgressTracker;

/// Parameters for [`Scheduler::assign`].
#[derive(Debug, Clone)]
pub struct AssignmentRequest {
    pub image_ids: Vec<DbId>,
    pub annotator: UserRef,
    pub assigned_by: UserRef,
    pub assignment_type: AssignmentType,
    pub priority: Option<i32>,
    pub due_date: Option<Timestamp>,
    pub special_instructions: Option<String>,
}

pub struct Scheduler;

impl Scheduler {
    /// Hand a group of ready images to an annotator.
    ///
    /// Role policy runs here; capacity, assignability, and exclusivity are
    /// enforced atomically by the store.
    pub fn assign(
        store: &EntityStore,
        bus: &NotificationBus,
        request: AssignmentRequest,
    ) -> Result<Assignment, CoreError> {
        identity::require(
            request.assigned_by.can_assign(),
            "create assignments",
            &request.assigned_by,
        )?;
        identity::require(
            request.annotator.can_annotate(),
            "annotate images",
            &request.annotator,
        )?;

        let assignment = store.create_assignment(CreateAssignment {
            image_ids: request.image_ids,
            annotator: request.annotator,
            assigned_by: request.assigned_by.id,
            assignment_type: request.assignment_type,
            priority: request.priority,
            due_date: request.due_date,
            special_instructions: request.special_instructions,
        })?;

        ProgressTracker::recompute(store, bus, assignment.batch_id)?;
        Ok(assignment)
    }

    /// The annotator confirms they have seen the assignment.
    pub fn acknowledge(store: &EntityStore, assignment_id: DbId) -> Result<Assignment, CoreError> {
        store.transition_assignment(assignment_id, AssignmentStatus::Acknowledged)
    }

    /// The annotator opens an image to work on it.
    ///
    /// Moves the image to `in_progress` and pulls the covering assignment
    /// along on first activity.
    pub fn start_image(store: &EntityStore, image_id: DbId) -> Result<Image, CoreError> {
        let image = store.image(image_id)?;
        let assignment_id = image.current_assignment.ok_or_else(|| {
            CoreError::ConstraintViolation(format!(
                "image {image_id} is not covered by an active assignment"
            ))
        })?;

        let image = store.transition_image(image_id, ImageStatus::InProgress)?;
        let assignment = store.assignment(assignment_id)?;
        if matches!(
            assignment.status,
            AssignmentStatus::Assigned | AssignmentStatus::Acknowledged
        ) {
            store.transition_assignment(assignment_id, AssignmentStatus::InProgress)?;
        }
        Ok(image)
    }

    /// Ready-work pool: freshly detected images plus revision re-entries,
    /// most urgent batch first.
    pub fn ready_images(store: &EntityStore) -> Vec<Image> {
        let mut ready = store.images_by_status(ImageStatus::Detected);
        ready.extend(store.images_by_status(ImageStatus::RequiresRevision));

        let mut priorities: HashMap<DbId, i32> = HashMap::new();
        for image in &ready {
            if !priorities.contains_key(&image.batch_id) {
                if let Ok(batch) = store.batch(image.batch_id) {
                    priorities.insert(image.batch_id, batch.priority);
                }
            }
        }
        ready.sort_by(|a, b| {
            let pa = priorities.get(&a.batch_id).copied().unwrap_or(PRIORITY_DEFAULT);
            let pb = priorities.get(&b.batch_id).copied().unwrap_or(PRIORITY_DEFAULT);
            pb.cmp(&pa).then(a.id.cmp(&b.id))
        });
        ready
    }

    /// Active assignments whose due date has passed. Pure query.
    pub fn overdue(store: &EntityStore, now: Timestamp) -> Vec<Assignment> {
        store.overdue_assignments(now)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use poseflow_core::assignment::{AssignmentStatus, AssignmentType};
    use poseflow_core::error::CoreError;
    use poseflow_core::identity::{Role, UserRef};
    use poseflow_core::image_workflow::ImageStatus;
    use poseflow_core::keypoints::{KeypointSchema, SchemaKeypoint};
    use poseflow_core::types::UserId;
    use poseflow_events::NotificationBus;
    use poseflow_store::models::{CreateBatch, CreateImage};
    use poseflow_store::EntityStore;

    use super::{AssignmentRequest, Scheduler};

    fn admin() -> UserRef {
        UserRef::new(UserId::new_v4(), Role::Admin, 10)
    }

    fn annotator() -> UserRef {
        UserRef::new(UserId::new_v4(), Role::Annotator, 2)
    }

    fn seed_detected(store: &EntityStore, count: u32) -> Vec<i64> {
        seed_detected_with_priority(store, count, None)
    }

    fn seed_detected_with_priority(
        store: &EntityStore,
        count: u32,
        priority: Option<i32>,
    ) -> Vec<i64> {
        let batch = store
            .create_batch(CreateBatch {
                name: "session".to_string(),
                description: None,
                schema: KeypointSchema::new(
                    "infant-pose",
                    "v2",
                    vec![SchemaKeypoint { label: "head".into(), required: true }],
                ),
                total_images: count,
                priority,
                quality_threshold: None,
                uploaded_by: UserId::new_v4(),
            })
            .unwrap();
        (0..count)
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
            .collect()
    }

    fn request(image_ids: Vec<i64>, annotator: UserRef, assigned_by: UserRef) -> AssignmentRequest {
        AssignmentRequest {
            image_ids,
            annotator,
            assigned_by,
            assignment_type: AssignmentType::Initial,
            priority: None,
            due_date: None,
            special_instructions: None,
        }
    }

    #[test]
    fn assign_requires_admin_assigner() {
        let store = EntityStore::new();
        let bus = NotificationBus::default();
        let images = seed_detected(&store, 1);
        let err = Scheduler::assign(
            &store,
            &bus,
            request(images, annotator(), annotator()),
        )
        .unwrap_err();
        assert_matches!(err, CoreError::Forbidden(_));
    }

    #[test]
    fn assign_requires_annotator_role() {
        let store = EntityStore::new();
        let bus = NotificationBus::default();
        let images = seed_detected(&store, 1);
        let verifier = UserRef::new(UserId::new_v4(), Role::Verifier, 2);
        let err = Scheduler::assign(&store, &bus, request(images, verifier, admin())).unwrap_err();
        assert_matches!(err, CoreError::Forbidden(_));
    }

    #[test]
    fn assign_then_start_image() {
        let store = EntityStore::new();
        let bus = NotificationBus::default();
        let images = seed_detected(&store, 2);
        let assignment =
            Scheduler::assign(&store, &bus, request(images.clone(), annotator(), admin())).unwrap();

        let image = Scheduler::start_image(&store, images[0]).unwrap();
        assert_eq!(image.status, ImageStatus::InProgress);
        let assignment = store.assignment(assignment.id).unwrap();
        assert_eq!(assignment.status, AssignmentStatus::InProgress);
        assert!(assignment.started_at.is_some());
    }

    #[test]
    fn acknowledge_then_start_keeps_timestamps() {
        let store = EntityStore::new();
        let bus = NotificationBus::default();
        let images = seed_detected(&store, 1);
        let assignment =
            Scheduler::assign(&store, &bus, request(images.clone(), annotator(), admin())).unwrap();

        let acked = Scheduler::acknowledge(&store, assignment.id).unwrap();
        assert!(acked.acknowledged_at.is_some());
        Scheduler::start_image(&store, images[0]).unwrap();
        let assignment = store.assignment(assignment.id).unwrap();
        assert_eq!(assignment.status, AssignmentStatus::InProgress);
    }

    #[test]
    fn unassigned_image_cannot_start() {
        let store = EntityStore::new();
        let images = seed_detected(&store, 1);
        assert_matches!(
            Scheduler::start_image(&store, images[0]).unwrap_err(),
            CoreError::ConstraintViolation(_)
        );
    }

    #[test]
    fn overdue_listing_flags_past_due_assignments() {
        let store = EntityStore::new();
        let bus = NotificationBus::default();
        let images = seed_detected(&store, 1);
        let now = chrono::Utc::now();
        let mut req = request(images, annotator(), admin());
        req.due_date = Some(now - chrono::Duration::hours(3));
        let assignment = Scheduler::assign(&store, &bus, req).unwrap();

        let overdue = Scheduler::overdue(&store, now);
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id, assignment.id);
        assert!(Scheduler::overdue(&store, now - chrono::Duration::hours(4)).is_empty());
    }

    #[test]
    fn ready_pool_orders_urgent_batches_first() {
        let store = EntityStore::new();
        let normal = seed_detected_with_priority(&store, 1, Some(5));
        let urgent = seed_detected_with_priority(&store, 1, Some(9));

        let ready = Scheduler::ready_images(&store);
        assert_eq!(ready.len(), 2);
        assert_eq!(ready[0].id, urgent[0]);
        assert_eq!(ready[1].id, normal[0]);
    }

    #[test]
    fn ready_pool_contains_detected_images() {
        let store = EntityStore::new();
        let bus = NotificationBus::default();
        let images = seed_detected(&store, 3);
        assert_eq!(Scheduler::ready_images(&store).len(), 3);

        Scheduler::assign(
            &store,
            &bus,
            request(vec![images[0]], annotator(), admin()),
        )
        .unwrap();
        assert_eq!(Scheduler::ready_images(&store).len(), 2);
    }
}
