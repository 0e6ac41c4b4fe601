//! Assignment operations.
//!
//! Creation is the critical section: capacity, image assignability, and the
//! one-active-assignment-per-image rule are all checked and applied inside a
//! single lock scope so concurrent assigners cannot double-book an image.

use chrono::Utc;

use poseflow_core::annotation::AnnotationStatus;
use poseflow_core::assignment::{
    self, check_capacity, progress_percentage, validate_priority, AssignmentStatus,
    PRIORITY_DEFAULT,
};
use poseflow_core::error::CoreError;
use poseflow_core::image_workflow::{self, ImageStatus};
use poseflow_core::types::{DbId, Timestamp, UserId};

use crate::models::{Assignment, CreateAssignment};

use super::EntityStore;

impl EntityStore {
    /// Create an assignment covering a group of images from one batch.
    pub fn create_assignment(&self, input: CreateAssignment) -> Result<Assignment, CoreError> {
        if input.image_ids.is_empty() {
            return Err(CoreError::Validation(
                "an assignment must cover at least one image".to_string(),
            ));
        }
        let priority = input.priority.unwrap_or(PRIORITY_DEFAULT);
        validate_priority(priority)?;
        {
            let mut seen = std::collections::HashSet::with_capacity(input.image_ids.len());
            for id in &input.image_ids {
                if !seen.insert(id) {
                    return Err(CoreError::Validation(format!(
                        "image {id} listed twice in the assignment"
                    )));
                }
            }
        }

        let mut inner = self.write();

        // Validate everything before mutating anything.
        let mut batch_id = None;
        for &image_id in &input.image_ids {
            let image = inner
                .images
                .get(&image_id)
                .ok_or(CoreError::NotFound { entity: "image", id: image_id })?;
            if !image.status.is_assignable() {
                return Err(CoreError::ImageNotAssignable {
                    image: image_id,
                    status: image.status.as_str(),
                });
            }
            if image.current_assignment.is_some() {
                return Err(CoreError::ConstraintViolation(format!(
                    "image {image_id} is already covered by an active assignment"
                )));
            }
            match batch_id {
                None => batch_id = Some(image.batch_id),
                Some(expected) if expected != image.batch_id => {
                    return Err(CoreError::ConstraintViolation(
                        "all images of an assignment must belong to one batch".to_string(),
                    ));
                }
                Some(_) => {}
            }
            image_workflow::validate_transition(image_id, image.status, ImageStatus::Assigned)?;
        }
        let batch_id = batch_id.ok_or_else(|| {
            CoreError::Validation("an assignment must cover at least one image".to_string())
        })?;

        let active = inner
            .assignments_by_annotator
            .get(&input.annotator.id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.assignments.get(id))
            .filter(|a| a.status.is_active())
            .count();
        check_capacity(&input.annotator, active)?;

        let id = inner.next_id();
        let assignment = Assignment {
            id,
            batch_id,
            image_ids: input.image_ids.clone(),
            annotator: input.annotator.id,
            assigned_by: input.assigned_by,
            assignment_type: input.assignment_type,
            status: AssignmentStatus::Assigned,
            priority,
            special_instructions: input.special_instructions,
            images_total: input.image_ids.len() as u32,
            images_completed: 0,
            progress_percentage: 0.0,
            due_date: input.due_date,
            assigned_at: Utc::now(),
            acknowledged_at: None,
            started_at: None,
            completed_at: None,
        };
        inner.assignments.insert(id, assignment.clone());
        inner
            .assignments_by_annotator
            .entry(input.annotator.id)
            .or_default()
            .insert(id);
        inner
            .assignments_by_batch
            .entry(batch_id)
            .or_default()
            .push(id);

        for &image_id in &input.image_ids {
            let from = inner.images.get_mut(&image_id).map(|image| {
                let from = image.status;
                image.status = ImageStatus::Assigned;
                image.current_annotator = Some(input.annotator.id);
                image.current_assignment = Some(id);
                image.last_status_change = Utc::now();
                from
            });
            if let Some(from) = from {
                inner.reindex_image_status(image_id, from, ImageStatus::Assigned);
            }
        }

        tracing::info!(
            assignment_id = id,
            batch_id,
            images = assignment.images_total,
            annotator = %input.annotator.id,
            "assignment created"
        );
        Ok(assignment)
    }

    /// Fetch an assignment by id.
    pub fn assignment(&self, id: DbId) -> Result<Assignment, CoreError> {
        self.read()
            .assignments
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound { entity: "assignment", id })
    }

    /// All assignments for a batch, in creation order.
    pub fn assignments_for_batch(&self, batch_id: DbId) -> Vec<Assignment> {
        let inner = self.read();
        inner
            .assignments_by_batch
            .get(&batch_id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.assignments.get(id))
            .cloned()
            .collect()
    }

    /// Number of active assignments an annotator currently holds.
    pub fn active_assignment_count(&self, annotator: UserId) -> usize {
        let inner = self.read();
        inner
            .assignments_by_annotator
            .get(&annotator)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.assignments.get(id))
            .filter(|a| a.status.is_active())
            .count()
    }

    /// Ready-work query: active assignments whose due date has passed.
    pub fn overdue_assignments(&self, now: Timestamp) -> Vec<Assignment> {
        let inner = self.read();
        let mut overdue: Vec<Assignment> = inner
            .assignments
            .values()
            .filter(|a| a.status.is_active() && assignment::is_overdue(a.due_date, now))
            .cloned()
            .collect();
        overdue.sort_by_key(|a| a.id);
        overdue
    }

    /// Move an assignment through its lifecycle, stamping timing fields.
    pub fn transition_assignment(
        &self,
        id: DbId,
        to: AssignmentStatus,
    ) -> Result<Assignment, CoreError> {
        let mut inner = self.write();
        let record = inner
            .assignments
            .get_mut(&id)
            .ok_or(CoreError::NotFound { entity: "assignment", id })?;
        assignment::validate_transition(id, record.status, to)?;
        record.status = to;
        let now = Utc::now();
        match to {
            AssignmentStatus::Acknowledged => record.acknowledged_at = Some(now),
            AssignmentStatus::InProgress => {
                if record.started_at.is_none() {
                    record.started_at = Some(now);
                }
            }
            AssignmentStatus::Submitted | AssignmentStatus::Cancelled => {
                record.completed_at = Some(now)
            }
            AssignmentStatus::Assigned => {}
        }
        Ok(record.clone())
    }

    /// Count of the assignment's images with a handed-over annotation.
    pub fn submitted_image_count(&self, id: DbId) -> Result<u32, CoreError> {
        let inner = self.read();
        let record = inner
            .assignments
            .get(&id)
            .ok_or(CoreError::NotFound { entity: "assignment", id })?;
        let count = record
            .image_ids
            .iter()
            .filter(|image_id| {
                inner
                    .annotations_by_image
                    .get(image_id)
                    .into_iter()
                    .flatten()
                    .filter_map(|annotation_id| inner.annotations.get(annotation_id))
                    .any(|a| {
                        a.assignment_id == id
                            && !matches!(
                                a.status,
                                AnnotationStatus::Draft | AnnotationStatus::Completed
                            )
                    })
            })
            .count();
        Ok(count as u32)
    }

    /// Write the recomputed progress snapshot.
    pub fn set_assignment_progress(
        &self,
        id: DbId,
        images_completed: u32,
    ) -> Result<Assignment, CoreError> {
        let mut inner = self.write();
        let record = inner
            .assignments
            .get_mut(&id)
            .ok_or(CoreError::NotFound { entity: "assignment", id })?;
        if images_completed > record.images_total {
            return Err(CoreError::ConstraintViolation(format!(
                "assignment {id} cannot complete {images_completed} of {} images",
                record.images_total
            )));
        }
        record.images_completed = images_completed;
        record.progress_percentage = progress_percentage(images_completed, record.images_total);
        Ok(record.clone())
    }

    /// Detach an image from its active assignment (verification settled it or
    /// sent it back to the pool).
    pub fn clear_image_assignment(&self, image_id: DbId) -> Result<(), CoreError> {
        let mut inner = self.write();
        let image = inner
            .images
            .get_mut(&image_id)
            .ok_or(CoreError::NotFound { entity: "image", id: image_id })?;
        image.current_assignment = None;
        image.current_annotator = None;
        Ok(())
    }
}
