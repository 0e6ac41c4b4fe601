//! Annotation operations and the revision chain.
//!
//! Creation enforces the single-active-annotation rule inside one lock
//! scope: the second of two racing submissions for the same image sees the
//! first one's record and is rejected with `DuplicateSubmission`.

use chrono::Utc;

use poseflow_core::annotation::{self, next_version, AnnotationStatus};
use poseflow_core::error::CoreError;
use poseflow_core::types::DbId;

use crate::models::{Annotation, CreateAnnotation};

use super::EntityStore;

impl EntityStore {
    /// Insert a new annotation for an image, versioned into its chain.
    pub fn create_annotation(&self, input: CreateAnnotation) -> Result<Annotation, CoreError> {
        if let Some(score) = input.self_assessment {
            annotation::validate_self_assessment(score)?;
        }

        let mut inner = self.write();
        let image_id = input.image_id;
        let assignment_id = input.assignment_id;
        if !inner.images.contains_key(&image_id) {
            return Err(CoreError::NotFound { entity: "image", id: image_id });
        }
        let assignment = inner
            .assignments
            .get(&assignment_id)
            .ok_or(CoreError::NotFound { entity: "assignment", id: assignment_id })?;

        // The duplicate guard outranks the assignment-state checks: a second
        // submission for a busy image is always a duplicate, even when the
        // first one already closed out its assignment.
        let chain: Vec<&Annotation> = inner
            .annotations_by_image
            .get(&image_id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.annotations.get(id))
            .collect();
        if chain.iter().any(|a| a.status.is_active()) {
            return Err(CoreError::DuplicateSubmission { image: image_id });
        }

        if !assignment.status.is_active() {
            return Err(CoreError::ConstraintViolation(format!(
                "assignment {assignment_id} is no longer active"
            )));
        }
        if !assignment.image_ids.contains(&image_id) {
            return Err(CoreError::ConstraintViolation(format!(
                "image {image_id} is not covered by assignment {assignment_id}"
            )));
        }
        let prior_max = chain.iter().map(|a| a.version).max();
        let version = next_version(prior_max);
        // Every revision points at the version-1 root, not its predecessor.
        let original_annotation = chain
            .iter()
            .find(|a| a.version == 1)
            .map(|a| a.id);

        let id = inner.next_id();
        let record = Annotation {
            id,
            image_id,
            assignment_id,
            keypoints: input.keypoints,
            self_assessment: input.self_assessment,
            difficulty: input.difficulty,
            notes: input.notes,
            time_spent_seconds: input.time_spent_seconds,
            version,
            is_revision: version > 1,
            original_annotation,
            revision_reason: input.revision_reason,
            status: AnnotationStatus::Draft,
            created_at: Utc::now(),
            submitted_at: None,
        };
        inner.annotations.insert(id, record.clone());
        inner
            .annotations_by_image
            .entry(image_id)
            .or_default()
            .push(id);
        Ok(record)
    }

    /// Fetch an annotation by id.
    pub fn annotation(&self, id: DbId) -> Result<Annotation, CoreError> {
        self.read()
            .annotations
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound { entity: "annotation", id })
    }

    /// Full revision chain for an image, oldest first.
    pub fn annotations_for_image(&self, image_id: DbId) -> Vec<Annotation> {
        let inner = self.read();
        inner
            .annotations_by_image
            .get(&image_id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.annotations.get(id))
            .cloned()
            .collect()
    }

    /// The image's one non-terminal annotation, if any.
    pub fn active_annotation_for_image(&self, image_id: DbId) -> Option<Annotation> {
        let inner = self.read();
        inner
            .annotations_by_image
            .get(&image_id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.annotations.get(id))
            .find(|a| a.status.is_active())
            .cloned()
    }

    /// Move an annotation through its lifecycle, stamping `submitted_at`.
    pub fn transition_annotation(
        &self,
        id: DbId,
        to: AnnotationStatus,
    ) -> Result<Annotation, CoreError> {
        let mut inner = self.write();
        let record = inner
            .annotations
            .get_mut(&id)
            .ok_or(CoreError::NotFound { entity: "annotation", id })?;
        annotation::validate_transition(id, record.status, to)?;
        record.status = to;
        if to == AnnotationStatus::Submitted {
            record.submitted_at = Some(Utc::now());
        }
        Ok(record.clone())
    }
}
