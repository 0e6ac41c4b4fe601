//! Batch operations.

use chrono::Utc;

use poseflow_core::assignment::{validate_priority, PRIORITY_DEFAULT};
use poseflow_core::batch_lifecycle::{self, BatchStatus};
use poseflow_core::error::CoreError;
use poseflow_core::progress::BatchCounters;
use poseflow_core::thresholds::{validate_quality_score, DEFAULT_QUALITY_THRESHOLD};
use poseflow_core::types::{DbId, Timestamp};

use crate::models::{Batch, CreateBatch, Image};

use super::EntityStore;

impl EntityStore {
    /// Insert a new batch, returning the created record.
    pub fn create_batch(&self, input: CreateBatch) -> Result<Batch, CoreError> {
        if input.name.trim().is_empty() {
            return Err(CoreError::Validation(
                "batch name must not be empty".to_string(),
            ));
        }
        if input.total_images == 0 {
            return Err(CoreError::Validation(
                "a batch must declare at least one image".to_string(),
            ));
        }
        input.schema.validate()?;
        let priority = input.priority.unwrap_or(PRIORITY_DEFAULT);
        validate_priority(priority)?;
        let quality_threshold = input.quality_threshold.unwrap_or(DEFAULT_QUALITY_THRESHOLD);
        validate_quality_score(quality_threshold, "quality_threshold")?;

        let mut inner = self.write();
        let id = inner.next_id();
        let batch = Batch {
            id,
            name: input.name,
            description: input.description,
            schema: input.schema,
            total_images: input.total_images,
            status: BatchStatus::Uploaded,
            counters: BatchCounters::default(),
            priority,
            quality_threshold,
            second_opinion_required: false,
            detection_started_at: None,
            detection_completed_at: None,
            detector_version: None,
            avg_detection_confidence: None,
            uploaded_by: input.uploaded_by,
            uploaded_at: Utc::now(),
        };
        inner.batches.insert(id, batch.clone());
        inner.images_by_batch.insert(id, Vec::new());
        Ok(batch)
    }

    /// Fetch a batch by id.
    pub fn batch(&self, id: DbId) -> Result<Batch, CoreError> {
        self.read()
            .batches
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound { entity: "batch", id })
    }

    /// All batches in a given lifecycle status.
    pub fn batches_by_status(&self, status: BatchStatus) -> Vec<Batch> {
        let mut batches: Vec<Batch> = self
            .read()
            .batches
            .values()
            .filter(|b| b.status == status)
            .cloned()
            .collect();
        batches.sort_by_key(|b| b.id);
        batches
    }

    /// Explicit lifecycle transition (cancel, archive, detection kickoff).
    pub fn transition_batch(&self, id: DbId, to: BatchStatus) -> Result<Batch, CoreError> {
        let mut inner = self.write();
        let batch = inner
            .batches
            .get_mut(&id)
            .ok_or(CoreError::NotFound { entity: "batch", id })?;
        batch_lifecycle::validate_transition(id, batch.status, to)?;
        batch.status = to;
        Ok(batch.clone())
    }

    /// Forward-only advancement toward a derived lifecycle position.
    /// Returns the batch and whether the status actually moved.
    pub fn advance_batch(&self, id: DbId, derived: BatchStatus) -> Result<(Batch, bool), CoreError> {
        let mut inner = self.write();
        let batch = inner
            .batches
            .get_mut(&id)
            .ok_or(CoreError::NotFound { entity: "batch", id })?;
        let moved = batch.status.can_advance_to(derived);
        if moved {
            batch.status = derived;
        }
        Ok((batch.clone(), moved))
    }

    /// Overwrite the counter snapshot. Tracker-only write path.
    pub fn set_batch_counters(&self, id: DbId, counters: BatchCounters) -> Result<Batch, CoreError> {
        let mut inner = self.write();
        let batch = inner
            .batches
            .get_mut(&id)
            .ok_or(CoreError::NotFound { entity: "batch", id })?;
        batch.counters = counters;
        Ok(batch.clone())
    }

    /// Record the start of a detection pass.
    pub fn mark_detection_started(
        &self,
        id: DbId,
        started_at: Timestamp,
        detector_version: &str,
    ) -> Result<(), CoreError> {
        let mut inner = self.write();
        let batch = inner
            .batches
            .get_mut(&id)
            .ok_or(CoreError::NotFound { entity: "batch", id })?;
        batch.detection_started_at = Some(started_at);
        batch.detector_version = Some(detector_version.to_string());
        Ok(())
    }

    /// Record the end of a detection pass and the mean confidence across the
    /// batch's processed images.
    pub fn mark_detection_completed(
        &self,
        id: DbId,
        completed_at: Timestamp,
        avg_confidence: Option<f64>,
    ) -> Result<(), CoreError> {
        let mut inner = self.write();
        let batch = inner
            .batches
            .get_mut(&id)
            .ok_or(CoreError::NotFound { entity: "batch", id })?;
        batch.detection_completed_at = Some(completed_at);
        batch.avg_detection_confidence = avg_confidence;
        Ok(())
    }

    /// Flag the batch for a mandatory follow-up verification.
    pub fn mark_second_opinion_required(&self, id: DbId) -> Result<(), CoreError> {
        let mut inner = self.write();
        let batch = inner
            .batches
            .get_mut(&id)
            .ok_or(CoreError::NotFound { entity: "batch", id })?;
        batch.second_opinion_required = true;
        Ok(())
    }

    /// Delete a batch and everything it owns. Returns the removed batch and
    /// its images so the caller can release stored files.
    pub fn delete_batch(&self, id: DbId) -> Result<(Batch, Vec<Image>), CoreError> {
        let mut inner = self.write();
        let batch = inner
            .batches
            .remove(&id)
            .ok_or(CoreError::NotFound { entity: "batch", id })?;

        let image_ids = inner.images_by_batch.remove(&id).unwrap_or_default();
        let mut removed_images = Vec::with_capacity(image_ids.len());
        for image_id in image_ids {
            if let Some(image) = inner.images.remove(&image_id) {
                if let Some(ids) = inner.images_by_status.get_mut(&image.status) {
                    ids.remove(&image_id);
                }
                for annotation_id in inner
                    .annotations_by_image
                    .remove(&image_id)
                    .unwrap_or_default()
                {
                    inner.annotations.remove(&annotation_id);
                    if let Some(verification_id) =
                        inner.verification_by_annotation.remove(&annotation_id)
                    {
                        inner.verifications.remove(&verification_id);
                    }
                }
                removed_images.push(image);
            }
        }

        for assignment_id in inner.assignments_by_batch.remove(&id).unwrap_or_default() {
            if let Some(assignment) = inner.assignments.remove(&assignment_id) {
                if let Some(ids) = inner.assignments_by_annotator.get_mut(&assignment.annotator) {
                    ids.remove(&assignment_id);
                }
            }
        }

        tracing::info!(batch_id = id, images = removed_images.len(), "batch deleted");
        Ok((batch, removed_images))
    }
}
