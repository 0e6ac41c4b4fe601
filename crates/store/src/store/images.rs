//! Image operations, including the status-precondition transition that
//! resolves racing writers.

use chrono::Utc;

use poseflow_core::error::CoreError;
use poseflow_core::image_workflow::{self, ImageStatus};
use poseflow_core::thresholds::validate_quality_score;
use poseflow_core::types::{DbId, UserId};

use crate::models::image::DetectionResult;
use crate::models::{CreateImage, Image};

use super::EntityStore;

impl EntityStore {
    /// Insert a new image under its batch.
    ///
    /// Fails once the batch's declared `total_images` is reached.
    pub fn create_image(&self, input: CreateImage) -> Result<Image, CoreError> {
        let mut inner = self.write();
        let batch_id = input.batch_id;
        let batch = inner
            .batches
            .get(&batch_id)
            .ok_or(CoreError::NotFound { entity: "batch", id: batch_id })?;
        let declared = batch.total_images as usize;
        let existing = inner
            .images_by_batch
            .get(&batch_id)
            .map_or(0, |ids| ids.len());
        if existing >= declared {
            return Err(CoreError::ConstraintViolation(format!(
                "batch {batch_id} already holds its declared {declared} images"
            )));
        }

        let id = inner.next_id();
        let now = Utc::now();
        let image = Image {
            id,
            batch_id,
            file_name: input.file_name,
            storage_path: input.storage_path,
            status: ImageStatus::Uploaded,
            detections: None,
            keypoints: None,
            detection_attempts: 0,
            last_detection_error: None,
            detector_version: None,
            current_annotator: None,
            current_verifier: None,
            current_assignment: None,
            quality_score: None,
            has_quality_issues: false,
            is_difficult_case: false,
            requires_specialist_review: false,
            created_at: now,
            last_status_change: now,
        };
        inner.images.insert(id, image.clone());
        inner
            .images_by_batch
            .entry(batch_id)
            .or_default()
            .push(id);
        inner
            .images_by_status
            .entry(ImageStatus::Uploaded)
            .or_default()
            .insert(id);
        Ok(image)
    }

    /// Fetch an image by id.
    pub fn image(&self, id: DbId) -> Result<Image, CoreError> {
        self.read()
            .images
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound { entity: "image", id })
    }

    /// All images of a batch, in creation order.
    pub fn images_for_batch(&self, batch_id: DbId) -> Result<Vec<Image>, CoreError> {
        let inner = self.read();
        if !inner.batches.contains_key(&batch_id) {
            return Err(CoreError::NotFound { entity: "batch", id: batch_id });
        }
        let ids = inner.images_by_batch.get(&batch_id);
        Ok(ids
            .into_iter()
            .flatten()
            .filter_map(|id| inner.images.get(id))
            .cloned()
            .collect())
    }

    /// Current statuses of a batch's images, in creation order.
    pub fn image_statuses_for_batch(&self, batch_id: DbId) -> Result<Vec<ImageStatus>, CoreError> {
        let inner = self.read();
        if !inner.batches.contains_key(&batch_id) {
            return Err(CoreError::NotFound { entity: "batch", id: batch_id });
        }
        let ids = inner.images_by_batch.get(&batch_id);
        Ok(ids
            .into_iter()
            .flatten()
            .filter_map(|id| inner.images.get(id))
            .map(|image| image.status)
            .collect())
    }

    /// Ready-work query: all images currently in `status`.
    pub fn images_by_status(&self, status: ImageStatus) -> Vec<Image> {
        let inner = self.read();
        let mut images: Vec<Image> = inner
            .images_by_status
            .get(&status)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.images.get(id))
            .cloned()
            .collect();
        images.sort_by_key(|image| image.id);
        images
    }

    /// Move an image to `to`, validating against the *current* stored status.
    ///
    /// This is the optimistic precondition every workflow step rides on: a
    /// racing writer that lost sees its transition rejected and the state
    /// unchanged.
    pub fn transition_image(&self, id: DbId, to: ImageStatus) -> Result<Image, CoreError> {
        let mut inner = self.write();
        let image = inner
            .images
            .get_mut(&id)
            .ok_or(CoreError::NotFound { entity: "image", id })?;
        let current = image.status;
        image_workflow::validate_transition(id, current, to)?;
        image.status = to;
        image.last_status_change = Utc::now();
        let snapshot = image.clone();
        inner.reindex_image_status(id, current, to);
        Ok(snapshot)
    }

    /// Apply a successful detection pass: payloads, bookkeeping, and the
    /// `uploaded -> detected` transition in one call.
    pub fn record_detection_success(
        &self,
        id: DbId,
        result: DetectionResult,
    ) -> Result<Image, CoreError> {
        let mut inner = self.write();
        let image = inner
            .images
            .get_mut(&id)
            .ok_or(CoreError::NotFound { entity: "image", id })?;
        let current = image.status;
        image_workflow::validate_transition(id, current, ImageStatus::Detected)?;
        image.status = ImageStatus::Detected;
        image.detections = Some(result.detections);
        image.keypoints = Some(result.keypoints);
        image.detector_version = Some(result.detector_version);
        image.detection_attempts = result.attempts;
        image.has_quality_issues = result.has_quality_issues;
        image.last_detection_error = None;
        image.last_status_change = Utc::now();
        let snapshot = image.clone();
        inner.reindex_image_status(id, current, ImageStatus::Detected);
        Ok(snapshot)
    }

    /// Record an exhausted detection: error, attempt count, and the
    /// `uploaded -> detection_failed` transition in one call.
    pub fn record_detection_failure(
        &self,
        id: DbId,
        attempts: u32,
        error: &str,
    ) -> Result<Image, CoreError> {
        let mut inner = self.write();
        let image = inner
            .images
            .get_mut(&id)
            .ok_or(CoreError::NotFound { entity: "image", id })?;
        let current = image.status;
        image_workflow::validate_transition(id, current, ImageStatus::DetectionFailed)?;
        image.status = ImageStatus::DetectionFailed;
        image.detection_attempts = attempts;
        image.last_detection_error = Some(error.to_string());
        image.last_status_change = Utc::now();
        let snapshot = image.clone();
        inner.reindex_image_status(id, current, ImageStatus::DetectionFailed);
        Ok(snapshot)
    }

    /// Explicit retry: put a failed image back in the detection queue.
    pub fn reset_detection(&self, id: DbId) -> Result<Image, CoreError> {
        let mut inner = self.write();
        let image = inner
            .images
            .get_mut(&id)
            .ok_or(CoreError::NotFound { entity: "image", id })?;
        let current = image.status;
        image_workflow::validate_transition(id, current, ImageStatus::Uploaded)?;
        image.status = ImageStatus::Uploaded;
        image.detection_attempts = 0;
        image.last_detection_error = None;
        image.last_status_change = Utc::now();
        let snapshot = image.clone();
        inner.reindex_image_status(id, current, ImageStatus::Uploaded);
        Ok(snapshot)
    }

    /// Set reviewer-facing quality fields.
    pub fn set_image_quality(
        &self,
        id: DbId,
        quality_score: Option<f64>,
        is_difficult_case: bool,
        requires_specialist_review: bool,
    ) -> Result<Image, CoreError> {
        if let Some(score) = quality_score {
            validate_quality_score(score, "quality_score")?;
        }
        let mut inner = self.write();
        let image = inner
            .images
            .get_mut(&id)
            .ok_or(CoreError::NotFound { entity: "image", id })?;
        image.quality_score = quality_score;
        image.is_difficult_case = is_difficult_case;
        image.requires_specialist_review = requires_specialist_review;
        Ok(image.clone())
    }

    /// Record the verifier currently judging an image.
    pub fn set_current_verifier(
        &self,
        id: DbId,
        verifier: Option<UserId>,
    ) -> Result<(), CoreError> {
        let mut inner = self.write();
        let image = inner
            .images
            .get_mut(&id)
            .ok_or(CoreError::NotFound { entity: "image", id })?;
        image.current_verifier = verifier;
        Ok(())
    }
}
