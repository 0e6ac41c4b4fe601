//! Detection-result ingestion.
//!
//! Each image is processed independently: detect with bounded retries,
//! normalize against the batch schema, and apply the result in one store
//! call. A failing image ends up in `detection_failed` without touching its
//! siblings, and the whole pass is safe to re-run.

use std::sync::Arc;

use tokio::sync::Semaphore;

use poseflow_core::batch_lifecycle::BatchStatus;
use poseflow_core::error::CoreError;
use poseflow_core::image_workflow::ImageStatus;
use poseflow_core::keypoints::{has_sufficient_keypoints, normalize_detections};
use poseflow_core::retry::RetryPolicy;
use poseflow_core::types::DbId;
use poseflow_events::{NotificationBus, WorkflowEvent};
use poseflow_store::models::image::DetectionResult;
use poseflow_store::models::Image;
use poseflow_store::EntityStore;

use crate::detector::Detector;
use crate::progress::ProgressTracker;

/// How many images are detected concurrently during a batch pass.
pub const DEFAULT_DETECTION_CONCURRENCY: usize = 4;

/// One unit of detection work. The uploader hands the bytes through; the
/// workflow never reads file content back out of storage.
#[derive(Debug, Clone)]
pub struct DetectionJob {
    pub image_id: DbId,
    pub image_bytes: Vec<u8>,
}

/// Outcome summary of a batch detection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub processed: usize,
    pub failed: usize,
}

pub struct Ingestor;

impl Ingestor {
    /// Detect and ingest a single image, retrying transient model failures
    /// up to the policy bound.
    ///
    /// On exhaustion the image is parked in `detection_failed`, an error
    /// event is published, and the last failure is returned.
    pub async fn ingest_image(
        store: &EntityStore,
        detector: &dyn Detector,
        bus: &NotificationBus,
        policy: &RetryPolicy,
        job: &DetectionJob,
    ) -> Result<Image, CoreError> {
        let image = store.image(job.image_id)?;
        let schema = store.batch(image.batch_id)?.schema;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let failure = match detector.detect(&job.image_bytes).await {
                Ok(raw) => match normalize_detections(&schema, &raw) {
                    Ok(keypoints) => {
                        let has_quality_issues = !has_sufficient_keypoints(&schema, &keypoints);
                        return store.record_detection_success(
                            job.image_id,
                            DetectionResult {
                                detections: raw,
                                keypoints,
                                detector_version: detector.version().to_string(),
                                attempts: attempt,
                                has_quality_issues,
                            },
                        );
                    }
                    // Malformed output is not transient; don't burn retries.
                    Err(err) => {
                        let message = err.to_string();
                        store.record_detection_failure(job.image_id, attempt, &message)?;
                        Self::publish_failure(bus, image.batch_id, job.image_id, &message);
                        return Err(err);
                    }
                },
                Err(failure) => failure,
            };

            if policy.is_exhausted(attempt) {
                let message = failure.to_string();
                tracing::warn!(
                    image_id = job.image_id,
                    attempts = attempt,
                    error = %message,
                    "detection exhausted its retries"
                );
                store.record_detection_failure(job.image_id, attempt, &message)?;
                Self::publish_failure(bus, image.batch_id, job.image_id, &message);
                return Err(CoreError::Detection(message));
            }

            let delay = policy.delay_for(attempt);
            tracing::debug!(
                image_id = job.image_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "detection attempt failed, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Run a detection pass over a batch with bounded concurrency.
    ///
    /// Per-image failures are recorded and counted, never propagated: one
    /// bad image must not sink its siblings.
    pub async fn ingest_batch(
        store: &EntityStore,
        detector: &dyn Detector,
        bus: &NotificationBus,
        policy: &RetryPolicy,
        batch_id: DbId,
        jobs: Vec<DetectionJob>,
        max_concurrent: usize,
    ) -> Result<IngestReport, CoreError> {
        store.batch(batch_id)?;
        store.advance_batch(batch_id, BatchStatus::Detecting)?;
        store.mark_detection_started(batch_id, chrono::Utc::now(), detector.version())?;

        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let outcomes = futures::future::join_all(jobs.iter().map(|job| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                // Acquire only fails if the semaphore is closed, which we
                // never do; fall through unthrottled in that case.
                let _permit = semaphore.acquire().await.ok();
                Self::ingest_image(store, detector, bus, policy, job).await
            }
        }))
        .await;

        let processed = outcomes.iter().filter(|r| r.is_ok()).count();
        let failed = outcomes.len() - processed;

        let avg_confidence = Self::batch_avg_confidence(store, batch_id)?;
        store.mark_detection_completed(batch_id, chrono::Utc::now(), avg_confidence)?;
        ProgressTracker::recompute(store, bus, batch_id)?;

        tracing::info!(batch_id, processed, failed, "detection pass finished");
        Ok(IngestReport { processed, failed })
    }

    /// Re-queue a batch's failed images for another detection pass.
    /// Returns the reset images; the caller supplies fresh jobs for them.
    pub fn retry_failed(store: &EntityStore, batch_id: DbId) -> Result<Vec<Image>, CoreError> {
        let failed: Vec<DbId> = store
            .images_for_batch(batch_id)?
            .into_iter()
            .filter(|image| image.status == ImageStatus::DetectionFailed)
            .map(|image| image.id)
            .collect();
        let mut reset = Vec::with_capacity(failed.len());
        for image_id in failed {
            reset.push(store.reset_detection(image_id)?);
        }
        tracing::info!(batch_id, images = reset.len(), "failed detections re-queued");
        Ok(reset)
    }

    fn publish_failure(bus: &NotificationBus, batch_id: DbId, image_id: DbId, message: &str) {
        bus.publish(WorkflowEvent::error(
            batch_id,
            serde_json::json!({ "image_id": image_id, "error": message }),
        ));
    }

    fn batch_avg_confidence(store: &EntityStore, batch_id: DbId) -> Result<Option<f64>, CoreError> {
        let confidences: Vec<f64> = store
            .images_for_batch(batch_id)?
            .iter()
            .filter_map(|image| image.keypoints.as_ref())
            .filter_map(|set| set.avg_confidence())
            .collect();
        if confidences.is_empty() {
            return Ok(None);
        }
        Ok(Some(confidences.iter().sum::<f64>() / confidences.len() as f64))
    }
}
