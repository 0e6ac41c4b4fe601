//! Upload sessions: batch creation, image intake, batch deletion.

use poseflow_core::batch_lifecycle::BatchStatus;
use poseflow_core::error::CoreError;
use poseflow_core::types::DbId;
use poseflow_store::models::{Batch, CreateBatch, CreateImage, Image};
use poseflow_store::EntityStore;

use crate::storage::FileStorage;

pub struct UploadSession;

impl UploadSession {
    /// Open a new batch for uploads.
    pub fn create_batch(store: &EntityStore, input: CreateBatch) -> Result<Batch, CoreError> {
        let batch = store.create_batch(input)?;
        tracing::info!(batch_id = batch.id, total_images = batch.total_images, "batch opened");
        Ok(batch)
    }

    /// Store an image file and register it under its batch.
    ///
    /// Only batches that have not started detection accept images.
    pub async fn add_image(
        store: &EntityStore,
        storage: &dyn FileStorage,
        batch_id: DbId,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Image, CoreError> {
        if file_name.trim().is_empty() {
            return Err(CoreError::Validation(
                "image file name must not be empty".to_string(),
            ));
        }
        let batch = store.batch(batch_id)?;
        if batch.status != BatchStatus::Uploaded {
            return Err(CoreError::ConstraintViolation(format!(
                "batch {batch_id} no longer accepts uploads (status '{}')",
                batch.status.as_str()
            )));
        }

        let path = format!("batches/{batch_id}/{file_name}");
        let storage_path = storage
            .save(&path, bytes)
            .await
            .map_err(|e| CoreError::Internal(format!("storage save failed: {e}")))?;

        match store.create_image(CreateImage {
            batch_id,
            file_name: file_name.to_string(),
            storage_path: storage_path.clone(),
        }) {
            Ok(image) => Ok(image),
            Err(err) => {
                // Don't leave an orphaned file behind.
                if let Err(delete_err) = storage.delete(&storage_path).await {
                    tracing::warn!(%storage_path, error = %delete_err, "orphan cleanup failed");
                }
                Err(err)
            }
        }
    }

    /// Delete a batch, its entity graph, and its stored files.
    ///
    /// File deletion is best-effort: a storage hiccup leaves an orphaned
    /// file, never a half-deleted entity graph.
    pub async fn delete_batch(
        store: &EntityStore,
        storage: &dyn FileStorage,
        batch_id: DbId,
    ) -> Result<Batch, CoreError> {
        let (batch, images) = store.delete_batch(batch_id)?;
        for image in &images {
            if let Err(err) = storage.delete(&image.storage_path).await {
                tracing::warn!(
                    image_id = image.id,
                    storage_path = %image.storage_path,
                    error = %err,
                    "file cleanup failed"
                );
            }
        }
        Ok(batch)
    }
}
