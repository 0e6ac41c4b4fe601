//! The arena-backed entity store.
//!
//! One `RwLock` guards the whole entity graph; every public method is a
//! single lock scope and therefore one short transactional unit. Reverse
//! lookups go through explicit indexes instead of back-references.

mod annotations;
mod assignments;
mod batches;
mod images;
mod verifications;

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use poseflow_core::image_workflow::ImageStatus;
use poseflow_core::types::{DbId, UserId};

use crate::models::{Annotation, Assignment, Batch, Image, Verification};

#[derive(Default)]
pub(crate) struct StoreInner {
    next_id: DbId,

    pub(crate) batches: HashMap<DbId, Batch>,
    pub(crate) images: HashMap<DbId, Image>,
    pub(crate) assignments: HashMap<DbId, Assignment>,
    pub(crate) annotations: HashMap<DbId, Annotation>,
    pub(crate) verifications: HashMap<DbId, Verification>,

    // Indexes
    pub(crate) images_by_batch: HashMap<DbId, Vec<DbId>>,
    pub(crate) images_by_status: HashMap<ImageStatus, HashSet<DbId>>,
    pub(crate) assignments_by_annotator: HashMap<UserId, HashSet<DbId>>,
    pub(crate) assignments_by_batch: HashMap<DbId, Vec<DbId>>,
    pub(crate) annotations_by_image: HashMap<DbId, Vec<DbId>>,
    pub(crate) verification_by_annotation: HashMap<DbId, DbId>,
}

impl StoreInner {
    /// Ids are one sequence across all entity kinds.
    pub(crate) fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn reindex_image_status(
        &mut self,
        image_id: DbId,
        from: ImageStatus,
        to: ImageStatus,
    ) {
        if let Some(ids) = self.images_by_status.get_mut(&from) {
            ids.remove(&image_id);
        }
        self.images_by_status.entry(to).or_default().insert(image_id);
    }
}

/// Shared, thread-safe store for the full entity graph.
#[derive(Default)]
pub struct EntityStore {
    inner: RwLock<StoreInner>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock means a panicking thread mid-operation; the arena is
    // still structurally usable, so recover the guard instead of propagating
    // the panic to unrelated callers.
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use poseflow_core::identity::{Role, UserRef};
    use poseflow_core::keypoints::{KeypointSchema, SchemaKeypoint};
    use poseflow_core::types::UserId;

    use crate::models::{CreateBatch, CreateImage};

    use super::EntityStore;

    pub fn schema() -> KeypointSchema {
        KeypointSchema::new(
            "infant-pose",
            "v2",
            vec![
                SchemaKeypoint { label: "head".into(), required: true },
                SchemaKeypoint { label: "left_wrist".into(), required: false },
            ],
        )
    }

    pub fn uploader() -> UserId {
        UserId::new_v4()
    }

    pub fn annotator(capacity: u32) -> UserRef {
        UserRef::new(UserId::new_v4(), Role::Annotator, capacity)
    }

    pub fn seed_batch(store: &EntityStore, total_images: u32) -> i64 {
        let batch = store
            .create_batch(CreateBatch {
                name: "session-01".to_string(),
                description: None,
                schema: schema(),
                total_images,
                priority: None,
                quality_threshold: None,
                uploaded_by: uploader(),
            })
            .expect("batch should be created");
        batch.id
    }

    pub fn seed_image(store: &EntityStore, batch_id: i64, name: &str) -> i64 {
        let image = store
            .create_image(CreateImage {
                batch_id,
                file_name: name.to_string(),
                storage_path: format!("batches/{batch_id}/{name}"),
            })
            .expect("image should be created");
        image.id
    }
}
