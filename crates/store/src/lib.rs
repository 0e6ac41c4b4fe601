//! Entity store for the annotation workflow.
//!
//! Entities live in an in-process arena keyed by [`DbId`](poseflow_core::types::DbId),
//! with explicit indexes for the reverse lookups the workflow needs (images by
//! batch and by status, assignments by annotator, annotations by image,
//! verification by annotation). Every store call runs inside a single lock
//! scope, so the invariants that must be checked-and-set together — one active
//! assignment per image, one active annotation per image, one verification per
//! annotation, status preconditions — hold under concurrent callers.

pub mod models;
pub mod store;

pub use store::EntityStore;
