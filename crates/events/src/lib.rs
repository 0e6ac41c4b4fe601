//! Notification channel for the annotation workflow.
//!
//! - [`NotificationBus`] — in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`WorkflowEvent`] — the canonical batch event envelope.
//!
//! Delivery is best-effort: a publish with no subscribers is dropped, and a
//! failed publish never fails the workflow transition that produced it.

pub mod bus;

pub use bus::{EventKind, NotificationBus, WorkflowEvent};
