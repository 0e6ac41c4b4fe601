//! Batch aggregate counters, derived purely from child image states.
//!
//! Counters are a cached snapshot, never an accumulator: every recompute
//! derives them from scratch, which makes the recompute idempotent and safe
//! to re-run after partial failures.

use serde::{Deserialize, Serialize};

use crate::image_workflow::ImageStatus;

/// Aggregate counters for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounters {
    /// Images currently covered by annotation work.
    pub assigned: u32,
    /// Images with a final verdict. Always `approved + rejected`.
    pub completed: u32,
    pub approved: u32,
    pub rejected: u32,
    /// Images that exhausted their detection retries.
    pub failed: u32,
}

impl BatchCounters {
    /// Derive counters from the current statuses of a batch's images.
    pub fn from_statuses(statuses: &[ImageStatus]) -> Self {
        let mut counters = Self::default();
        for status in statuses {
            if status.is_assigned_work() {
                counters.assigned += 1;
            }
            match status {
                ImageStatus::Approved => counters.approved += 1,
                ImageStatus::Rejected => counters.rejected += 1,
                ImageStatus::DetectionFailed => counters.failed += 1,
                _ => {}
            }
        }
        counters.completed = counters.approved + counters.rejected;
        counters
    }

    /// The derived counters always satisfy the batch invariants.
    pub fn is_consistent(&self, total_images: u32) -> bool {
        self.completed == self.approved + self.rejected && self.assigned <= total_images
    }
}

/// Batch completion percentage, in `0.0..=100.0`.
pub fn percentage(completed: u32, total_images: u32) -> f64 {
    if total_images == 0 {
        return 0.0;
    }
    f64::from(completed) / f64::from(total_images) * 100.0
}
