//! Cooperative cancellation of in-progress frame advances.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Raised when a frame advance observes a reset request.
///
/// Not a failure: the advance abandons its frame without partial output and
/// the caller re-issues against the new configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("configuration reset requested")]
pub struct ResetRequested;

/// Shared edge-triggered reset flag.
///
/// Clones observe the same flag, so another thread can interrupt a long
/// advance. The stepper polls it at recursion entries, before stage
/// evaluations, and inside correction iterations; cancellation is
/// cooperative, never preemptive.
#[derive(Debug, Clone, Default)]
pub struct ResetToken {
    requested: Arc<AtomicBool>,
}

impl ResetToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the in-progress advance to abandon its frame.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Rearms the token for a new run.
    pub fn clear(&self) {
        self.requested.store(false, Ordering::Release);
    }

    /// Errors out if a reset has been requested.
    pub fn check(&self) -> Result<(), ResetRequested> {
        if self.is_requested() {
            Err(ResetRequested)
        } else {
            Ok(())
        }
    }
}
