//! Shared liveness flag
//!
//! Written once by the termination watcher, read by every health request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Observable liveness of the sidecar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Live,
    Terminating,
}

/// Shared state for termination tracking
///
/// Starts `Live`. The only transition is `Live -> Terminating` and it is never
/// undone. Clones share the same underlying flag.
#[derive(Debug, Clone, Default)]
pub struct LivenessState {
    terminating: Arc<AtomicBool>,
}

impl LivenessState {
    /// Create a new liveness state (initially live)
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to `Terminating`
    ///
    /// Returns true if this call performed the transition, false if the
    /// state was already terminating.
    pub fn mark_terminating(&self) -> bool {
        !self.terminating.swap(true, Ordering::SeqCst)
    }

    pub fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Liveness {
        if self.is_terminating() {
            Liveness::Terminating
        } else {
            Liveness::Live
        }
    }
}
