//! Batch job orchestration and the typed event feed.

pub mod events;
pub mod orchestrator;

pub use events::{
    FailureDetail, FailureScope, JobEvent, JobEventKind, JobProgress, JobResult, MediaRef,
};
pub use orchestrator::{run_batch_job, BatchJobOptions, JobHandle};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between a job and its
/// controller. Observed between per-user phases and between per-item
/// downloads; in-flight HTTP requests run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
