use crate::error::{Result, TaylorError};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Shared flag a caller flips to abandon an in-flight build.
///
/// Clones observe the same flag. The pipeline polls it between stages, so a
/// cancelled build stops at the next checkpoint instead of running to the end.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(TaylorError::Cancelled)
        } else {
            Ok(())
        }
    }
}
