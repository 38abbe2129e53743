//! Single-flight flag that keeps at most one crawl run active per process

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Single-flight flag for crawl runs
///
/// `try_acquire` flips the flag from idle to running with a compare-and-set;
/// the returned guard flips it back when dropped, including during unwinding.
#[derive(Debug, Clone, Default)]
pub struct RunFlag {
    running: Arc<AtomicBool>,
}

impl RunFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while a run holds the flag
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Claims the flag, or returns `None` if a run is already active
    pub fn try_acquire(&self) -> Option<RunGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard {
                running: Arc::clone(&self.running),
            })
    }
}

/// Releases the run flag on drop
#[derive(Debug)]
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        tracing::debug!("Run flag released");
    }
}
