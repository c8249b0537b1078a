use crate::error::{Result, TraceError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Time and cancellation limits for processing a single cell.
///
/// `check` is called between pipeline stages; a stage that is already running
/// is never interrupted.
#[derive(Debug, Clone, Default)]
pub struct CellBudget {
    deadline: Option<(Instant, u64)>,
    cancel: Option<Arc<AtomicBool>>,
}

impl CellBudget {
    /// No deadline, not cancellable
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Budget starting now and expiring after `timeout_ms` if given
    pub fn starting_now(timeout_ms: Option<u64>, cancel: Option<Arc<AtomicBool>>) -> Self {
        Self {
            deadline: timeout_ms.map(|ms| (Instant::now() + Duration::from_millis(ms), ms)),
            cancel,
        }
    }

    pub fn check(&self) -> Result<()> {
        if self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err(TraceError::Cancelled);
        }
        if let Some((deadline, limit_ms)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(TraceError::TimedOut { limit_ms });
            }
        }
        Ok(())
    }
}
