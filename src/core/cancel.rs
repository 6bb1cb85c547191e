//! Request-scoped cancellation and deadlines.
//!
//! Every catalog call takes a `RequestContext`. It is checked at each
//! suspension point (database round trip, HTTP step) so an abandoned request
//! stops before the next side effect.

use crate::core::error::CatalogError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Slice used when sleeping so cancellation is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl RequestContext {
    /// A context with no deadline that is only cancelled explicitly.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancels this context and every clone of it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline. `None` means unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn check(&self, op: &str) -> Result<(), CatalogError> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(CatalogError::Cancelled(format!("{} cancelled by caller", op)));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(CatalogError::Cancelled(format!("{} deadline exceeded", op)));
        }
        Ok(())
    }

    /// Sleeps up to `dur`, waking early on cancellation. Returns false if cancelled.
    pub fn sleep(&self, dur: Duration) -> bool {
        let until = Instant::now() + dur;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= until {
                return true;
            }
            thread::sleep(SLEEP_SLICE.min(until - now));
        }
    }
}
