//! Injected identity and time providers.
//!
//! The catalog never reads the wall clock or mints ids directly; it asks a
//! `Clock` and an `IdGenerator` so tests can pin both.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use ulid::Ulid;

pub trait Clock: Send + Sync {
    fn now_unix_sec(&self) -> i64;
}

pub trait IdGenerator: Send + Sync {
    fn new_id(&self) -> String;
}

/// Wall-clock seconds since the unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_sec(&self) -> i64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }
}

/// Replays a queue of pinned times. Once one value is left it sticks.
#[derive(Debug)]
pub struct FixedClock {
    times: Mutex<VecDeque<i64>>,
}

impl FixedClock {
    pub fn new(times: impl IntoIterator<Item = i64>) -> Self {
        let times: VecDeque<i64> = times.into_iter().collect();
        assert!(!times.is_empty(), "FixedClock needs at least one time");
        Self {
            times: Mutex::new(times),
        }
    }

    pub fn at(now: i64) -> Self {
        Self::new([now])
    }
}

impl Clock for FixedClock {
    fn now_unix_sec(&self) -> i64 {
        let mut times = self.times.lock().unwrap_or_else(|p| p.into_inner());
        if times.len() > 1 {
            times.pop_front().unwrap_or_default()
        } else {
            times.front().copied().unwrap_or_default()
        }
    }
}

/// Lowercase ULIDs: sortable by creation time, safe in derived ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct UlidIdGenerator;

impl IdGenerator for UlidIdGenerator {
    fn new_id(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }
}

/// Hands out a fixed list of ids, then `id-<n>` once exhausted.
#[derive(Debug)]
pub struct SequenceIdGenerator {
    ids: Mutex<VecDeque<String>>,
    overflow: AtomicU64,
}

impl SequenceIdGenerator {
    pub fn new<S: Into<String>>(ids: impl IntoIterator<Item = S>) -> Self {
        Self {
            ids: Mutex::new(ids.into_iter().map(Into::into).collect()),
            overflow: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequenceIdGenerator {
    fn new_id(&self) -> String {
        let next = self
            .ids
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        match next {
            Some(id) => id,
            None => format!("id-{}", self.overflow.fetch_add(1, Ordering::SeqCst) + 1),
        }
    }
}
