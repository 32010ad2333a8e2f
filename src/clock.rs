use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Monotonic nanosecond timestamp source.
///
/// Each tick is `max(wall clock, previous + 1)`, so timestamps are strictly
/// increasing even if the wall clock stalls or steps backwards. Record
/// timestamps and segment ids both come from here, which keeps segment
/// filenames unique and ordered by recency.
#[derive(Debug, Default)]
pub struct Clock {
    last: AtomicU64,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next timestamp.
    pub fn tick(&self) -> u64 {
        let now = wall_nanos();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    /// Ensure every future tick is greater than `seen`.
    /// Called during recovery with timestamps read back from disk.
    pub fn observe(&self, seen: u64) {
        self.last.fetch_max(seen, Ordering::AcqRel);
    }

    /// Most recently issued (or observed) timestamp.
    pub fn last(&self) -> u64 {
        self.last.load(Ordering::Acquire)
    }
}

fn wall_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
