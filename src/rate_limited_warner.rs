//! Rate-limited reporting of discarded entries.
//!
//! Queue overflow can discard thousands of entries per second; logging each
//! one would flood the application's own log. Callers count discards with
//! [`RateLimitedWarner::record_drop`] and ask for a summary with
//! [`RateLimitedWarner::warn_if_due`], which emits at most once per interval.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use parking_lot::Mutex;

/// Default spacing between two summaries.
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct RateLimitedWarner {
    interval: Duration,
    last_warn: Mutex<Option<Instant>>,
    dropped: AtomicU64,
    total: AtomicU64,
}

impl Default for RateLimitedWarner {
    fn default() -> Self {
        Self::new(DEFAULT_WARN_INTERVAL)
    }
}

impl RateLimitedWarner {
    /// The first summary may be emitted immediately.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_warn: Mutex::new(None),
            dropped: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Discards recorded over the lifetime of the warner.
    pub fn total_dropped(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Call `warn` with the count since the last summary when the interval
    /// has elapsed and something was dropped.
    pub fn warn_if_due(&self, warn: impl FnOnce(u64)) {
        let now = Instant::now();
        let mut last = self.last_warn.lock();
        if last.is_some_and(|prev| now.duration_since(prev) < self.interval) {
            return;
        }
        let count = self.dropped.swap(0, Ordering::Relaxed);
        if count > 0 {
            *last = Some(now);
            drop(last);
            warn(count);
        }
    }

    /// Emit any pending summary regardless of the interval.
    pub fn flush(&self, warn: impl FnOnce(u64)) {
        let count = self.dropped.swap(0, Ordering::Relaxed);
        if count > 0 {
            *self.last_warn.lock() = Some(Instant::now());
            warn(count);
        }
    }
}
