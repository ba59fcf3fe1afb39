//! Wall-clock sources consumed by the session clock.
//!
//! The clock never reads the system time directly. It asks a `TimeSource`
//! for the current Unix epoch in milliseconds, which lets tests and
//! simulations move time by hand while production uses `chrono::Utc`.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Milliseconds since the Unix epoch.
pub type EpochMillis = i64;

/// Last millisecond of the year 9999. Later timestamps are treated as corrupt.
pub const MAX_EPOCH_MS: EpochMillis = 253_402_300_799_999;

/// Whether `ms` lies between the Unix epoch and `MAX_EPOCH_MS`.
pub fn is_plausible_epoch(ms: EpochMillis) -> bool {
    (0..=MAX_EPOCH_MS).contains(&ms)
}

/// Supplies the current wall-clock time.
pub trait TimeSource: Send + Sync {
    fn now_ms(&self) -> EpochMillis;
}

/// Reads the host's UTC clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> EpochMillis {
        Utc::now().timestamp_millis()
    }
}

/// A hand-driven clock. Clones share the same instant.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    now: Arc<AtomicI64>,
}

impl ManualTime {
    pub fn new(start: EpochMillis) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    pub fn set(&self, now: EpochMillis) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, delta: i64) {
        self.now.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance_ms(secs * 1000);
    }
}

impl TimeSource for ManualTime {
    fn now_ms(&self) -> EpochMillis {
        self.now.load(Ordering::SeqCst)
    }
}

/// Whole seconds elapsed between `since` and `now`, never negative.
pub fn whole_seconds_between(since: EpochMillis, now: EpochMillis) -> u64 {
    u64::try_from(now.saturating_sub(since) / 1000).unwrap_or(0)
}

/// Formats a second count as `MM:SS`. Minutes do not roll over into hours.
pub fn format_mm_ss(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
