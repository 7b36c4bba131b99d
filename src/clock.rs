//! Clock abstractions used by the rate windows, cooldowns, bans and the sweep gate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Clock abstraction so timing can be faked in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Milliseconds on this clock's timeline.
    fn now_millis(&self) -> u64;
}

/// Wall clock reporting milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Monotonic clock anchored to the wall clock at construction.
///
/// Immune to wall-clock adjustments after startup; reported values still look like
/// epoch milliseconds so reset timestamps stay meaningful to clients. The gate's default.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
    epoch_offset: u64,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self { start: Instant::now(), epoch_offset: SystemClock.now_millis() }
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        let elapsed = u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.epoch_offset.saturating_add(elapsed)
    }
}

/// Manually driven clock for deterministic tests.
///
/// Clones share the same time source.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Start the clock at `millis`.
    pub fn starting_at(millis: u64) -> Self {
        Self { now: Arc::new(AtomicU64::new(millis)) }
    }

    /// Move time forward.
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Move time forward by whole seconds.
    pub fn advance_secs(&self, secs: u64) {
        self.advance(secs.saturating_mul(1_000));
    }

    /// Jump to an absolute time.
    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
