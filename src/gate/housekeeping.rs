use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::StoreError;
use crate::gate::accounting::duration_millis;
use crate::gate::store::{GateStore, SweepStats};

/// Default spacing between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Owns the "last swept at" timestamp and decides when the next sweep is due.
///
/// Re-checked on every request; at most one concurrent caller wins each interval. Skipping a
/// cycle is harmless since eviction is idempotent.
#[derive(Debug)]
pub struct Housekeeper {
    interval_millis: u64,
    last_swept_at: AtomicU64,
}

impl Housekeeper {
    /// Start the gate at `now` so the first sweep happens one interval after startup.
    pub fn new(now: u64, interval: Duration) -> Self {
        Self { interval_millis: duration_millis(interval), last_swept_at: AtomicU64::new(now) }
    }

    /// Timestamp of the last sweep (or construction).
    pub fn last_swept_at(&self) -> u64 {
        self.last_swept_at.load(Ordering::Acquire)
    }

    /// Claim the sweep for `now` if the interval elapsed. Only one caller per interval
    /// gets `true`.
    pub fn claim(&self, now: u64) -> bool {
        let last = self.last_swept_at.load(Ordering::Acquire);
        if now.saturating_sub(last) <= self.interval_millis {
            return false;
        }
        self.last_swept_at
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Evict expired state from `store` when due. `Ok(None)` means the gate was closed.
    pub async fn maybe_sweep(
        &self,
        store: &dyn GateStore,
        now: u64,
    ) -> Result<Option<SweepStats>, StoreError> {
        if !self.claim(now) {
            return Ok(None);
        }
        let stats = store.evict_expired(now).await?;
        tracing::debug!(
            windows_evicted = stats.windows_evicted,
            bans_evicted = stats.bans_evicted,
            windows_remaining = stats.windows_remaining,
            bans_remaining = stats.bans_remaining,
            "housekeeping sweep"
        );
        Ok(Some(stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::store::{InMemoryGateStore, RateWindow};
    use std::sync::Arc;

    #[test]
    fn claim_waits_for_interval() {
        let hk = Housekeeper::new(0, Duration::from_secs(300));
        assert!(!hk.claim(1_000));
        assert!(!hk.claim(300_000));
        assert!(hk.claim(300_001));
        assert!(!hk.claim(300_002), "already claimed for this interval");
        assert_eq!(hk.last_swept_at(), 300_001);
    }

    #[tokio::test]
    async fn sweeps_only_when_due() {
        let store = InMemoryGateStore::new();
        store.compare_and_set_window("k", None, RateWindow::fresh(0), 1_000).await.unwrap();
        let hk = Housekeeper::new(0, Duration::from_secs(1));

        assert_eq!(hk.maybe_sweep(&store, 500).await.unwrap(), None);
        assert_eq!(store.window_count(), 1);

        let stats = hk.maybe_sweep(&store, 1_001).await.unwrap().expect("due");
        assert_eq!(stats.windows_evicted, 1);
        assert_eq!(store.window_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_elect_one_sweeper() {
        let hk = Arc::new(Housekeeper::new(0, Duration::from_secs(1)));
        let mut handles = Vec::new();
        for _ in 0..32 {
            let hk = hk.clone();
            handles.push(tokio::spawn(async move { hk.claim(5_000) }));
        }
        let wins = futures::future::join_all(handles)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().expect("join"))
            .count();
        assert_eq!(wins, 1);
    }
}
