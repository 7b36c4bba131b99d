use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::StoreError;
use crate::gate::store::{GateStore, RateWindow};
use crate::identity::ClientIdentity;
use crate::policy::{ActionCategory, ActionPolicy};

/// Compare-and-set attempts before giving up on a contended key.
pub const MAX_CAS_ATTEMPTS: usize = 16;

/// Outcome of counting one request against its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCheck {
    /// `count <= limit`.
    pub allowed: bool,
    /// Requests counted in the current window, including this one.
    pub count: u32,
    /// `max(0, limit - count)`, for `X-RateLimit-Remaining`.
    pub remaining: u32,
    /// `window_start + window`, in clock milliseconds.
    pub reset_at: u64,
    /// `count >= ban_after`.
    pub crossed_ban_threshold: bool,
}

/// Storage key for an identity × action window.
pub fn window_key(identity: &ClientIdentity, action: ActionCategory) -> String {
    format!("{}:{}", identity.as_str(), action.as_str())
}

/// Fixed-window counter per identity × action.
///
/// Counting continues past the limit so sustained hammering reaches the ban threshold;
/// rejected requests are never refunded.
#[derive(Debug, Clone)]
pub struct RateAccountant {
    store: Arc<dyn GateStore>,
    clock: Arc<dyn Clock>,
    retention: Duration,
}

impl RateAccountant {
    /// Accountant over `store`; windows stay evictable for `retention` after they close.
    pub fn new(store: Arc<dyn GateStore>, clock: Arc<dyn Clock>, retention: Duration) -> Self {
        Self { store, clock, retention }
    }

    /// Count one request and report the window state.
    ///
    /// An expired window is replaced, never merged. Concurrent increments on the same key
    /// are serialized through compare-and-set.
    pub async fn check_and_increment(
        &self,
        identity: &ClientIdentity,
        action: ActionCategory,
        policy: &ActionPolicy,
    ) -> Result<WindowCheck, StoreError> {
        let key = window_key(identity, action);
        let window_millis = duration_millis(policy.window);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let now = self.clock.now_millis();
            let stored = self.store.window(&key).await?;
            let base = match stored {
                Some(window) if !window.is_expired(now, window_millis) => window,
                _ => RateWindow::fresh(now),
            };

            let next = RateWindow {
                count: base.count.saturating_add(1),
                window_start: base.window_start,
                last_request: now.max(base.window_start),
            };
            let reset_at = next.window_start.saturating_add(window_millis);
            // `last_request` must outlive the cooldown even past the reset instant.
            let cooldown_until =
                next.last_request.saturating_add(policy.cooldown.map_or(0, duration_millis));
            let expires_at =
                reset_at.max(cooldown_until).saturating_add(duration_millis(self.retention));

            if self.store.compare_and_set_window(&key, stored, next, expires_at).await? {
                return Ok(WindowCheck {
                    allowed: next.count <= policy.limit,
                    count: next.count,
                    remaining: policy.limit.saturating_sub(next.count),
                    reset_at,
                    crossed_ban_threshold: next.count >= policy.ban_after,
                });
            }
            tracing::trace!(key = %key, "window update raced, retrying");
        }

        Err(StoreError::Contention { key, attempts: MAX_CAS_ATTEMPTS })
    }

    /// Timestamp of the most recent counted request, if the window exists.
    pub async fn last_request(
        &self,
        identity: &ClientIdentity,
        action: ActionCategory,
    ) -> Result<Option<u64>, StoreError> {
        Ok(self.store.window(&window_key(identity, action)).await?.map(|w| w.last_request))
    }
}

pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Whole seconds from `now` until `deadline`, rounded up.
pub(crate) fn ceil_secs_until(deadline: u64, now: u64) -> u64 {
    deadline.saturating_sub(now).div_ceil(1_000)
}
