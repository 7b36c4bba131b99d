use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::StoreError;

/// Request count for one identity × action within the current fixed window.
///
/// Timestamps are clock milliseconds. Invariant: `window_start <= last_request`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    /// Requests observed since `window_start`.
    pub count: u32,
    /// When the current window opened.
    pub window_start: u64,
    /// Most recent request.
    pub last_request: u64,
}

impl RateWindow {
    /// A window opened at `now` with no requests recorded yet.
    pub fn fresh(now: u64) -> Self {
        Self { count: 0, window_start: now, last_request: now }
    }

    /// True once `now - window_start` exceeds `window_millis`.
    pub fn is_expired(&self, now: u64, window_millis: u64) -> bool {
        now.saturating_sub(self.window_start) > window_millis
    }
}

/// Counts returned by [`GateStore::evict_expired`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Windows removed.
    pub windows_evicted: usize,
    /// Bans removed.
    pub bans_evicted: usize,
    /// Windows still held.
    pub windows_remaining: usize,
    /// Bans still held.
    pub bans_remaining: usize,
}

/// Abstract storage for gate state (rate windows and bans).
///
/// Designed for both in-memory and shared backends (e.g. Redis). Every entry carries an
/// absolute `expires_at` (clock milliseconds) after which [`evict_expired`](Self::evict_expired)
/// may drop it. Single-key updates use compare-and-set so concurrent handlers never lose
/// increments.
#[async_trait]
pub trait GateStore: Send + Sync + std::fmt::Debug {
    /// Fetch the window stored under `key`.
    async fn window(&self, key: &str) -> Result<Option<RateWindow>, StoreError>;

    /// Store `next` under `key` only if the current value equals `expected`
    /// (`None` meaning the key must be absent).
    ///
    /// Returns `Ok(true)` if the write happened, `Ok(false)` if a race was detected.
    async fn compare_and_set_window(
        &self,
        key: &str,
        expected: Option<RateWindow>,
        next: RateWindow,
        expires_at: u64,
    ) -> Result<bool, StoreError>;

    /// Remove a window.
    async fn delete_window(&self, key: &str) -> Result<(), StoreError>;

    /// Ban expiry for `identity`, if one is stored (active or not).
    async fn ban_expiry(&self, identity: &str) -> Result<Option<u64>, StoreError>;

    /// Store a ban, overwriting any existing one.
    async fn set_ban(&self, identity: &str, expiry: u64, expires_at: u64) -> Result<(), StoreError>;

    /// Remove the ban for `identity` only if its expiry still equals `expected_expiry`.
    ///
    /// Returns whether an entry was removed.
    async fn delete_ban_if(&self, identity: &str, expected_expiry: u64) -> Result<bool, StoreError>;

    /// Drop every entry whose `expires_at` is before `now`. A window is still live at its
    /// reset instant, so entries expiring exactly at `now` survive.
    async fn evict_expired(&self, now: u64) -> Result<SweepStats, StoreError>;
}

#[derive(Debug, Clone, Copy)]
struct Entry<T> {
    value: T,
    expires_at: u64,
}

#[derive(Debug, Default)]
struct State {
    windows: HashMap<String, Entry<RateWindow>>,
    bans: HashMap<String, Entry<u64>>,
}

/// Process-local store; state is lost on restart.
#[derive(Default, Clone, Debug)]
pub struct InMemoryGateStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryGateStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of windows currently held.
    pub fn window_count(&self) -> usize {
        self.state.lock().windows.len()
    }

    /// Number of bans currently held.
    pub fn ban_count(&self) -> usize {
        self.state.lock().bans.len()
    }
}

#[async_trait]
impl GateStore for InMemoryGateStore {
    async fn window(&self, key: &str) -> Result<Option<RateWindow>, StoreError> {
        Ok(self.state.lock().windows.get(key).map(|entry| entry.value))
    }

    async fn compare_and_set_window(
        &self,
        key: &str,
        expected: Option<RateWindow>,
        next: RateWindow,
        expires_at: u64,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        let current = state.windows.get(key).map(|entry| entry.value);
        if current != expected {
            return Ok(false);
        }
        state.windows.insert(key.to_string(), Entry { value: next, expires_at });
        Ok(true)
    }

    async fn delete_window(&self, key: &str) -> Result<(), StoreError> {
        self.state.lock().windows.remove(key);
        Ok(())
    }

    async fn ban_expiry(&self, identity: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.state.lock().bans.get(identity).map(|entry| entry.value))
    }

    async fn set_ban(&self, identity: &str, expiry: u64, expires_at: u64) -> Result<(), StoreError> {
        self.state.lock().bans.insert(identity.to_string(), Entry { value: expiry, expires_at });
        Ok(())
    }

    async fn delete_ban_if(&self, identity: &str, expected_expiry: u64) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        match state.bans.get(identity) {
            Some(entry) if entry.value == expected_expiry => {
                state.bans.remove(identity);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn evict_expired(&self, now: u64) -> Result<SweepStats, StoreError> {
        let mut state = self.state.lock();
        let windows_before = state.windows.len();
        let bans_before = state.bans.len();
        state.windows.retain(|_, entry| entry.expires_at >= now);
        state.bans.retain(|_, entry| entry.expires_at >= now);
        Ok(SweepStats {
            windows_evicted: windows_before - state.windows.len(),
            bans_evicted: bans_before - state.bans.len(),
            windows_remaining: state.windows.len(),
            bans_remaining: state.bans.len(),
        })
    }
}
