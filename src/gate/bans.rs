//! Ban / escalation engine.
//!
//! Per identity: `Unbanned -> Banned(expiry) -> Unbanned`. A ban is active iff `now < expiry`.
//! Re-banning overwrites the expiry; bans never stack.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::StoreError;
use crate::gate::accounting::{ceil_secs_until, duration_millis};
use crate::gate::store::GateStore;
use crate::identity::ClientIdentity;

/// Ban length applied when an abuse threshold is crossed.
pub const DEFAULT_BAN_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Result of a ban lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanStatus {
    /// No active ban.
    Clear,
    /// Banned until `expiry` (clock milliseconds).
    Active {
        /// Ban expiry.
        expiry: u64,
        /// Whole seconds until expiry, rounded up.
        retry_after_secs: u64,
    },
}

impl BanStatus {
    /// True for [`BanStatus::Active`].
    pub fn is_active(&self) -> bool {
        matches!(self, BanStatus::Active { .. })
    }
}

/// Issues, checks and lazily expires bans.
#[derive(Debug, Clone)]
pub struct BanBook {
    store: Arc<dyn GateStore>,
    clock: Arc<dyn Clock>,
    retention: Duration,
}

impl BanBook {
    /// Ban book over `store`; expired bans stay evictable for `retention`.
    pub fn new(store: Arc<dyn GateStore>, clock: Arc<dyn Clock>, retention: Duration) -> Self {
        Self { store, clock, retention }
    }

    /// Check for an active ban. An expired entry is evicted and reported as clear.
    pub async fn is_banned(&self, identity: &ClientIdentity) -> Result<BanStatus, StoreError> {
        let Some(expiry) = self.store.ban_expiry(identity.as_str()).await? else {
            return Ok(BanStatus::Clear);
        };
        let now = self.clock.now_millis();
        if now < expiry {
            return Ok(BanStatus::Active { expiry, retry_after_secs: ceil_secs_until(expiry, now) });
        }
        // Conditional delete: a concurrent re-ban with a new expiry must survive.
        if self.store.delete_ban_if(identity.as_str(), expiry).await? {
            tracing::debug!(identity = %identity, "expired ban evicted");
        }
        Ok(BanStatus::Clear)
    }

    /// Ban `identity` for `duration` from now, replacing any existing ban. Returns the expiry.
    pub async fn ban(
        &self,
        identity: &ClientIdentity,
        duration: Duration,
    ) -> Result<u64, StoreError> {
        let expiry = self.clock.now_millis().saturating_add(duration_millis(duration));
        let expires_at = expiry.saturating_add(duration_millis(self.retention));
        self.store.set_ban(identity.as_str(), expiry, expires_at).await?;
        tracing::warn!(
            identity = %identity,
            duration_secs = duration.as_secs(),
            "client banned"
        );
        Ok(expiry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::gate::store::InMemoryGateStore;

    fn book() -> (BanBook, ManualClock, InMemoryGateStore) {
        let clock = ManualClock::starting_at(50_000);
        let store = InMemoryGateStore::new();
        let book = BanBook::new(Arc::new(store.clone()), Arc::new(clock.clone()), Duration::ZERO);
        (book, clock, store)
    }

    #[tokio::test]
    async fn unbanned_by_default() {
        let (book, _, _) = book();
        let status = book.is_banned(&ClientIdentity::new("ip_a")).await.unwrap();
        assert_eq!(status, BanStatus::Clear);
    }

    #[tokio::test]
    async fn ban_is_active_until_expiry_then_evicted() {
        let (book, clock, store) = book();
        let id = ClientIdentity::new("ip_b");
        let expiry = book.ban(&id, DEFAULT_BAN_DURATION).await.unwrap();
        assert_eq!(expiry, 50_000 + 86_400_000);

        let status = book.is_banned(&id).await.unwrap();
        assert_eq!(status, BanStatus::Active { expiry, retry_after_secs: 86_400 });

        clock.advance(86_400_000 - 1);
        assert!(book.is_banned(&id).await.unwrap().is_active());

        clock.advance(1);
        assert_eq!(book.is_banned(&id).await.unwrap(), BanStatus::Clear);
        assert_eq!(store.ban_count(), 0, "lazy eviction");
    }

    #[tokio::test]
    async fn reban_overwrites_instead_of_stacking() {
        let (book, clock, _) = book();
        let id = ClientIdentity::new("ip_c");
        book.ban(&id, Duration::from_secs(100)).await.unwrap();
        clock.advance_secs(10);
        let second = book.ban(&id, Duration::from_secs(100)).await.unwrap();
        match book.is_banned(&id).await.unwrap() {
            BanStatus::Active { expiry, retry_after_secs } => {
                assert_eq!(expiry, second);
                assert_eq!(retry_after_secs, 100);
            }
            BanStatus::Clear => panic!("expected active ban"),
        }
    }
}
