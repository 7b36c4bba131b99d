use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::StoreError;
use crate::gate::accounting::{ceil_secs_until, duration_millis, RateAccountant};
use crate::identity::ClientIdentity;
use crate::policy::ActionCategory;

/// Result of a cooldown check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownCheck {
    /// Enough time has passed since the last counted request.
    pub allowed: bool,
    /// Whole seconds left, rounded up; 0 when allowed.
    pub wait_secs: u64,
}

/// Minimum spacing between consecutive requests of the cooldown-gated action.
///
/// Reads `last_request` of the action's rate window; keeps no state of its own. Must run
/// before the window increment so a rejection does not consume a slot.
#[derive(Debug, Clone)]
pub struct CooldownGuard {
    accountant: RateAccountant,
    clock: Arc<dyn Clock>,
}

impl CooldownGuard {
    /// Guard reading windows through `accountant`.
    pub fn new(accountant: RateAccountant, clock: Arc<dyn Clock>) -> Self {
        Self { accountant, clock }
    }

    /// Check whether `identity` may perform `action` again.
    pub async fn check_cooldown(
        &self,
        identity: &ClientIdentity,
        action: ActionCategory,
        cooldown: Duration,
    ) -> Result<CooldownCheck, StoreError> {
        let Some(last) = self.accountant.last_request(identity, action).await? else {
            return Ok(CooldownCheck { allowed: true, wait_secs: 0 });
        };
        let ready_at = last.saturating_add(duration_millis(cooldown));
        let now = self.clock.now_millis();
        if now < ready_at {
            return Ok(CooldownCheck { allowed: false, wait_secs: ceil_secs_until(ready_at, now) });
        }
        Ok(CooldownCheck { allowed: true, wait_secs: 0 })
    }
}
