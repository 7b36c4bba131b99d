//! Error types for the abuse-control gate.
use std::time::Duration;

use crate::policy::ActionCategory;

/// Rejections produced by the gate.
///
/// Every variant carries a whole-second `retry_after` so well-behaved clients can back off.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GateError {
    /// The client identity is currently banned.
    #[error("client banned ({retry_after_secs}s remaining{})", issued_suffix(.newly_issued))]
    Banned {
        /// Seconds until the ban expires.
        retry_after_secs: u64,
        /// True when this very request crossed the abuse threshold.
        newly_issued: bool,
    },
    /// The high-value action was attempted too soon after the previous one.
    #[error("cooldown active for {action} ({retry_after_secs}s remaining)")]
    CooldownActive {
        /// Action guarded by the cooldown.
        action: ActionCategory,
        /// Seconds until the next attempt is accepted.
        retry_after_secs: u64,
    },
    /// The window quota for the action is exhausted.
    #[error("rate limit exceeded for {action} (limit {limit}, {retry_after_secs}s until reset)")]
    RateLimitExceeded {
        /// Action whose window is exhausted.
        action: ActionCategory,
        /// Configured requests per window.
        limit: u32,
        /// Seconds until the window resets.
        retry_after_secs: u64,
        /// Window reset time in clock milliseconds.
        reset_at_millis: u64,
    },
}

fn issued_suffix(newly_issued: &bool) -> &'static str {
    if *newly_issued {
        ", just issued"
    } else {
        ""
    }
}

impl GateError {
    /// Whole seconds the caller should wait before retrying.
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            Self::Banned { retry_after_secs, .. }
            | Self::CooldownActive { retry_after_secs, .. }
            | Self::RateLimitExceeded { retry_after_secs, .. } => *retry_after_secs,
        }
    }

    /// Check if this rejection is due to a ban.
    pub fn is_banned(&self) -> bool {
        matches!(self, Self::Banned { .. })
    }

    /// Check if this rejection is due to the cooldown.
    pub fn is_cooldown(&self) -> bool {
        matches!(self, Self::CooldownActive { .. })
    }

    /// Check if this rejection is due to an exhausted window.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
    }

    /// Short machine-friendly label, used in telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Banned { newly_issued: true, .. } => "ban_issued",
            Self::Banned { .. } => "banned",
            Self::CooldownActive { .. } => "cooldown_active",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
        }
    }
}

/// Errors produced when validating gate configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PolicyError {
    /// Limit must be > 0.
    #[error("{action}: limit must be > 0")]
    ZeroLimit {
        /// Offending action.
        action: ActionCategory,
    },
    /// Window must be > 0.
    #[error("{action}: window must be > 0")]
    ZeroWindow {
        /// Offending action.
        action: ActionCategory,
    },
    /// Ban threshold must exceed the limit.
    #[error("{action}: ban_after ({ban_after}) must be greater than limit ({limit})")]
    BanThresholdNotAboveLimit {
        /// Offending action.
        action: ActionCategory,
        /// Configured limit.
        limit: u32,
        /// Configured ban threshold.
        ban_after: u32,
    },
    /// Only one action may carry a cooldown.
    #[error("cooldown configured on both {first} and {second}; at most one action may have one")]
    MultipleCooldowns {
        /// First action with a cooldown.
        first: ActionCategory,
        /// Second action with a cooldown.
        second: ActionCategory,
    },
    /// Ban duration must be > 0.
    #[error("ban duration must be > 0 (got {0:?})")]
    ZeroBanDuration(Duration),
    /// Sweep interval must be > 0.
    #[error("sweep interval must be > 0 (got {0:?})")]
    ZeroSweepInterval(Duration),
    /// Config document could not be parsed.
    #[error("invalid gate config: {0}")]
    Parse(String),
}

/// Errors surfaced by a [`GateStore`](crate::gate::store::GateStore) backend.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreError {
    /// Backend unreachable or failed.
    #[error("store backend unavailable: {0}")]
    Unavailable(String),
    /// Stored value could not be decoded.
    #[error("corrupt store entry for {key}: {reason}")]
    Corrupt {
        /// Offending key.
        key: String,
        /// Decoder message.
        reason: String,
    },
    /// Compare-and-set kept losing races.
    #[error("contention on {key} after {attempts} attempts")]
    Contention {
        /// Contended key.
        key: String,
        /// Attempts made.
        attempts: usize,
    },
}
