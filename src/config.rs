//! Gate configuration.
//!
//! Loaded from JSON (durations in whole seconds); every field is optional and falls back to
//! the production defaults.
//!
//! ```rust
//! use scamguard_gate::GateConfig;
//!
//! let config = GateConfig::from_json(r#"{
//!     "ban_duration_secs": 3600,
//!     "policies": {
//!         "search": {"limit": 30, "window_secs": 600, "ban_after": 90}
//!     }
//! }"#).unwrap();
//! assert_eq!(config.ban_duration.as_secs(), 3600);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::gate::bans::DEFAULT_BAN_DURATION;
use crate::gate::classify::{DEFAULT_API_PREFIX, DEFAULT_EXEMPT_PREFIXES};
use crate::gate::housekeeping::DEFAULT_SWEEP_INTERVAL;
use crate::policy::{secs, PolicyTable};

/// Everything the gate needs to know up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateConfig {
    /// Requests under this prefix are gated.
    pub api_prefix: String,
    /// Prefixes bypassing the gate entirely.
    pub exempt_prefixes: Vec<String>,
    /// Ban length once an abuse threshold is crossed.
    #[serde(rename = "ban_duration_secs", with = "secs")]
    pub ban_duration: Duration,
    /// Minimum spacing between housekeeping sweeps.
    #[serde(rename = "sweep_interval_secs", with = "secs")]
    pub sweep_interval: Duration,
    /// How long closed windows and expired bans are kept before eviction.
    #[serde(rename = "retention_secs", with = "secs")]
    pub retention: Duration,
    /// Per-action policies.
    pub policies: PolicyTable,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            exempt_prefixes: DEFAULT_EXEMPT_PREFIXES.iter().map(|p| p.to_string()).collect(),
            ban_duration: DEFAULT_BAN_DURATION,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            retention: Duration::ZERO,
            policies: PolicyTable::default(),
        }
    }
}

impl GateConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PolicyError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values the policy table cannot check itself.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.ban_duration.is_zero() {
            return Err(PolicyError::ZeroBanDuration(self.ban_duration));
        }
        if self.sweep_interval.is_zero() {
            return Err(PolicyError::ZeroSweepInterval(self.sweep_interval));
        }
        Ok(())
    }
}
