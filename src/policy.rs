//! Action categories and their static abuse-control policies.
//!
//! - [`ActionCategory`]: the fixed set of gated operations.
//! - [`ActionPolicy`]: limit, window, ban threshold and optional cooldown for one action.
//! - [`PolicyTable`]: the validated per-action table.
//! - [`PolicyHandle`]: live-updatable table with lock-free snapshots.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

const HOUR: Duration = Duration::from_secs(60 * 60);

/// A named class of protected operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionCategory {
    /// Searching reports by data point.
    Search,
    /// Submitting a new report.
    Submit,
    /// Disputing an existing report.
    Dispute,
    /// AI extraction of data points from free text.
    Extract,
    /// AI analysis of a full report narrative.
    AnalyzeReport,
}

impl ActionCategory {
    /// Every category, in declaration order.
    pub const ALL: [ActionCategory; 5] = [
        ActionCategory::Search,
        ActionCategory::Submit,
        ActionCategory::Dispute,
        ActionCategory::Extract,
        ActionCategory::AnalyzeReport,
    ];

    /// Path segment naming this action under the API prefix.
    pub fn as_str(self) -> &'static str {
        match self {
            ActionCategory::Search => "search",
            ActionCategory::Submit => "submit",
            ActionCategory::Dispute => "dispute",
            ActionCategory::Extract => "extract",
            ActionCategory::AnalyzeReport => "analyze-report",
        }
    }

    /// Parse a path segment; unknown segments yield `None`.
    pub fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == segment)
    }
}

impl fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static policy for one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPolicy {
    /// Requests allowed per window (inclusive).
    pub limit: u32,
    /// Fixed window length.
    #[serde(rename = "window_secs", with = "secs")]
    pub window: Duration,
    /// Count within one window at which the identity is banned (inclusive).
    pub ban_after: u32,
    /// Minimum spacing between consecutive state-changing requests.
    #[serde(rename = "cooldown_secs", default, with = "opt_secs")]
    pub cooldown: Option<Duration>,
}

impl ActionPolicy {
    /// Policy without a cooldown.
    pub const fn new(limit: u32, window: Duration, ban_after: u32) -> Self {
        Self { limit, window, ban_after, cooldown: None }
    }

    /// Attach a cooldown.
    pub const fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    fn validate(&self, action: ActionCategory) -> Result<(), PolicyError> {
        if self.limit == 0 {
            return Err(PolicyError::ZeroLimit { action });
        }
        if self.window.is_zero() {
            return Err(PolicyError::ZeroWindow { action });
        }
        if self.ban_after <= self.limit {
            return Err(PolicyError::BanThresholdNotAboveLimit {
                action,
                limit: self.limit,
                ban_after: self.ban_after,
            });
        }
        Ok(())
    }
}

/// Validated per-action policy table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<ActionCategory, ActionPolicy>", into = "BTreeMap<ActionCategory, ActionPolicy>")]
pub struct PolicyTable {
    policies: BTreeMap<ActionCategory, ActionPolicy>,
}

impl PolicyTable {
    /// Build a table, validating every policy and the single-cooldown rule.
    pub fn new(
        policies: impl IntoIterator<Item = (ActionCategory, ActionPolicy)>,
    ) -> Result<Self, PolicyError> {
        let policies: BTreeMap<_, _> = policies.into_iter().collect();
        let mut cooldown_owner: Option<ActionCategory> = None;
        for (action, policy) in &policies {
            policy.validate(*action)?;
            if policy.cooldown.is_some() {
                if let Some(first) = cooldown_owner {
                    return Err(PolicyError::MultipleCooldowns { first, second: *action });
                }
                cooldown_owner = Some(*action);
            }
        }
        Ok(Self { policies })
    }

    /// Policy for `action`, if configured.
    pub fn get(&self, action: ActionCategory) -> Option<&ActionPolicy> {
        self.policies.get(&action)
    }

    /// The action carrying the cooldown, if any.
    pub fn cooldown_action(&self) -> Option<(ActionCategory, Duration)> {
        self.policies
            .iter()
            .find_map(|(action, policy)| policy.cooldown.map(|cooldown| (*action, cooldown)))
    }

    /// Longest configured window; housekeeping never needs to retain anything longer.
    pub fn longest_window(&self) -> Duration {
        self.policies.values().map(|p| p.window).max().unwrap_or(HOUR)
    }

    /// Iterate configured policies in action order.
    pub fn iter(&self) -> impl Iterator<Item = (ActionCategory, &ActionPolicy)> {
        self.policies.iter().map(|(action, policy)| (*action, policy))
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        let policies = BTreeMap::from([
            (ActionCategory::Search, ActionPolicy::new(60, HOUR, 200)),
            (
                ActionCategory::Submit,
                ActionPolicy::new(5, HOUR, 20).with_cooldown(Duration::from_secs(60)),
            ),
            (ActionCategory::Dispute, ActionPolicy::new(3, HOUR, 15)),
            (ActionCategory::Extract, ActionPolicy::new(20, HOUR, 50)),
            (ActionCategory::AnalyzeReport, ActionPolicy::new(10, HOUR, 30)),
        ]);
        Self { policies }
    }
}

impl TryFrom<BTreeMap<ActionCategory, ActionPolicy>> for PolicyTable {
    type Error = PolicyError;

    fn try_from(policies: BTreeMap<ActionCategory, ActionPolicy>) -> Result<Self, Self::Error> {
        Self::new(policies)
    }
}

impl From<PolicyTable> for BTreeMap<ActionCategory, ActionPolicy> {
    fn from(table: PolicyTable) -> Self {
        table.policies
    }
}

/// Live-updatable policy table.
///
/// Reads are lock-free snapshots; clones share the same table.
#[derive(Debug, Clone)]
pub struct PolicyHandle {
    inner: Arc<ArcSwap<PolicyTable>>,
}

impl PolicyHandle {
    /// Wrap an already validated table.
    pub fn new(table: PolicyTable) -> Self {
        Self { inner: Arc::new(ArcSwap::from_pointee(table)) }
    }

    /// Snapshot the current table.
    pub fn get(&self) -> Arc<PolicyTable> {
        self.inner.load_full()
    }

    /// Replace the table entirely.
    pub fn set(&self, table: PolicyTable) {
        self.inner.store(Arc::new(table));
    }

    /// Update a single action's policy; an invalid result leaves the table untouched.
    pub fn update(&self, action: ActionCategory, policy: ActionPolicy) -> Result<(), PolicyError> {
        let current = self.inner.load_full();
        let mut policies = current.policies.clone();
        policies.insert(action, policy);
        let next = PolicyTable::new(policies)?;
        self.inner.store(Arc::new(next));
        tracing::info!(action = %action, limit = policy.limit, ban_after = policy.ban_after, "policy updated");
        Ok(())
    }
}

impl Default for PolicyHandle {
    fn default() -> Self {
        Self::new(PolicyTable::default())
    }
}

pub(crate) mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

pub(crate) mod opt_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|v| v.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_matches_published_limits() {
        let table = PolicyTable::default();
        let search = table.get(ActionCategory::Search).unwrap();
        assert_eq!((search.limit, search.ban_after), (60, 200));
        let submit = table.get(ActionCategory::Submit).unwrap();
        assert_eq!((submit.limit, submit.ban_after), (5, 20));
        assert_eq!(
            table.cooldown_action(),
            Some((ActionCategory::Submit, Duration::from_secs(60)))
        );
        assert!(PolicyTable::new(table.iter().map(|(a, p)| (a, *p))).is_ok());
    }

    #[test]
    fn segments_round_trip() {
        for action in ActionCategory::ALL {
            assert_eq!(ActionCategory::from_segment(action.as_str()), Some(action));
        }
        assert_eq!(ActionCategory::from_segment("analyze-report"), Some(ActionCategory::AnalyzeReport));
        assert_eq!(ActionCategory::from_segment("stats"), None);
    }

    #[test]
    fn rejects_ban_threshold_at_or_below_limit() {
        let err = PolicyTable::new([(ActionCategory::Search, ActionPolicy::new(10, HOUR, 10))])
            .expect_err("ban_after == limit is invalid");
        assert!(matches!(err, PolicyError::BanThresholdNotAboveLimit { limit: 10, ban_after: 10, .. }));
    }

    #[test]
    fn rejects_zero_limit_and_window() {
        let err = PolicyTable::new([(ActionCategory::Search, ActionPolicy::new(0, HOUR, 5))])
            .expect_err("zero limit");
        assert!(matches!(err, PolicyError::ZeroLimit { .. }));
        let err = PolicyTable::new([(ActionCategory::Search, ActionPolicy::new(1, Duration::ZERO, 5))])
            .expect_err("zero window");
        assert!(matches!(err, PolicyError::ZeroWindow { .. }));
    }

    #[test]
    fn rejects_second_cooldown() {
        let cd = Duration::from_secs(30);
        let err = PolicyTable::new([
            (ActionCategory::Submit, ActionPolicy::new(5, HOUR, 20).with_cooldown(cd)),
            (ActionCategory::Dispute, ActionPolicy::new(3, HOUR, 15).with_cooldown(cd)),
        ])
        .expect_err("two cooldowns");
        assert!(matches!(
            err,
            PolicyError::MultipleCooldowns {
                first: ActionCategory::Submit,
                second: ActionCategory::Dispute
            }
        ));
    }

    #[test]
    fn handle_update_keeps_previous_table_on_error() {
        let handle = PolicyHandle::default();
        handle
            .update(ActionCategory::Search, ActionPolicy::new(100, HOUR, 300))
            .expect("valid update");
        assert_eq!(handle.get().get(ActionCategory::Search).unwrap().limit, 100);

        let err = handle.update(ActionCategory::Search, ActionPolicy::new(100, HOUR, 50));
        assert!(err.is_err());
        assert_eq!(handle.get().get(ActionCategory::Search).unwrap().ban_after, 300);
    }

    #[test]
    fn deserializes_from_json_seconds() {
        let json = r#"{
            "search": {"limit": 2, "window_secs": 60, "ban_after": 4},
            "submit": {"limit": 1, "window_secs": 60, "ban_after": 3, "cooldown_secs": 10}
        }"#;
        let table: PolicyTable = serde_json::from_str(json).expect("valid table");
        assert_eq!(table.get(ActionCategory::Search).unwrap().window, Duration::from_secs(60));
        assert_eq!(table.cooldown_action(), Some((ActionCategory::Submit, Duration::from_secs(10))));
        assert!(table.get(ActionCategory::Dispute).is_none());

        let invalid = r#"{"search": {"limit": 5, "window_secs": 60, "ban_after": 5}}"#;
        assert!(serde_json::from_str::<PolicyTable>(invalid).is_err());
    }
}
