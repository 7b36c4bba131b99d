//! The abuse-control gate.
//!
//! [`AbuseGate`] ties the pieces together:
//! - [`classify`]: maps a request onto an action (or exempts it).
//! - [`bans`]: fail-fast rejection of banned identities.
//! - [`cooldown`]: minimum spacing for the cooldown-gated action.
//! - [`accounting`]: fixed-window counters and ban-threshold detection.
//! - [`housekeeping`]: time-gated eviction of stale state.
//! - [`store`]: the injectable state backend.
//! - [`middleware`]: tower layer turning verdicts into HTTP responses.
//!
//! # Order of checks
//!
//! sweep (when due) → classify → ban → cooldown (POST only) → count → ban issuance →
//! limit. A banned identity is rejected before any counter moves, and a cooldown rejection
//! consumes no window slot.
//!
//! # Failure policy
//!
//! Store faults fail open: the request is let through, a warning is logged and a
//! [`GateEvent::FailedOpen`] is published.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::header::HeaderMap;
use hyper::Method;

use crate::clock::{Clock, MonotonicClock};
use crate::config::GateConfig;
use crate::error::{GateError, PolicyError, StoreError};
use crate::identity::{ClientIdentity, IdentityResolver};
use crate::policy::{ActionCategory, PolicyHandle};
use crate::telemetry::{EventEmitter, GateEvent, TelemetrySink};

pub mod accounting;
pub mod bans;
pub mod classify;
pub mod cooldown;
pub mod housekeeping;
pub mod middleware;
pub mod store;

use accounting::RateAccountant;
use bans::{BanBook, BanStatus};
use classify::{Classification, Route, RouteClassifier};
use cooldown::CooldownGuard;
use housekeeping::Housekeeper;
use store::{GateStore, InMemoryGateStore};

pub use middleware::{AbuseGateLayer, AbuseGateService};

/// Window state reported with an admitted request (for the `X-RateLimit-*` headers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateStatus {
    /// Action counted.
    pub action: ActionCategory,
    /// Configured limit.
    pub limit: u32,
    /// Requests left in the window.
    pub remaining: u32,
    /// Window reset time in clock milliseconds.
    pub reset_at: u64,
}

/// A request the gate let through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Route bypasses the gate.
    Exempt,
    /// Gated route without a configured policy; only the ban check applied.
    Unmetered,
    /// Counted within its window.
    Allowed(RateStatus),
    /// An internal fault prevented the check; let through.
    FailedOpen {
        /// Action being checked.
        action: Option<ActionCategory>,
    },
}

impl Admission {
    /// Window state, when the request was counted.
    pub fn rate_status(&self) -> Option<&RateStatus> {
        match self {
            Admission::Allowed(status) => Some(status),
            _ => None,
        }
    }
}

/// Stateful request gate: rate windows, cooldowns and bans over a shared store.
///
/// Share one instance (e.g. behind an `Arc`) across every handler of the process.
#[derive(Debug)]
pub struct AbuseGate {
    store: Arc<dyn GateStore>,
    clock: Arc<dyn Clock>,
    policies: PolicyHandle,
    classifier: RouteClassifier,
    resolver: IdentityResolver,
    bans: BanBook,
    accountant: RateAccountant,
    cooldowns: CooldownGuard,
    housekeeper: Housekeeper,
    ban_duration: Duration,
    events: EventEmitter,
}

impl AbuseGate {
    /// Gate with the default configuration, in-memory store and system clock.
    pub fn new() -> Self {
        AbuseGateBuilder::default().assemble(GateConfig::default())
    }

    /// Start building a gate.
    pub fn builder() -> AbuseGateBuilder {
        AbuseGateBuilder::default()
    }

    /// Live policy handle; updates apply to the next request.
    pub fn policies(&self) -> &PolicyHandle {
        &self.policies
    }

    /// Ban engine, for explicit bans or inspection.
    pub fn bans(&self) -> &BanBook {
        &self.bans
    }

    /// Identity resolver used by [`evaluate`](Self::evaluate).
    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Classifier used by [`evaluate`](Self::evaluate).
    pub fn classifier(&self) -> &RouteClassifier {
        &self.classifier
    }

    /// Full pipeline for one HTTP request: sweep when due, classify, resolve identity, check.
    pub async fn evaluate(
        &self,
        path: &str,
        method: &Method,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> Result<Admission, GateError> {
        self.run_housekeeping().await;
        let classification = self.classifier.classify(path, method);
        if classification.route == Route::Exempt {
            return Ok(Admission::Exempt);
        }
        let identity = self.resolver.resolve(headers, peer);
        self.check(&identity, classification).await
    }

    /// Run the gate for an already classified request from `identity`.
    pub async fn check(
        &self,
        identity: &ClientIdentity,
        classification: Classification,
    ) -> Result<Admission, GateError> {
        let action = match classification.route {
            Route::Exempt => return Ok(Admission::Exempt),
            Route::Unmetered => None,
            Route::Action(action) => Some(action),
        };

        match self.bans.is_banned(identity).await {
            Ok(BanStatus::Active { retry_after_secs, .. }) => {
                return Err(self.reject(
                    identity,
                    action,
                    GateError::Banned { retry_after_secs, newly_issued: false },
                ));
            }
            Ok(BanStatus::Clear) => {}
            Err(e) => self.fail_open(action, &e),
        }

        let Some(action) = action else {
            return Ok(Admission::Unmetered);
        };
        let policies = self.policies.get();
        let Some(policy) = policies.get(action).copied() else {
            tracing::debug!(action = %action, "no policy configured; request unmetered");
            return Ok(Admission::Unmetered);
        };

        if let (Some(cooldown), true) = (policy.cooldown, classification.cooldown_eligible) {
            match self.cooldowns.check_cooldown(identity, action, cooldown).await {
                Ok(check) if !check.allowed => {
                    return Err(self.reject(
                        identity,
                        Some(action),
                        GateError::CooldownActive { action, retry_after_secs: check.wait_secs },
                    ));
                }
                Ok(_) => {}
                Err(e) => self.fail_open(Some(action), &e),
            }
        }

        let window = match self.accountant.check_and_increment(identity, action, &policy).await {
            Ok(window) => window,
            Err(e) => {
                self.fail_open(Some(action), &e);
                return Ok(Admission::FailedOpen { action: Some(action) });
            }
        };

        if window.crossed_ban_threshold {
            match self.bans.ban(identity, self.ban_duration).await {
                Ok(_) => {
                    self.events.emit(GateEvent::BanIssued {
                        identity: identity.to_string(),
                        action,
                        count: window.count,
                        duration_secs: self.ban_duration.as_secs(),
                    });
                    return Err(self.reject(
                        identity,
                        Some(action),
                        GateError::Banned {
                            retry_after_secs: self.ban_duration.as_secs(),
                            newly_issued: true,
                        },
                    ));
                }
                // No ban was stored: answer with the window verdict alone.
                Err(e) => self.fail_open(Some(action), &e),
            }
        }

        if !window.allowed {
            let now = self.clock.now_millis();
            let retry_after_secs = accounting::ceil_secs_until(window.reset_at, now).max(1);
            return Err(self.reject(
                identity,
                Some(action),
                GateError::RateLimitExceeded {
                    action,
                    limit: policy.limit,
                    retry_after_secs,
                    reset_at_millis: window.reset_at,
                },
            ));
        }

        Ok(Admission::Allowed(RateStatus {
            action,
            limit: policy.limit,
            remaining: window.remaining,
            reset_at: window.reset_at,
        }))
    }

    /// Sweep expired state if the housekeeping interval elapsed. Cheap when not due.
    pub async fn run_housekeeping(&self) {
        let now = self.clock.now_millis();
        match self.housekeeper.maybe_sweep(self.store.as_ref(), now).await {
            Ok(Some(stats)) => self.events.emit(GateEvent::Swept(stats)),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "housekeeping sweep failed; will retry next interval"),
        }
    }

    fn reject(
        &self,
        identity: &ClientIdentity,
        action: Option<ActionCategory>,
        error: GateError,
    ) -> GateError {
        tracing::debug!(identity = %identity, action = ?action, error = %error, "request rejected");
        self.events.emit(GateEvent::Rejected {
            identity: identity.to_string(),
            action,
            kind: error.kind(),
            retry_after_secs: error.retry_after_secs(),
        });
        error
    }

    fn fail_open(&self, action: Option<ActionCategory>, error: &StoreError) {
        tracing::warn!(action = ?action, error = %error, "gate store fault; failing open");
        self.events.emit(GateEvent::FailedOpen { action, reason: error.to_string() });
    }
}

impl Default for AbuseGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`AbuseGate`].
#[derive(Debug, Default)]
pub struct AbuseGateBuilder {
    config: Option<GateConfig>,
    store: Option<Arc<dyn GateStore>>,
    clock: Option<Arc<dyn Clock>>,
    resolver: Option<IdentityResolver>,
    events: Option<EventEmitter>,
}

impl AbuseGateBuilder {
    /// Use `config` instead of [`GateConfig::default`].
    pub fn config(mut self, config: GateConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a custom state backend.
    pub fn store<S: GateStore + 'static>(mut self, store: S) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Override the clock (useful for deterministic tests).
    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Use a custom identity resolver.
    pub fn resolver(mut self, resolver: IdentityResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Publish gate events to `sink`.
    pub fn telemetry<S>(mut self, sink: S) -> Self
    where
        S: TelemetrySink,
        S::Future: Send + 'static,
    {
        self.events = Some(EventEmitter::new(sink));
        self
    }

    /// Validate the configuration and build the gate.
    pub fn build(mut self) -> Result<AbuseGate, PolicyError> {
        let config = self.config.take().unwrap_or_default();
        config.validate()?;
        Ok(self.assemble(config))
    }

    fn assemble(self, config: GateConfig) -> AbuseGate {
        let store = self.store.unwrap_or_else(|| Arc::new(InMemoryGateStore::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::default()));
        let accountant = RateAccountant::new(store.clone(), clock.clone(), config.retention);

        AbuseGate {
            bans: BanBook::new(store.clone(), clock.clone(), config.retention),
            cooldowns: CooldownGuard::new(accountant.clone(), clock.clone()),
            housekeeper: Housekeeper::new(clock.now_millis(), config.sweep_interval),
            classifier: RouteClassifier::new(config.api_prefix, config.exempt_prefixes),
            resolver: self.resolver.unwrap_or_default(),
            policies: PolicyHandle::new(config.policies),
            ban_duration: config.ban_duration,
            events: self.events.unwrap_or_default(),
            accountant,
            store,
            clock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::policy::{ActionPolicy, PolicyTable};

    fn gate_with(table: PolicyTable) -> (AbuseGate, ManualClock) {
        let clock = ManualClock::starting_at(1_000_000);
        let config = GateConfig { policies: table, ..GateConfig::default() };
        let gate = AbuseGate::builder().config(config).clock(clock.clone()).build().unwrap();
        (gate, clock)
    }

    fn search() -> Classification {
        Classification { route: Route::Action(ActionCategory::Search), cooldown_eligible: false }
    }

    #[tokio::test]
    async fn admitted_requests_report_window_state() {
        let (gate, _) = gate_with(PolicyTable::default());
        let id = ClientIdentity::new("ip_1");
        let admission = gate.check(&id, search()).await.unwrap();
        let status = admission.rate_status().copied().expect("counted");
        assert_eq!(status.limit, 60);
        assert_eq!(status.remaining, 59);
        assert_eq!(status.reset_at, 1_000_000 + 3_600_000);
    }

    #[tokio::test]
    async fn missing_policy_is_unmetered() {
        let table = PolicyTable::new([(
            ActionCategory::Dispute,
            ActionPolicy::new(1, Duration::from_secs(60), 2),
        )])
        .unwrap();
        let (gate, _) = gate_with(table);
        let id = ClientIdentity::new("ip_2");
        for _ in 0..5 {
            assert_eq!(gate.check(&id, search()).await.unwrap(), Admission::Unmetered);
        }
    }

    #[tokio::test]
    async fn exempt_classification_short_circuits() {
        let (gate, _) = gate_with(PolicyTable::default());
        let exempt = Classification { route: Route::Exempt, cooldown_eligible: true };
        let id = ClientIdentity::new("ip_3");
        assert_eq!(gate.check(&id, exempt).await.unwrap(), Admission::Exempt);
    }

    #[tokio::test]
    async fn default_clock_is_monotonic_on_the_epoch() {
        let gate = AbuseGate::new();
        assert!(format!("{:?}", gate.clock).contains("MonotonicClock"));

        let before = crate::clock::SystemClock.now_millis();
        let admission = gate.check(&ClientIdentity::new("ip_4"), search()).await.unwrap();
        let reset_at = admission.rate_status().map(|s| s.reset_at).expect("counted");
        assert!(reset_at >= before + 3_600_000 - 1_000);
        assert!(reset_at <= crate::clock::SystemClock.now_millis() + 3_600_000 + 1_000);
    }

    #[test]
    fn invalid_config_is_rejected_by_builder() {
        let config = GateConfig { ban_duration: Duration::ZERO, ..GateConfig::default() };
        let err = AbuseGate::builder().config(config).build().unwrap_err();
        assert!(matches!(err, PolicyError::ZeroBanDuration(_)));
    }
}
