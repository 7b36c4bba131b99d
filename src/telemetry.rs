//! Telemetry for the abuse-control gate.
//!
//! The gate emits structured [`GateEvent`]s (bans issued, rejections, fail-open faults,
//! housekeeping sweeps). Events flow through sinks implemented as
//! `tower::Service<GateEvent>`, so they compose with standard tower combinators.
//!
//! Emission is best-effort and happens on a spawned task: a slow or failing sink never
//! delays the response path.
//!
//! ```rust
//! use scamguard_gate::telemetry::{GateEvent, MemorySink};
//! use scamguard_gate::ActionCategory;
//!
//! let sink = MemorySink::with_capacity(16);
//! let event = GateEvent::BanIssued {
//!     identity: "ip_1f".into(),
//!     action: ActionCategory::Search,
//!     count: 200,
//!     duration_secs: 86_400,
//! };
//! assert_eq!(event.to_string(), "BanIssued(ip_1f, search, count=200, 86400s)");
//! assert!(sink.is_empty());
//! ```

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use serde_json::json;
use tower::util::BoxCloneService;
use tower::{BoxError, Service, ServiceExt};

use crate::gate::store::SweepStats;
use crate::policy::ActionCategory;

/// Events emitted by the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    /// An identity crossed an abuse threshold and was banned.
    BanIssued {
        /// Hashed client identity.
        identity: String,
        /// Action whose threshold was crossed.
        action: ActionCategory,
        /// Window count at the moment of the ban.
        count: u32,
        /// Ban length.
        duration_secs: u64,
    },
    /// A request was rejected.
    Rejected {
        /// Hashed client identity.
        identity: String,
        /// Action, when the route had one.
        action: Option<ActionCategory>,
        /// Rejection label (see [`GateError::kind`](crate::GateError::kind)).
        kind: &'static str,
        /// Seconds advertised in `Retry-After`.
        retry_after_secs: u64,
    },
    /// An internal fault was ignored and the request let through.
    FailedOpen {
        /// Action being checked, if any.
        action: Option<ActionCategory>,
        /// Fault description.
        reason: String,
    },
    /// Housekeeping evicted stale state.
    Swept(SweepStats),
}

impl fmt::Display for GateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateEvent::BanIssued { identity, action, count, duration_secs } => {
                write!(f, "BanIssued({}, {}, count={}, {}s)", identity, action, count, duration_secs)
            }
            GateEvent::Rejected { identity, action, kind, retry_after_secs } => match action {
                Some(action) => {
                    write!(f, "Rejected({}, {}, {}, retry={}s)", identity, action, kind, retry_after_secs)
                }
                None => write!(f, "Rejected({}, {}, retry={}s)", identity, kind, retry_after_secs),
            },
            GateEvent::FailedOpen { action, reason } => match action {
                Some(action) => write!(f, "FailedOpen({}: {})", action, reason),
                None => write!(f, "FailedOpen({})", reason),
            },
            GateEvent::Swept(stats) => write!(
                f,
                "Swept(windows -{} ={}, bans -{} ={})",
                stats.windows_evicted,
                stats.windows_remaining,
                stats.bans_evicted,
                stats.bans_remaining
            ),
        }
    }
}

/// Convert a [`GateEvent`] into a JSON value for sinks that ship structured records.
pub fn event_to_json(event: &GateEvent) -> serde_json::Value {
    match event {
        GateEvent::BanIssued { identity, action, count, duration_secs } => json!({
            "kind": "ban_issued",
            "identity": identity,
            "action": action,
            "count": count,
            "duration_secs": duration_secs,
        }),
        GateEvent::Rejected { identity, action, kind, retry_after_secs } => json!({
            "kind": "rejected",
            "identity": identity,
            "action": action,
            "reason": kind,
            "retry_after_secs": retry_after_secs,
        }),
        GateEvent::FailedOpen { action, reason } => json!({
            "kind": "failed_open",
            "action": action,
            "reason": reason,
        }),
        GateEvent::Swept(stats) => json!({
            "kind": "swept",
            "windows_evicted": stats.windows_evicted,
            "bans_evicted": stats.bans_evicted,
            "windows_remaining": stats.windows_remaining,
            "bans_remaining": stats.bans_remaining,
        }),
    }
}

/// A telemetry sink that consumes gate events.
pub trait TelemetrySink:
    tower::Service<GateEvent, Response = (), Error = Self::SinkError> + Clone + Send + 'static
{
    /// The error type for this sink.
    type SinkError: std::error::Error + Send + Sync + 'static;
}

/// Best-effort emit helper that honors `poll_ready` and swallows errors.
pub async fn emit_best_effort<S>(sink: S, event: GateEvent)
where
    S: tower::Service<GateEvent, Response = ()> + Send + Clone + 'static,
    S::Error: Into<BoxError> + Send + 'static,
    S::Future: Send + 'static,
{
    if let Ok(mut ready_sink) = sink.ready_oneshot().await {
        let _ = ready_sink.call(event).await;
    }
}

type BoxedSink = BoxCloneService<GateEvent, (), BoxError>;

/// Type-erased sink held by the gate; spawns each emission so callers never wait.
pub struct EventEmitter {
    // BoxCloneService is Send but not Sync; the lock is only held to clone it.
    sink: Mutex<BoxedSink>,
}

impl EventEmitter {
    /// Wrap any sink.
    pub fn new<S>(sink: S) -> Self
    where
        S: TelemetrySink,
        S::Future: Send + 'static,
    {
        let boxed = BoxCloneService::new(sink.map_err(|e: S::SinkError| -> BoxError { Box::new(e) }));
        Self { sink: Mutex::new(boxed) }
    }

    /// Publish `event` without blocking. Dropped when no tokio runtime is running.
    pub fn emit(&self, event: GateEvent) {
        let sink = self.sink.lock().clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(emit_best_effort(sink, event));
            }
            Err(_) => tracing::trace!(event = %event, "no runtime; telemetry event dropped"),
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(NullSink)
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter").finish_non_exhaustive()
    }
}

type SinkFuture = Pin<Box<dyn Future<Output = Result<(), Infallible>> + Send>>;

/// A no-op telemetry sink that discards all events.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl Service<GateEvent> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: GateEvent) -> Self::Future {
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for NullSink {
    type SinkError = Infallible;
}

/// A telemetry sink that logs events using the `tracing` crate.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl Service<GateEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: GateEvent) -> Self::Future {
        tracing::info!(event = %event, "gate_event");
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for LogSink {
    type SinkError = Infallible;
}

/// A telemetry sink that stores events in memory, evicting the oldest beyond `capacity`.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<GateEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    /// Sink holding up to 10 000 events.
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    /// Sink holding up to `capacity` events (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Snapshot of stored events.
    pub fn events(&self) -> Vec<GateEvent> {
        self.events.lock().clone()
    }

    /// Drop all stored events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Stored event count.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Events evicted because the sink was full.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<GateEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: GateEvent) -> Self::Future {
        let mut guard = self.events.lock();
        if guard.len() >= self.capacity {
            guard.remove(0);
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push(event);
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for MemorySink {
    type SinkError = Infallible;
}
