#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # ScamGuard Gate
//!
//! Abuse control for the ScamGuard API: every request to a protected endpoint is classified
//! into an action, keyed to a hashed client identity, and admitted or rejected.
//!
//! ## Features
//!
//! - **Per-action fixed windows** with `X-RateLimit-*` reporting
//! - **Escalating bans** once an abuse threshold is crossed, global across actions
//! - **Submission cooldown** enforcing minimum spacing between reports
//! - **Time-gated housekeeping** bounding memory without a scheduler
//! - **Injectable store and clock** (compare-and-set, no lost updates)
//! - **Tower middleware** rendering rejections as JSON with `Retry-After`
//! - **Extraction facade** pairing a language model with a regex fallback
//!
//! ## Quick Start
//!
//! ```rust
//! use scamguard_gate::{AbuseGate, Admission};
//! use hyper::{header::HeaderMap, Method};
//!
//! #[tokio::main]
//! async fn main() {
//!     let gate = AbuseGate::new();
//!     let mut headers = HeaderMap::new();
//!     headers.insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
//!
//!     let admission = gate
//!         .evaluate("/api/search", &Method::GET, &headers, None)
//!         .await
//!         .expect("first request is admitted");
//!     let status = admission.rate_status().expect("search is metered");
//!     assert_eq!(status.remaining, 59);
//!
//!     let exempt = gate.evaluate("/api/stats", &Method::GET, &headers, None).await;
//!     assert_eq!(exempt, Ok(Admission::Exempt));
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod extraction;
pub mod gate;
pub mod identity;
pub mod policy;
pub mod telemetry;

// Re-exports
pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock};
pub use config::GateConfig;
pub use error::{GateError, PolicyError, StoreError};
pub use extraction::{
    AnalyzerError, DataPointType, ExtractedDataPoint, ExtractionError, ExtractionResult, Extractor,
    ReportAnalysis, ScamType, TextAnalyzer,
};
pub use gate::bans::{BanStatus, DEFAULT_BAN_DURATION};
pub use gate::classify::{Classification, Route, RouteClassifier};
pub use gate::store::{GateStore, InMemoryGateStore, RateWindow, SweepStats};
pub use gate::{AbuseGate, AbuseGateBuilder, AbuseGateLayer, AbuseGateService, Admission, RateStatus};
pub use identity::{ClientIdentity, IdentityHasher, IdentityResolver, RollingHasher};
pub use policy::{ActionCategory, ActionPolicy, PolicyHandle, PolicyTable};
pub use telemetry::{GateEvent, LogSink, MemorySink, NullSink, TelemetrySink};
