#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use hyper::header::HeaderMap;
use scamguard_gate::{
    AbuseGate, GateConfig, GateEvent, InMemoryGateStore, ManualClock, MemorySink,
};

/// Epoch-like starting point so reset timestamps look realistic.
pub const T0: u64 = 1_700_000_000_000;

pub struct Harness {
    pub gate: Arc<AbuseGate>,
    pub clock: ManualClock,
    pub store: InMemoryGateStore,
    pub events: MemorySink,
}

pub fn harness() -> Harness {
    harness_with(GateConfig::default())
}

pub fn harness_with(config: GateConfig) -> Harness {
    let clock = ManualClock::starting_at(T0);
    let store = InMemoryGateStore::new();
    let events = MemorySink::new();
    let gate = AbuseGate::builder()
        .config(config)
        .clock(clock.clone())
        .store(store.clone())
        .telemetry(events.clone())
        .build()
        .expect("valid config");
    Harness { gate: Arc::new(gate), clock, store, events }
}

pub fn from_ip(ip: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-forwarded-for", ip.parse().expect("header value"));
    headers
}

/// Wait for spawned telemetry tasks to deliver at least `n` events.
pub async fn settle(events: &MemorySink, n: usize) -> Vec<GateEvent> {
    for _ in 0..200 {
        if events.len() >= n {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    events.events()
}
