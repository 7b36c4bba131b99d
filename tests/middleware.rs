#![allow(missing_docs)]

mod common;

use std::convert::Infallible;
use std::net::SocketAddr;

use hyper::{Method, Request, Response, StatusCode};
use scamguard_gate::gate::middleware::{X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET};
use scamguard_gate::AbuseGateLayer;
use tower::{service_fn, Layer, ServiceExt};

use common::test_helpers::{harness, T0};

async fn handler(_req: Request<String>) -> Result<Response<String>, Infallible> {
    Ok(Response::new("handled".to_string()))
}

fn request(method: Method, path: &str, ip: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(path)
        .header("x-forwarded-for", ip)
        .body(String::new())
        .expect("request")
}

#[tokio::test]
async fn admitted_responses_carry_rate_headers() {
    let h = harness();
    let svc = AbuseGateLayer::new(h.gate.clone()).layer(service_fn(handler));

    let response = svc.clone().oneshot(request(Method::GET, "/api/search", "203.0.113.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body(), "handled");
    assert_eq!(response.headers()[X_RATELIMIT_LIMIT], "60");
    assert_eq!(response.headers()[X_RATELIMIT_REMAINING], "59");
    assert_eq!(response.headers()[X_RATELIMIT_RESET], (T0 + 3_600_000).to_string().as_str());

    let exempt = svc.oneshot(request(Method::GET, "/", "203.0.113.1")).await.unwrap();
    assert_eq!(exempt.status(), StatusCode::OK);
    assert!(exempt.headers().get(X_RATELIMIT_LIMIT).is_none());
}

#[tokio::test]
async fn cooldown_rejection_is_json_429() {
    let h = harness();
    let svc = AbuseGateLayer::new(h.gate.clone()).layer(service_fn(handler));

    let first = svc.clone().oneshot(request(Method::POST, "/api/submit", "198.51.100.3")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    h.clock.advance_secs(10);
    let second = svc.oneshot(request(Method::POST, "/api/submit", "198.51.100.3")).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second.headers()["retry-after"], "50");
    assert_eq!(second.headers()["content-type"], "application/json");

    let body: serde_json::Value = serde_json::from_str(second.body()).unwrap();
    assert_eq!(body["error"], "Cooldown active");
    assert_eq!(body["retryAfter"], 50);
    assert_eq!(body["message"], "Please wait 50 seconds before submitting another report.");
}

#[tokio::test]
async fn ban_rejection_is_403_and_skips_the_handler() {
    let h = harness();
    let svc = AbuseGateLayer::new(h.gate.clone()).layer(service_fn(handler));

    let mut last = None;
    for _ in 0..15 {
        let response =
            svc.clone().oneshot(request(Method::POST, "/api/dispute", "192.0.2.8")).await.unwrap();
        last = Some(response);
    }
    let issued = last.expect("responses");
    assert_eq!(issued.status(), StatusCode::FORBIDDEN);
    assert_eq!(issued.headers()["retry-after"], "86400");
    let body: serde_json::Value = serde_json::from_str(issued.body()).unwrap();
    assert_eq!(body["error"], "Access blocked");

    let blocked = svc.oneshot(request(Method::GET, "/api/search", "192.0.2.8")).await.unwrap();
    assert_eq!(blocked.status(), StatusCode::FORBIDDEN);
    assert_ne!(blocked.body(), "handled");
    let body: serde_json::Value = serde_json::from_str(blocked.body()).unwrap();
    assert_eq!(body["error"], "Access temporarily blocked");
}

#[tokio::test]
async fn peer_address_extension_is_the_fallback_identity() {
    let h = harness();
    let svc = AbuseGateLayer::new(h.gate.clone()).layer(service_fn(handler));

    let direct = |port: u16| {
        let mut req = Request::builder().uri("/api/extract").body(String::new()).unwrap();
        req.extensions_mut().insert(SocketAddr::from(([192, 0, 2, 50], port)));
        req
    };
    let a = svc.clone().oneshot(direct(1000)).await.unwrap();
    let b = svc.oneshot(direct(2000)).await.unwrap();
    // Port changes, host does not: one identity.
    assert_eq!(a.headers()[X_RATELIMIT_REMAINING], "19");
    assert_eq!(b.headers()[X_RATELIMIT_REMAINING], "18");
}
