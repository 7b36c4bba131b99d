use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use hyper::{Request, Response, StatusCode};
use serde_json::json;
use tower_layer::Layer;
use tower_service::Service;

use crate::error::GateError;
use crate::gate::{AbuseGate, Admission};

/// `X-RateLimit-Limit` header.
pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
/// `X-RateLimit-Remaining` header.
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
/// `X-RateLimit-Reset` header (epoch milliseconds with the default clock).
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// A layer placing an [`AbuseGate`] in front of an HTTP service.
///
/// The peer address is read from a [`SocketAddr`] request extension when the server
/// inserts one; forwarding headers take precedence.
#[derive(Clone, Debug)]
pub struct AbuseGateLayer {
    gate: Arc<AbuseGate>,
}

impl AbuseGateLayer {
    /// Create a new layer sharing `gate`.
    pub fn new(gate: Arc<AbuseGate>) -> Self {
        Self { gate }
    }
}

impl<S> Layer<S> for AbuseGateLayer {
    type Service = AbuseGateService<S>;

    fn layer(&self, service: S) -> Self::Service {
        AbuseGateService { inner: service, gate: self.gate.clone() }
    }
}

/// Middleware service answering rejected requests itself and annotating admitted ones.
#[derive(Clone, Debug)]
pub struct AbuseGateService<S> {
    inner: S,
    gate: Arc<AbuseGate>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for AbuseGateService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: From<String> + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let gate = self.gate.clone();
        // Take the service that was driven to readiness; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let peer = req.extensions().get::<SocketAddr>().copied();
            let verdict =
                gate.evaluate(req.uri().path(), req.method(), req.headers(), peer).await;
            match verdict {
                Ok(admission) => {
                    let mut response = inner.call(req).await?;
                    apply_rate_headers(response.headers_mut(), &admission);
                    Ok(response)
                }
                Err(rejection) => Ok(rejection_response(&rejection)),
            }
        })
    }
}

/// Attach `X-RateLimit-*` headers for a counted request.
pub fn apply_rate_headers(headers: &mut HeaderMap, admission: &Admission) {
    if let Some(status) = admission.rate_status() {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(status.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(status.remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(status.reset_at));
    }
}

/// Status, title and message shown to the client for a rejection.
pub fn rejection_parts(rejection: &GateError) -> (StatusCode, &'static str, String) {
    match rejection {
        GateError::Banned { newly_issued: true, .. } => (
            StatusCode::FORBIDDEN,
            "Access blocked",
            "Your access has been blocked due to excessive requests. This may indicate automated abuse."
                .to_string(),
        ),
        GateError::Banned { .. } => (
            StatusCode::FORBIDDEN,
            "Access temporarily blocked",
            "Your access has been temporarily restricted due to suspicious activity. Please try again later."
                .to_string(),
        ),
        GateError::CooldownActive { retry_after_secs, .. } => (
            StatusCode::TOO_MANY_REQUESTS,
            "Cooldown active",
            format!("Please wait {} seconds before submitting another report.", retry_after_secs),
        ),
        GateError::RateLimitExceeded { retry_after_secs, .. } => (
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests",
            format!(
                "Rate limit exceeded. Please try again in {} minutes.",
                retry_after_secs.div_ceil(60)
            ),
        ),
    }
}

/// Render a rejection as a JSON response: `{"error", "message", "retryAfter"}` plus
/// `Retry-After` (and `X-RateLimit-*` for quota rejections).
pub fn rejection_response<B: From<String>>(rejection: &GateError) -> Response<B> {
    let (status, title, message) = rejection_parts(rejection);
    let retry_after = rejection.retry_after_secs();
    let body = json!({
        "error": title,
        "message": message,
        "retryAfter": retry_after,
    })
    .to_string();

    let mut response = Response::new(B::from(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
    if let GateError::RateLimitExceeded { limit, reset_at_millis, .. } = rejection {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(*limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(0u32));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(*reset_at_millis));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ActionCategory;

    #[test]
    fn rate_limit_response_carries_quota_headers() {
        let rejection = GateError::RateLimitExceeded {
            action: ActionCategory::Search,
            limit: 60,
            retry_after_secs: 61,
            reset_at_millis: 1_700_000_000_000,
        };
        let response: Response<String> = rejection_response(&rejection);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "61");
        assert_eq!(response.headers()[X_RATELIMIT_REMAINING], "0");
        assert_eq!(response.headers()[X_RATELIMIT_RESET], "1700000000000");

        let body: serde_json::Value = serde_json::from_str(response.body()).unwrap();
        assert_eq!(body["error"], "Too many requests");
        assert_eq!(body["retryAfter"], 61);
        assert_eq!(body["message"], "Rate limit exceeded. Please try again in 2 minutes.");
    }

    #[test]
    fn bans_are_forbidden() {
        let fresh = GateError::Banned { retry_after_secs: 86_400, newly_issued: true };
        let response: Response<String> = rejection_response(&fresh);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()[RETRY_AFTER], "86400");
        assert!(response.headers().get(X_RATELIMIT_LIMIT).is_none());
        assert!(response.body().contains("Access blocked"));

        let standing = GateError::Banned { retry_after_secs: 30, newly_issued: false };
        let (_, title, _) = rejection_parts(&standing);
        assert_eq!(title, "Access temporarily blocked");
    }

    #[test]
    fn cooldown_message_names_the_wait() {
        let rejection =
            GateError::CooldownActive { action: ActionCategory::Submit, retry_after_secs: 42 };
        let (status, _, message) = rejection_parts(&rejection);
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(message, "Please wait 42 seconds before submitting another report.");
    }
}
