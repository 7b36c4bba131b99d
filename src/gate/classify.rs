use hyper::Method;

use crate::policy::ActionCategory;

/// Default prefix under which requests are gated.
pub const DEFAULT_API_PREFIX: &str = "/api/";

/// Default prefixes that bypass the gate entirely (stats, and admin which has its own
/// authorization).
pub const DEFAULT_EXEMPT_PREFIXES: [&str; 2] = ["/api/stats", "/api/admin"];

/// Where a request falls in the abuse-control scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Bypasses every check.
    Exempt,
    /// Gated path without a known action: ban check only.
    Unmetered,
    /// Gated action with window accounting.
    Action(ActionCategory),
}

/// A classified request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Route of the request.
    pub route: Route,
    /// State-changing method (`POST`); only these are subject to cooldowns.
    pub cooldown_eligible: bool,
}

/// Maps a request path and method onto a [`Route`].
///
/// Allow-list: only actions with a known category are metered.
#[derive(Debug, Clone)]
pub struct RouteClassifier {
    api_prefix: String,
    exempt_prefixes: Vec<String>,
}

impl Default for RouteClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_API_PREFIX, DEFAULT_EXEMPT_PREFIXES.iter().map(|p| p.to_string()))
    }
}

impl RouteClassifier {
    /// Classifier gating paths under `api_prefix`, minus `exempt_prefixes`.
    pub fn new(api_prefix: impl Into<String>, exempt_prefixes: impl IntoIterator<Item = String>) -> Self {
        let mut api_prefix = api_prefix.into();
        if !api_prefix.ends_with('/') {
            api_prefix.push('/');
        }
        Self { api_prefix, exempt_prefixes: exempt_prefixes.into_iter().collect() }
    }

    /// Classify a request.
    pub fn classify(&self, path: &str, method: &Method) -> Classification {
        Classification { route: self.route(path), cooldown_eligible: *method == Method::POST }
    }

    fn route(&self, path: &str) -> Route {
        let Some(rest) = path.strip_prefix(self.api_prefix.as_str()) else {
            return Route::Exempt;
        };
        if self.exempt_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str())) {
            return Route::Exempt;
        }
        let segment = rest.split('/').next().unwrap_or_default();
        match ActionCategory::from_segment(segment) {
            Some(action) => Route::Action(action),
            None => Route::Unmetered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(path: &str) -> Route {
        RouteClassifier::default().classify(path, &Method::GET).route
    }

    #[test]
    fn maps_action_segments() {
        assert_eq!(route("/api/search"), Route::Action(ActionCategory::Search));
        assert_eq!(route("/api/submit/"), Route::Action(ActionCategory::Submit));
        assert_eq!(route("/api/analyze-report"), Route::Action(ActionCategory::AnalyzeReport));
        assert_eq!(route("/api/dispute/123"), Route::Action(ActionCategory::Dispute));
    }

    #[test]
    fn exempts_non_api_and_privileged_paths() {
        assert_eq!(route("/"), Route::Exempt);
        assert_eq!(route("/search"), Route::Exempt);
        assert_eq!(route("/api/stats"), Route::Exempt);
        assert_eq!(route("/api/admin/reports"), Route::Exempt);
    }

    #[test]
    fn unknown_api_paths_are_unmetered() {
        assert_eq!(route("/api/whatever"), Route::Unmetered);
        assert_eq!(route("/api/"), Route::Unmetered);
    }

    #[test]
    fn only_post_is_cooldown_eligible() {
        let c = RouteClassifier::default();
        assert!(c.classify("/api/submit", &Method::POST).cooldown_eligible);
        assert!(!c.classify("/api/submit", &Method::GET).cooldown_eligible);
    }

    #[test]
    fn custom_prefix_is_normalized() {
        let c = RouteClassifier::new("/v2", Vec::new());
        assert_eq!(c.classify("/v2/extract", &Method::POST).route, Route::Action(ActionCategory::Extract));
        assert_eq!(c.classify("/api/extract", &Method::POST).route, Route::Exempt);
    }
}
