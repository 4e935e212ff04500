//! Request classification.
//!
//! Rules are evaluated top to bottom and the first match decides the route.
//! Requests with a non-http(s) scheme never reach the rules.

use safenest_core::Partition;
use serde::Serialize;

use super::strategy::Strategy;
use crate::fetch::{FetchRequest, is_http};

/// Where an intercepted request is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Api,
    Static,
    Html,
    Default,
}

impl Route {
    pub fn strategy(self) -> Strategy {
        match self {
            Route::Api | Route::Static => Strategy::CacheFirst,
            Route::Html | Route::Default => Strategy::NetworkFirst,
        }
    }

    /// Partition the route reads from and writes to.
    pub fn partition(self) -> Partition {
        match self {
            Route::Api => Partition::Api,
            Route::Static => Partition::Static,
            Route::Html | Route::Default => Partition::General,
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Api => write!(f, "api"),
            Route::Static => write!(f, "static"),
            Route::Html => write!(f, "html"),
            Route::Default => write!(f, "default"),
        }
    }
}

/// Predicate half of a routing rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    PathPrefix(String),
    StaticAsset,
    AcceptsHtml,
    Always,
}

impl Rule {
    fn matches(&self, request: &FetchRequest) -> bool {
        match self {
            Rule::PathPrefix(prefix) => request.url.path().starts_with(prefix.as_str()),
            Rule::StaticAsset => request.destination.is_static_asset(),
            Rule::AcceptsHtml => request.accepts_html(),
            Rule::Always => true,
        }
    }
}

/// Ordered (predicate, route) table.
#[derive(Debug, Clone)]
pub struct Router {
    rules: Vec<(Rule, Route)>,
}

impl Router {
    /// Build the standard table with the given API namespace prefix.
    pub fn new(api_prefix: impl Into<String>) -> Self {
        Self {
            rules: vec![
                (Rule::PathPrefix(api_prefix.into()), Route::Api),
                (Rule::StaticAsset, Route::Static),
                (Rule::AcceptsHtml, Route::Html),
                (Rule::Always, Route::Default),
            ],
        }
    }

    pub fn rules(&self) -> &[(Rule, Route)] {
        &self.rules
    }

    /// Pick the route for a request.
    ///
    /// Returns None when the request must pass through unhandled.
    pub fn classify(&self, request: &FetchRequest) -> Option<Route> {
        if !is_http(&request.url) {
            return None;
        }

        self.rules
            .iter()
            .find(|(rule, _)| rule.matches(request))
            .map(|(_, route)| *route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::Destination;
    use url::Url;

    fn request(url: &str) -> FetchRequest {
        FetchRequest::get(Url::parse(url).unwrap())
    }

    fn router() -> Router {
        Router::new("/api/")
    }

    #[test]
    fn test_non_http_passes_through() {
        assert_eq!(router().classify(&request("chrome-extension://abc/content.js")), None);
        assert_eq!(router().classify(&request("data:text/plain,hello")), None);
    }

    #[test]
    fn test_api_prefix() {
        let route = router().classify(&request("https://home.example.com/api/devices")).unwrap();
        assert_eq!(route, Route::Api);
        assert_eq!(route.strategy(), Strategy::CacheFirst);
        assert_eq!(route.partition(), Partition::Api);
    }

    #[test]
    fn test_api_prefix_beats_destination_and_accept() {
        let req = request("https://home.example.com/api/camera.jpg")
            .with_destination(Destination::Image)
            .with_accept("text/html");
        assert_eq!(router().classify(&req), Some(Route::Api));
    }

    #[test]
    fn test_static_destinations() {
        for destination in [Destination::Script, Destination::Style, Destination::Image] {
            let req = request("https://home.example.com/static/x").with_destination(destination);
            assert_eq!(router().classify(&req), Some(Route::Static));
        }
    }

    #[test]
    fn test_static_beats_html_accept() {
        let req = request("https://home.example.com/static/logo.svg")
            .with_destination(Destination::Image)
            .with_accept("text/html,image/*");
        assert_eq!(router().classify(&req), Some(Route::Static));
    }

    #[test]
    fn test_html_navigation() {
        let req = FetchRequest::navigate(Url::parse("https://home.example.com/devices").unwrap());
        let route = router().classify(&req).unwrap();
        assert_eq!(route, Route::Html);
        assert_eq!(route.strategy(), Strategy::NetworkFirst);
        assert_eq!(route.partition(), Partition::General);
    }

    #[test]
    fn test_default_route() {
        let req = request("https://home.example.com/static/fonts/inter.woff2").with_destination(Destination::Font);
        assert_eq!(router().classify(&req), Some(Route::Default));
        assert_eq!(Route::Default.strategy(), Strategy::NetworkFirst);
    }

    #[test]
    fn test_prefix_is_path_only() {
        let req = request("https://home.example.com/dashboard?next=/api/devices");
        assert_eq!(router().classify(&req), Some(Route::Default));
    }

    #[test]
    fn test_rule_order() {
        let routes: Vec<Route> = router().rules().iter().map(|(_, route)| *route).collect();
        assert_eq!(routes, vec![Route::Api, Route::Static, Route::Html, Route::Default]);
    }
}
