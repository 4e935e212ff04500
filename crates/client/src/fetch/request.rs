//! Intercepted request model.

use reqwest::Method;
use url::{Position, Url};

/// Kind of resource the page asked for.
///
/// Mirrors the fetch destination of the browser request; only the variants
/// the router distinguishes get their own case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    Document,
    Script,
    Style,
    Image,
    Font,
    /// No destination (fetch()/XHR calls).
    #[default]
    Empty,
    Other,
}

impl Destination {
    /// Parse a destination name; unknown names map to `Other`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" => Destination::Document,
            "script" => Destination::Script,
            "style" => Destination::Style,
            "image" => Destination::Image,
            "font" => Destination::Font,
            "" => Destination::Empty,
            _ => Destination::Other,
        }
    }

    /// Scripts, stylesheets and images are served from the static partition.
    pub fn is_static_asset(&self) -> bool {
        matches!(self, Destination::Script | Destination::Style | Destination::Image)
    }
}

/// A request delivered to the coordinator by a fetch event.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub destination: Destination,
    /// Accept header, if the page sent one.
    pub accept: Option<String>,
    /// Page client that issued the request.
    pub client_id: Option<String>,
}

impl FetchRequest {
    /// A plain GET with no destination. The fragment is dropped.
    pub fn get(mut url: Url) -> Self {
        url.set_fragment(None);
        Self { method: Method::GET, url, destination: Destination::Empty, accept: None, client_id: None }
    }

    /// A top-level navigation to an HTML document.
    pub fn navigate(url: Url) -> Self {
        Self {
            destination: Destination::Document,
            accept: Some("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string()),
            ..Self::get(url)
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Only reads are ever stored or served from cache.
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET
    }

    /// URL the cache is keyed by: everything up to and including the query.
    pub fn cache_url(&self) -> &str {
        &self.url[..Position::AfterQuery]
    }

    pub fn accepts_html(&self) -> bool {
        self.accept.as_deref().is_some_and(|accept| accept.contains("text/html"))
    }
}
