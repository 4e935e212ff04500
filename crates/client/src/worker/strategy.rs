//! Cache-first and network-first executors.

use safenest_core::{CacheDb, CacheEntry, CacheNames, CachedResponse, Error, Partition};
use serde::Serialize;

use super::router::Route;
use super::writer::CacheWriter;
use crate::fetch::{FetchRequest, Network};

/// How a route balances cache and network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Serve from cache when present; network only on miss.
    CacheFirst,
    /// Always try the network; cache only when it fails.
    NetworkFirst,
}

/// Where the returned response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Cache,
    Network,
    /// Synthesized by the coordinator because the network was unreachable.
    Offline,
}

/// Result of handling one fetch event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub response: CachedResponse,
    pub source: ResponseSource,
    /// None when the request passed through unhandled.
    pub route: Option<Route>,
}

/// Collaborators a strategy needs; borrowed from the coordinator per event.
pub(crate) struct StrategyContext<'a> {
    pub cache: &'a CacheDb,
    pub network: &'a dyn Network,
    pub writer: &'a CacheWriter,
    pub caches: &'a CacheNames,
    pub offline_message: &'a str,
}

impl Strategy {
    pub(crate) async fn execute(
        self, ctx: &StrategyContext<'_>, request: &FetchRequest, route: Route,
    ) -> Result<FetchOutcome, Error> {
        match self {
            Strategy::CacheFirst => cache_first(ctx, request, route).await,
            Strategy::NetworkFirst => network_first(ctx, request, route).await,
        }
    }
}

/// The JSON body returned for API requests while offline.
pub fn offline_response(url: &str, message: &str) -> CachedResponse {
    CachedResponse::json(url, 503, &serde_json::json!({ "error": "Offline", "message": message }))
}

fn outcome(response: CachedResponse, source: ResponseSource, route: Route) -> FetchOutcome {
    FetchOutcome { response, source, route: Some(route) }
}

fn store_copy(ctx: &StrategyContext<'_>, request: &FetchRequest, partition: &str, response: &CachedResponse) {
    if request.is_cacheable() && response.is_success() {
        ctx.writer.store(CacheEntry::new(
            partition,
            request.method.as_str(),
            request.cache_url(),
            response.clone(),
        ));
    }
}

async fn cache_first(ctx: &StrategyContext<'_>, request: &FetchRequest, route: Route) -> Result<FetchOutcome, Error> {
    let partition = ctx.caches.name(route.partition());
    let url = request.cache_url();

    if request.is_cacheable() {
        match ctx.cache.match_entry(partition, request.method.as_str(), url).await {
            Ok(Some(entry)) => {
                tracing::debug!(partition, "cache hit for {}", url);
                return Ok(outcome(entry.response, ResponseSource::Cache, route));
            }
            Ok(None) => tracing::debug!(partition, "cache miss for {}", url),
            Err(e) => tracing::warn!(partition, "cache read failed for {}, treating as miss: {e}", url),
        }
    }

    match ctx.network.fetch(request).await {
        Ok(response) => {
            store_copy(ctx, request, partition, &response);
            Ok(outcome(response, ResponseSource::Network, route))
        }
        Err(e) if route == Route::Api && e.is_network_failure() => {
            tracing::warn!("network failed for {}, serving offline response: {e}", url);
            Ok(outcome(offline_response(url, ctx.offline_message), ResponseSource::Offline, route))
        }
        Err(e) => {
            tracing::debug!("network failed for {} with no cached copy: {e}", url);
            Err(e)
        }
    }
}

async fn network_first(
    ctx: &StrategyContext<'_>, request: &FetchRequest, route: Route,
) -> Result<FetchOutcome, Error> {
    let partition = ctx.caches.name(route.partition());
    let url = request.cache_url();

    let err = match ctx.network.fetch(request).await {
        Ok(response) => {
            store_copy(ctx, request, partition, &response);
            return Ok(outcome(response, ResponseSource::Network, route));
        }
        Err(e) => e,
    };

    if request.is_cacheable() && err.is_network_failure() {
        let fallback = [
            ctx.caches.name(Partition::General),
            ctx.caches.name(Partition::Static),
            ctx.caches.name(Partition::Api),
        ];
        match ctx.cache.match_in(&fallback, request.method.as_str(), url).await {
            Ok(Some(entry)) => {
                tracing::debug!(partition = %entry.partition, "network failed for {}, serving cached copy: {err}", url);
                return Ok(outcome(entry.response, ResponseSource::Cache, route));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("cache read failed for {}: {e}", url),
        }
    }

    tracing::debug!("network failed for {} with no cached copy: {err}", url);
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_response_shape() {
        let response = offline_response("https://home.example.com/api/devices", "No connection");
        assert_eq!(response.status, 503);
        assert_eq!(response.content_type(), Some("application/json"));

        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body, serde_json::json!({ "error": "Offline", "message": "No connection" }));
    }

    #[test]
    fn test_strategy_serialization() {
        assert_eq!(serde_json::to_string(&Strategy::CacheFirst).unwrap(), r#""cache-first""#);
        assert_eq!(serde_json::to_string(&ResponseSource::Offline).unwrap(), r#""offline""#);
    }
}
