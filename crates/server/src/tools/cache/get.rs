//! cache_get tool implementation.
//!
//! Retrieves a stored response by partition, method and URL.

use std::collections::BTreeMap;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use safenest_client::Coordinator;
use safenest_core::Error;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Partition name, e.g. "safenest-api-v1.0.0".
    pub partition: String,

    /// Absolute URL or a path resolved against the dashboard origin.
    pub url: String,

    /// Request method the entry was stored under (default: GET).
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_method() -> String {
    "GET".into()
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize)]
pub struct CacheGetOutput {
    pub partition: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Body decoded as UTF-8, lossy.
    pub body: String,
    pub stored_at: String,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(coordinator: &Coordinator, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let url = coordinator.resolve(&params.url)?;
    let entry = coordinator
        .cache()
        .match_entry(&params.partition, &params.method, url.as_str())
        .await?
        .ok_or_else(|| Error::CacheMiss(format!("{} {} in {}", params.method, url, params.partition)))?;

    let output = CacheGetOutput {
        body: entry.response.text(),
        partition: entry.partition,
        method: entry.method,
        url: entry.url,
        status: entry.response.status,
        headers: entry.response.headers,
        stored_at: entry.stored_at,
    };
    json_result(&output)
}
