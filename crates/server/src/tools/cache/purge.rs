//! cache_purge tool implementation.
//!
//! Trims a partition by URL pattern or count.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use safenest_client::Coordinator;
use safenest_core::Error;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Partition to trim.
    pub partition: String,

    /// Purge entries whose URL contains this pattern.
    pub url_contains: Option<String>,

    /// Keep only the newest N entries (LRU purge).
    pub max_entries: Option<usize>,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of entries deleted.
    pub deleted: u64,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(coordinator: &Coordinator, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    if params.url_contains.is_none() && params.max_entries.is_none() {
        return Err(Error::InvalidInput("At least one of url_contains or max_entries must be specified".to_string()).into());
    }

    let cache = coordinator.cache();
    let mut deleted_total = 0u64;

    if let Some(pattern) = params.url_contains {
        deleted_total += cache.purge_entries_matching(&params.partition, &pattern).await?;
    }

    if let Some(max_entries) = params.max_entries {
        deleted_total += cache.purge_lru_entries(&params.partition, max_entries).await?;
    }

    tracing::info!(partition = %params.partition, deleted = deleted_total, "purged cache entries");
    json_result(&CachePurgeOutput { deleted: deleted_total })
}
