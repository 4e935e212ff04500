//! cache_list tool implementation.
//!
//! Lists stored partitions with entry counts, flagging stale versions.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use safenest_client::{Coordinator, WorkerState};
use safenest_core::PartitionStats;
use serde::Serialize;

use crate::tools::json_result;

#[derive(Debug, Clone, Serialize)]
pub struct PartitionView {
    #[serde(flatten)]
    pub stats: PartitionStats,
    /// False for partitions left over from another version.
    pub current: bool,
}

/// Output from the cache_list tool.
#[derive(Debug, Clone, Serialize)]
pub struct CacheListOutput {
    pub state: WorkerState,
    pub partitions: Vec<PartitionView>,
    /// Background writes that failed, oldest first.
    pub write_failures: usize,
}

pub async fn list_impl(coordinator: &Coordinator) -> Result<CallToolResult, McpError> {
    let caches = &coordinator.config().caches;
    let partitions = coordinator
        .cache()
        .partition_stats()
        .await?
        .into_iter()
        .map(|stats| {
            let current = caches.is_current(&stats.name);
            PartitionView { stats, current }
        })
        .collect();

    let output = CacheListOutput {
        state: coordinator.state(),
        partitions,
        write_failures: coordinator.write_failures().len(),
    };
    json_result(&output)
}
