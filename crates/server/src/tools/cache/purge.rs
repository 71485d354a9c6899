//! cache_purge tool implementation.
//!
//! Runs a partition's expiration sweep on demand, or clears the partition.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use aula_core::Error;

use crate::runtime::Runtime;

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Partition name.
    pub partition: String,

    /// Delete every entry instead of only expired and over-limit ones.
    #[serde(default)]
    pub clear: bool,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    pub partition: String,
    /// Entries older than the partition's max age.
    pub expired: u64,
    /// Oldest entries beyond the partition's max entries.
    pub evicted: u64,
    /// Entries removed by `clear`.
    pub cleared: u64,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(runtime: &Runtime, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    let partition = runtime.partition(&params.partition)?;

    let output = if params.clear {
        let cleared = runtime.cache().delete_partition(partition.name()).await?;
        tracing::info!(partition = partition.name(), cleared, "partition cleared");
        CachePurgeOutput { partition: partition.name().to_string(), expired: 0, evicted: 0, cleared }
    } else {
        let now = runtime.host.context().clock.now();
        let report = runtime.cache().apply_expiration(partition, now).await?;
        CachePurgeOutput {
            partition: partition.name().to_string(),
            expired: report.expired,
            evicted: report.evicted,
            cleared: 0,
        }
    };

    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
