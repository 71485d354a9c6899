//! cache_partitions tool implementation.
//!
//! Lists every routed partition with its bounds and stored entry count.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use aula_core::Error;

use crate::runtime::Runtime;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PartitionInfo {
    pub name: String,
    /// Stored entries; 0 until the first write creates the partition.
    pub entries: u64,
    pub max_entries: Option<usize>,
    pub max_age_seconds: Option<i64>,
    /// RFC 3339 time of the first write.
    pub created_at: Option<String>,
}

/// Output from the cache_partitions tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePartitionsOutput {
    pub partitions: Vec<PartitionInfo>,
}

/// Implementation of the cache_partitions tool.
pub async fn partitions_impl(runtime: &Runtime) -> Result<CallToolResult, McpError> {
    let stored = runtime.cache().partition_stats().await?;

    let partitions = runtime
        .partitions()
        .iter()
        .map(|partition| {
            let stats = stored.iter().find(|stats| stats.name == partition.name());
            PartitionInfo {
                name: partition.name().to_string(),
                entries: stats.map_or(0, |stats| stats.entries),
                max_entries: partition.policy().max_entries,
                max_age_seconds: partition.policy().max_age.map(|age| age.num_seconds()),
                created_at: stats.map(|stats| stats.created_at.clone()),
            }
        })
        .collect();

    let json = serde_json::to_string_pretty(&CachePartitionsOutput { partitions })
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
