//! cache_get tool implementation.
//!
//! Reads one stored response from a partition without touching the network.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use aula_client::fetch::resolve;
use aula_core::Error;

use crate::runtime::Runtime;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Partition name (pages, static-resources, fonts, api-cache, course-images, precache).
    pub partition: String,

    /// Stored URL; paths resolve against the configured origin. Precache
    /// entries with a revision are stored as `url?__rev=<revision>`.
    pub url: String,

    /// Request method the entry was stored under (default: GET).
    #[serde(default)]
    pub method: Option<String>,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub partition: String,
    pub url: String,
    pub response_url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Body as UTF-8 (lossy).
    pub body: String,
    /// RFC 3339 storage time.
    pub stored_at: String,
    /// Whether the partition's max age has passed; expired entries are never served.
    pub expired: bool,
    pub revision: Option<String>,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(runtime: &Runtime, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let partition = runtime.partition(&params.partition)?;
    let base = runtime
        .config
        .origin_url()
        .map_err(|e| Error::InvalidInput(e.to_string()))?;
    let url = resolve(&base, &params.url).map_err(|e| Error::InvalidUrl(format!("{}: {e}", params.url)))?;
    let method = params.method.as_deref().unwrap_or("GET").to_ascii_uppercase();

    let entry = runtime
        .cache()
        .get_entry(partition.name(), &method, url.as_str())
        .await?
        .ok_or_else(|| Error::CacheMiss(format!("{} in {}", url, partition.name())))?;

    let output = CacheGetOutput {
        partition: partition.name().to_string(),
        url: entry.url.clone(),
        response_url: entry.response.url.clone(),
        status: entry.response.status,
        headers: entry.response.headers.clone(),
        body: entry.response.text_lossy(),
        stored_at: entry.stored_at.to_rfc3339(),
        expired: partition.policy().is_expired(entry.stored_at, runtime.host.context().clock.now()),
        revision: entry.revision,
    };

    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize entry: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
