//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::runtime::Runtime;
use crate::tools::cache::{CacheGetParams, CachePurgeParams, get_impl, partitions_impl, purge_impl};
use crate::tools::worker::{WorkerFetchParams, WorkerMessageParams, fetch_impl, message_impl, status_impl, update_impl};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for the aula worker host.
#[derive(Clone)]
pub struct AulaServer {
    tool_router: ToolRouter<Self>,
    runtime: Arc<Runtime>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl AulaServer {
    /// Create a new server handler.
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { tool_router: Self::tool_router(), runtime }
    }

    #[tool(
        description = "Run a request through the active worker (route table, caching strategies, root document fallback). Returns status, headers, body and the matched route."
    )]
    async fn worker_fetch(&self, params: Parameters<WorkerFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.runtime, params.0).await
    }

    #[tool(description = "Show the installing, waiting and active worker slots.")]
    async fn worker_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.runtime).await
    }

    /// Re-register the worker script.
    ///
    /// An unchanged script is a no-op; a changed one installs a new worker that
    /// waits behind the active worker.
    #[tool(description = "Re-register the worker script. A changed precache manifest installs a new waiting worker.")]
    async fn worker_update(&self) -> Result<CallToolResult, McpError> {
        update_impl(&self.runtime).await
    }

    #[tool(
        description = "Post a message to a worker (default: the waiting worker). {\"type\": \"SKIP_WAITING\"} activates a waiting worker."
    )]
    async fn worker_message(&self, params: Parameters<WorkerMessageParams>) -> Result<CallToolResult, McpError> {
        message_impl(&self.runtime, params.0).await
    }

    #[tool(description = "Read one stored response from a cache partition. No network requests are made.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.runtime, params.0).await
    }

    #[tool(description = "Run a partition's expiration sweep now, or clear the partition entirely.")]
    async fn cache_purge(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(&self.runtime, params.0).await
    }

    #[tool(description = "List cache partitions with their bounds and entry counts.")]
    async fn cache_partitions(&self) -> Result<CallToolResult, McpError> {
        partitions_impl(&self.runtime).await
    }
}

impl ServerHandler for AulaServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "aula-worker".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::{StubNetwork, runtime};

    #[tokio::test]
    async fn test_lists_every_tool() {
        let server = AulaServer::new(Arc::new(runtime(StubNetwork::default()).await));
        let mut names: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "cache_get",
                "cache_partitions",
                "cache_purge",
                "worker_fetch",
                "worker_message",
                "worker_status",
                "worker_update"
            ]
        );
    }
}
