//! worker_message tool implementation.
//!
//! Posts a page message to a worker, e.g. `{"type": "SKIP_WAITING"}` to the
//! waiting worker.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use aula_client::{WorkerHost, WorkerId, WorkerMessage};
use aula_core::Error;

use crate::runtime::Runtime;

/// Input parameters for the worker_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerMessageParams {
    /// Target worker id. Defaults to the waiting worker.
    #[serde(default)]
    pub worker: Option<u64>,

    /// The message object, e.g. {"type": "SKIP_WAITING"}.
    pub message: serde_json::Value,
}

/// Output structure for the worker_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerMessageOutput {
    pub worker: u64,
    /// False when the message type is unknown and was ignored.
    pub delivered: bool,
    /// Id of the active worker after delivery.
    pub active: Option<u64>,
}

/// Implementation of the worker_message tool.
pub async fn message_impl(runtime: &Runtime, params: WorkerMessageParams) -> Result<CallToolResult, McpError> {
    let worker = match params.worker {
        Some(id) => WorkerId(id),
        None => runtime
            .host
            .waiting()
            .map(|worker| worker.id())
            .ok_or_else(|| Error::InvalidState("no waiting worker".into()))?,
    };

    let delivered = match WorkerMessage::from_json(&params.message.to_string())? {
        Some(message) => {
            runtime.host.post_message(worker, message).await?;
            true
        }
        None => false,
    };

    let output = WorkerMessageOutput { worker: worker.0, delivered, active: runtime.host.active().map(|w| w.id().0) };
    let json =
        serde_json::to_string_pretty(&output).map_err(|e| Error::InvalidInput(format!("Failed to serialize: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
