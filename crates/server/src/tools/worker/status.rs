//! worker_status and worker_update tool implementations.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use aula_client::{HostStatus, RegistrationOutcome, WorkerSummary};
use aula_core::Error;

use crate::runtime::Runtime;

/// One worker slot.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerSlot {
    pub id: u64,
    /// installing, installed, activating, activated or redundant.
    pub state: String,
    /// Hash of the worker script version.
    pub script_hash: String,
    /// Number of precache manifest entries.
    pub precached: usize,
}

impl From<WorkerSummary> for WorkerSlot {
    fn from(summary: WorkerSummary) -> Self {
        let state = serde_json::to_value(summary.state)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default();
        Self { id: summary.id.0, state, script_hash: summary.script_hash, precached: summary.precached }
    }
}

/// Output structure for the worker_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerStatusOutput {
    pub script_path: String,
    pub origin: String,
    pub installing: Option<WorkerSlot>,
    pub waiting: Option<WorkerSlot>,
    pub active: Option<WorkerSlot>,
}

impl WorkerStatusOutput {
    fn new(runtime: &Runtime, status: HostStatus) -> Self {
        Self {
            script_path: runtime.config.script_path.clone(),
            origin: runtime.config.origin.clone(),
            installing: status.installing.map(WorkerSlot::from),
            waiting: status.waiting.map(WorkerSlot::from),
            active: status.active.map(WorkerSlot::from),
        }
    }
}

/// Output structure for the worker_update tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerUpdateOutput {
    /// unchanged, activated or waiting.
    pub outcome: String,
    /// The new worker, if one was installed.
    pub worker: Option<u64>,
    pub status: WorkerStatusOutput,
}

fn to_json<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json =
        serde_json::to_string_pretty(output).map_err(|e| Error::InvalidInput(format!("Failed to serialize: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Implementation of the worker_status tool.
pub async fn status_impl(runtime: &Runtime) -> Result<CallToolResult, McpError> {
    to_json(&WorkerStatusOutput::new(runtime, runtime.host.status()))
}

/// Implementation of the worker_update tool: re-register the worker script.
pub async fn update_impl(runtime: &Runtime) -> Result<CallToolResult, McpError> {
    let (outcome, worker) = match runtime.register().await? {
        RegistrationOutcome::Unchanged => ("unchanged", None),
        RegistrationOutcome::Activated(id) => ("activated", Some(id.0)),
        RegistrationOutcome::Waiting(id) => ("waiting", Some(id.0)),
    };

    to_json(&WorkerUpdateOutput {
        outcome: outcome.to_string(),
        worker,
        status: WorkerStatusOutput::new(runtime, runtime.host.status()),
    })
}
