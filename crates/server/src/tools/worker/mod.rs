//! Worker-related MCP tools.

pub mod fetch;
pub mod message;
pub mod status;

pub use fetch::{WorkerFetchParams, fetch_impl};
pub use message::{WorkerMessageParams, message_impl};
pub use status::{status_impl, update_impl};
