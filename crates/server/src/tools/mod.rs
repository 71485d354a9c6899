//! MCP tool implementations.
//!
//! This module contains all tools exposed by the aula worker host.

pub mod cache;
pub mod worker;
