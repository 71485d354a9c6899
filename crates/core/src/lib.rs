//! Core types and shared functionality for aula.
//!
//! This crate provides:
//! - Partitioned response store with SQLite backend
//! - Unified error types
//! - Configuration structures
//! - A clock abstraction for storage timestamps

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod response;

pub use cache::{CacheDb, ExpirationPolicy, ExpirationReport, Partition, PartitionStats, StoredEntry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, ConfigError, NavigationFallback};
pub use error::Error;
pub use response::Response;
