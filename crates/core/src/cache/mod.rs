//! SQLite-backed store for named cache partitions.
//!
//! Every partition lives in the same database; an entry belongs to exactly
//! one partition and is keyed by a hash of method + normalized URL. It
//! supports:
//!
//! - Lazily created partitions with optional entry-count and age bounds
//! - Last-write-wins overwrites on revalidation
//! - Expiration sweeps (age first, then oldest-stored beyond the cap)
//! - Automatic schema migrations, WAL mode for concurrent access

pub mod connection;
pub mod entries;
pub mod expiration;
pub mod hash;
pub mod migrations;
pub mod partition;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::StoredEntry;
pub use expiration::ExpirationReport;
pub use partition::{ExpirationPolicy, Partition, PartitionStats};
