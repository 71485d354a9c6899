//! Partition identities, bounds and the partition registry.

use super::connection::CacheDb;
use crate::Error;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

/// Partition names persisted on disk; stable across worker versions.
pub mod names {
    pub const PAGES: &str = "pages";
    pub const STATIC_RESOURCES: &str = "static-resources";
    pub const FONTS: &str = "fonts";
    pub const API_CACHE: &str = "api-cache";
    pub const COURSE_IMAGES: &str = "course-images";
    pub const PRECACHE: &str = "precache";
}

/// Eviction bounds of a partition. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpirationPolicy {
    pub max_entries: Option<usize>,
    pub max_age: Option<Duration>,
}

impl ExpirationPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn new(max_entries: usize, max_age: Duration) -> Self {
        Self { max_entries: Some(max_entries), max_age: Some(max_age) }
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_entries.is_none() && self.max_age.is_none()
    }

    /// Whether an entry stored at `stored_at` is past `max_age` at `now`.
    pub fn is_expired(&self, stored_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.max_age.is_some_and(|max_age| stored_at < now - max_age)
    }
}

/// A named cache partition and its eviction policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    name: String,
    policy: ExpirationPolicy,
}

impl Partition {
    pub fn new(name: impl Into<String>, policy: ExpirationPolicy) -> Self {
        Self { name: name.into(), policy }
    }

    pub fn unbounded(name: impl Into<String>) -> Self {
        Self::new(name, ExpirationPolicy::unbounded())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &ExpirationPolicy {
        &self.policy
    }
}

/// Entry count of a stored partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PartitionStats {
    pub name: String,
    pub entries: u64,
    /// RFC 3339 creation time.
    pub created_at: String,
}

impl CacheDb {
    /// Whether a partition has been created (by a first write).
    pub async fn has_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM partitions WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Stored partitions in creation order.
    pub async fn partition_stats(&self) -> Result<Vec<PartitionStats>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<PartitionStats>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT p.name, p.created_at, COUNT(e.id)
                     FROM partitions p LEFT JOIN entries e ON e.partition = p.name
                     GROUP BY p.name
                     ORDER BY p.created_at ASC, p.rowid ASC",
                )?;
                let rows = stmt.query_map([], |row| {
                    let created_ms: i64 = row.get(1)?;
                    let entries: i64 = row.get(2)?;
                    Ok(PartitionStats {
                        name: row.get(0)?,
                        entries: entries as u64,
                        created_at: DateTime::from_timestamp_millis(created_ms)
                            .unwrap_or_default()
                            .to_rfc3339(),
                    })
                })?;

                let mut stats = Vec::new();
                for row in rows {
                    stats.push(row?);
                }
                Ok(stats)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a partition and all its entries.
    ///
    /// Returns the number of deleted entries; 0 if the partition did not exist.
    pub async fn delete_partition(&self, name: &str) -> Result<u64, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let deleted = tx.execute("DELETE FROM entries WHERE partition = ?1", params![name])?;
                tx.execute("DELETE FROM partitions WHERE name = ?1", params![name])?;
                tx.commit()?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_expiry_boundary() {
        let policy = ExpirationPolicy::new(100, Duration::minutes(5));
        let now = Utc::now();
        assert!(!policy.is_expired(now - Duration::minutes(5), now));
        assert!(policy.is_expired(now - Duration::minutes(6), now));
        assert!(!ExpirationPolicy::unbounded().is_expired(now - Duration::days(365), now));
    }

    #[test]
    fn test_unbounded() {
        assert!(Partition::unbounded(names::STATIC_RESOURCES).policy().is_unbounded());
        assert!(!ExpirationPolicy::new(30, Duration::days(30)).is_unbounded());
    }

    #[tokio::test]
    async fn test_partition_absent_until_first_write() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(!db.has_partition(names::FONTS).await.unwrap());
        assert!(db.partition_stats().await.unwrap().is_empty());
        assert_eq!(db.delete_partition(names::FONTS).await.unwrap(), 0);
    }
}
