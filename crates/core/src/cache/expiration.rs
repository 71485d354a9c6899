//! Expiration sweeps.
//!
//! A sweep first deletes entries older than the partition's max age, then
//! deletes the oldest-stored entries beyond its max entry count.

use super::connection::CacheDb;
use super::partition::Partition;
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

/// Entries removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ExpirationReport {
    /// Removed for exceeding the max age.
    pub expired: u64,
    /// Removed for exceeding the max entry count.
    pub evicted: u64,
}

impl ExpirationReport {
    pub fn total(&self) -> u64 {
        self.expired + self.evicted
    }
}

impl CacheDb {
    /// Apply the partition's eviction policy as of `now`.
    pub async fn apply_expiration(&self, partition: &Partition, now: DateTime<Utc>) -> Result<ExpirationReport, Error> {
        let policy = *partition.policy();
        if policy.is_unbounded() {
            return Ok(ExpirationReport::default());
        }

        let name = partition.name().to_string();
        let cutoff_ms = policy.max_age.map(|max_age| (now - max_age).timestamp_millis());
        let max_entries = policy.max_entries.map(|max| max as i64);

        let report = self
            .conn
            .call(move |conn| -> Result<ExpirationReport, Error> {
                let tx = conn.transaction()?;
                let mut report = ExpirationReport::default();

                if let Some(cutoff_ms) = cutoff_ms {
                    let expired = tx.execute(
                        "DELETE FROM entries WHERE partition = ?1 AND stored_at < ?2",
                        params![&name, cutoff_ms],
                    )?;
                    report.expired = expired as u64;
                }

                if let Some(max_entries) = max_entries {
                    let evicted = tx.execute(
                        "DELETE FROM entries WHERE id IN (
                            SELECT id FROM entries WHERE partition = ?1
                            ORDER BY stored_at DESC, id DESC
                            LIMIT -1 OFFSET ?2
                        )",
                        params![&name, max_entries],
                    )?;
                    report.evicted = evicted as u64;
                }

                tx.commit()?;
                Ok(report)
            })
            .await
            .map_err(Error::from)?;

        if report.total() > 0 {
            tracing::debug!(
                partition = partition.name(),
                expired = report.expired,
                evicted = report.evicted,
                "expiration sweep removed entries"
            );
        }

        Ok(report)
    }
}
