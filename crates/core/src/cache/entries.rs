//! Entry reads and writes within a partition.

use super::connection::CacheDb;
use super::hash::compute_cache_key;
use super::partition::Partition;
use crate::{Error, Response};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A response stored in a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// Request method the entry answers.
    pub method: String,
    /// Normalized request URL (the lookup key, not the response URL).
    pub url: String,
    pub response: Response,
    /// Precache revision, if the entry came from the manifest.
    pub revision: Option<String>,
    pub stored_at: DateTime<Utc>,
}

impl StoredEntry {
    pub fn new(url: impl Into<String>, response: Response, stored_at: DateTime<Utc>) -> Self {
        Self { method: "GET".into(), url: url.into(), response, revision: None, stored_at }
    }

    pub fn with_revision(mut self, revision: Option<String>) -> Self {
        self.revision = revision;
        self
    }
}

impl CacheDb {
    /// Store an entry, creating the partition on first write.
    ///
    /// An existing entry for the same key is replaced and counts as newly
    /// stored for eviction ordering.
    pub async fn put_entry(&self, partition: &str, entry: &StoredEntry) -> Result<(), Error> {
        let partition = partition.to_string();
        let entry = entry.clone();
        let headers_json = serde_json::to_string(&entry.response.headers)?;

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                let stored_ms = entry.stored_at.timestamp_millis();
                tx.execute(
                    "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
                    params![&partition, stored_ms],
                )?;
                tx.execute(
                    "INSERT OR REPLACE INTO entries (
                        partition, key_hash, method, url, status, status_text,
                        response_url, headers_json, body, revision, stored_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        &partition,
                        compute_cache_key(&entry.method, &entry.url),
                        &entry.method,
                        &entry.url,
                        entry.response.status,
                        &entry.response.status_text,
                        &entry.response.url,
                        &headers_json,
                        entry.response.body.as_ref(),
                        &entry.revision,
                        stored_ms,
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get an entry by method and URL, regardless of age.
    ///
    /// Returns None if the partition has no entry for the key.
    pub async fn get_entry(&self, partition: &str, method: &str, url: &str) -> Result<Option<StoredEntry>, Error> {
        let partition = partition.to_string();
        let key_hash = compute_cache_key(method, url);
        self.conn
            .call(move |conn| -> Result<Option<StoredEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT method, url, status, status_text, response_url, headers_json, body, revision, stored_at
                     FROM entries WHERE partition = ?1 AND key_hash = ?2",
                )?;

                let result = stmt.query_row(params![partition, key_hash], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u16>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Vec<u8>>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, i64>(8)?,
                    ))
                });

                let (method, url, status, status_text, response_url, headers_json, body, revision, stored_ms) =
                    match result {
                        Ok(row) => row,
                        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                        Err(e) => return Err(e.into()),
                    };

                let headers: Vec<(String, String)> = serde_json::from_str(&headers_json)?;
                let stored_at = DateTime::from_timestamp_millis(stored_ms)
                    .ok_or_else(|| Error::CorruptEntry(format!("bad timestamp {stored_ms} for {url}")))?;

                Ok(Some(StoredEntry {
                    method,
                    url,
                    response: Response { url: response_url, status, status_text, headers, body: Bytes::from(body) },
                    revision,
                    stored_at,
                }))
            })
            .await
            .map_err(Error::from)
    }

    /// Look up a servable entry: present and within the partition's max age.
    ///
    /// Expired entries are treated as misses; they stay on disk until the next
    /// expiration sweep.
    pub async fn lookup(
        &self, partition: &Partition, method: &str, url: &str, now: DateTime<Utc>,
    ) -> Result<Option<StoredEntry>, Error> {
        let entry = self.get_entry(partition.name(), method, url).await?;
        Ok(entry.filter(|entry| {
            let expired = partition.policy().is_expired(entry.stored_at, now);
            if expired {
                tracing::debug!(partition = partition.name(), url, "ignoring expired entry");
            }
            !expired
        }))
    }

    /// Delete a single entry.
    ///
    /// Returns true if an entry was removed.
    pub async fn delete_entry(&self, partition: &str, method: &str, url: &str) -> Result<bool, Error> {
        let partition = partition.to_string();
        let key_hash = compute_cache_key(method, url);
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE partition = ?1 AND key_hash = ?2",
                    params![partition, key_hash],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// URLs stored in a partition, oldest-stored first.
    pub async fn entry_urls(&self, partition: &str) -> Result<Vec<String>, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt =
                    conn.prepare("SELECT url FROM entries WHERE partition = ?1 ORDER BY stored_at ASC, id ASC")?;
                let rows = stmt.query_map(params![partition], |row| row.get::<_, String>(0))?;

                let mut urls = Vec::new();
                for row in rows {
                    urls.push(row?);
                }
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in a partition.
    pub async fn count_entries(&self, partition: &str) -> Result<u64, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE partition = ?1", params![partition], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::partition::{ExpirationPolicy, names};
    use chrono::Duration;

    fn make_entry(url: &str, body: &str, stored_at: DateTime<Utc>) -> StoredEntry {
        let response = Response::ok(url, body.to_string()).with_header("Content-Type", "text/html");
        StoredEntry::new(url, response, stored_at)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let now = Utc::now();
        let entry = make_entry("https://app.test/courses", "<h1>Courses</h1>", now);

        db.put_entry(names::PAGES, &entry).await.unwrap();

        let stored = db.get_entry(names::PAGES, "GET", "https://app.test/courses").await.unwrap().unwrap();
        assert_eq!(stored.response.text_lossy(), "<h1>Courses</h1>");
        assert_eq!(stored.response.header("content-type"), Some("text/html"));
        assert_eq!(stored.stored_at.timestamp_millis(), now.timestamp_millis());
        assert!(db.has_partition(names::PAGES).await.unwrap());
    }

    #[tokio::test]
    async fn test_partitions_are_isolated() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry("https://app.test/logo.png", "png", Utc::now());
        db.put_entry(names::STATIC_RESOURCES, &entry).await.unwrap();

        let other = db.get_entry(names::COURSE_IMAGES, "GET", "https://app.test/logo.png").await.unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_overwrite_is_last_write_wins() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let now = Utc::now();
        db.put_entry(names::API_CACHE, &make_entry("https://x.supabase.co/rest/v1/courses", "old", now))
            .await
            .unwrap();
        db.put_entry(
            names::API_CACHE,
            &make_entry("https://x.supabase.co/rest/v1/courses", "new", now + Duration::seconds(1)),
        )
        .await
        .unwrap();

        let stored = db
            .get_entry(names::API_CACHE, "GET", "https://x.supabase.co/rest/v1/courses")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.response.text_lossy(), "new");
        assert_eq!(db.count_entries(names::API_CACHE).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lookup_skips_expired() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let now = Utc::now();
        let partition = Partition::new(names::API_CACHE, ExpirationPolicy::new(100, Duration::minutes(5)));
        let url = "https://x.supabase.co/rest/v1/lessons";

        db.put_entry(partition.name(), &make_entry(url, "stale", now - Duration::minutes(6)))
            .await
            .unwrap();

        assert!(db.lookup(&partition, "GET", url, now).await.unwrap().is_none());
        assert!(db.get_entry(partition.name(), "GET", url).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry(names::FONTS, &make_entry("https://app.test/inter.woff2", "font", Utc::now()))
            .await
            .unwrap();

        assert!(db.delete_entry(names::FONTS, "GET", "https://app.test/inter.woff2").await.unwrap());
        assert!(!db.delete_entry(names::FONTS, "GET", "https://app.test/inter.woff2").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_partition_clears_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let now = Utc::now();
        db.put_entry(names::PAGES, &make_entry("https://app.test/", "a", now)).await.unwrap();
        db.put_entry(names::PAGES, &make_entry("https://app.test/login", "b", now)).await.unwrap();
        db.put_entry(names::FONTS, &make_entry("https://app.test/a.woff2", "c", now)).await.unwrap();

        assert_eq!(db.delete_partition(names::PAGES).await.unwrap(), 2);
        assert!(!db.has_partition(names::PAGES).await.unwrap());

        let stats = db.partition_stats().await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].name, names::FONTS);
        assert_eq!(stats[0].entries, 1);
    }
}
