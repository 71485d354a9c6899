//! Install-time precaching of the build manifest.
//!
//! The build pipeline injects a list of `{url, revision}` pairs. Install
//! stores every one of them in the `precache` partition before the worker
//! reports "installed"; activation drops entries that the new manifest no
//! longer lists.
//!
//! Entries with a revision are stored under `url?__rev=<revision>`, so a
//! waiting worker can precache a new revision without disturbing what the
//! active worker serves.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use aula_core::cache::partition::names;
use aula_core::{Error, Partition, Response, StoredEntry};

use crate::fetch::{canonicalize, resolve};
use crate::request::Request;
use crate::strategy::{Strategy, WorkerContext};

const REVISION_PARAM: &str = "__rev";

/// One manifest line as injected by the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub url: String,
    /// `None` when the URL already embeds a content hash.
    #[serde(default)]
    pub revision: Option<String>,
}

impl ManifestEntry {
    pub fn new(url: impl Into<String>, revision: Option<&str>) -> Self {
        Self { url: url.into(), revision: revision.map(str::to_string) }
    }
}

/// A resolved manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecacheEntry {
    /// Absolute URL fetched at install time.
    pub url: Url,
    /// Storage key in the `precache` partition.
    pub key: String,
    pub revision: Option<String>,
}

/// Counts from one install.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub fetched: usize,
    /// Already stored under the same revision.
    pub reused: usize,
}

/// The manifest, resolved against the application origin.
#[derive(Debug, Clone, Default)]
pub struct PrecacheManifest {
    entries: Vec<PrecacheEntry>,
    by_url: HashMap<String, usize>,
}

impl PrecacheManifest {
    /// Resolve manifest lines against `base`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` for unresolvable URLs and
    /// `Error::InvalidInput` when one URL is listed with two revisions.
    pub fn new(base: &Url, lines: Vec<ManifestEntry>) -> Result<Self, Error> {
        let mut manifest = Self::default();

        for line in lines {
            let url = resolve(base, &line.url).map_err(|e| Error::InvalidUrl(format!("{}: {e}", line.url)))?;
            let lookup = String::from(url.clone());

            if let Some(&existing) = manifest.by_url.get(&lookup) {
                if manifest.entries[existing].revision != line.revision {
                    return Err(Error::InvalidInput(format!("conflicting precache revisions for {lookup}")));
                }
                continue;
            }

            let key = storage_key(&url, line.revision.as_deref());
            manifest.by_url.insert(lookup, manifest.entries.len());
            manifest.entries.push(PrecacheEntry { url, key, revision: line.revision });
        }

        Ok(manifest)
    }

    /// Parse the JSON manifest (`[{"url": ..., "revision": ...}]`).
    pub fn from_json(base: &Url, json: &str) -> Result<Self, Error> {
        let lines: Vec<ManifestEntry> =
            serde_json::from_str(json).map_err(|e| Error::InvalidInput(format!("invalid precache manifest: {e}")))?;
        Self::new(base, lines)
    }

    pub fn entries(&self) -> &[PrecacheEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The manifest entry answering `url`, if any.
    ///
    /// Tracking parameters (`utm_*`, `fbclid`) are ignored and a directory URL
    /// falls back to its `index.html`.
    pub fn resolve(&self, url: &Url) -> Option<&PrecacheEntry> {
        let url = canonicalize(url.clone()).ok()?;
        let cleaned = strip_tracking_params(url);

        if let Some(&index) = self.by_url.get(cleaned.as_str()) {
            return self.entries.get(index);
        }

        if cleaned.path().ends_with('/') {
            let mut index_url = cleaned.join("index.html").ok()?;
            index_url.set_query(cleaned.query());
            return self.by_url.get(index_url.as_str()).and_then(|&i| self.entries.get(i));
        }

        None
    }

    fn has_key(&self, key: &str) -> bool {
        self.entries.iter().any(|entry| entry.key == key)
    }
}

fn storage_key(url: &Url, revision: Option<&str>) -> String {
    match revision {
        Some(revision) => {
            let mut keyed = url.clone();
            keyed.query_pairs_mut().append_pair(REVISION_PARAM, revision);
            keyed.into()
        }
        None => url.as_str().to_string(),
    }
}

fn is_tracking_param(name: &str) -> bool {
    name.starts_with("utm_") || name == "fbclid"
}

fn strip_tracking_params(mut url: Url) -> Url {
    if !url.query_pairs().any(|(name, _)| is_tracking_param(&name)) {
        return url;
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| !is_tracking_param(name))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url
}

/// The partition holding precached assets. Never expires by age or count.
pub fn precache_partition() -> Partition {
    Partition::unbounded(names::PRECACHE)
}

/// Store every manifest entry, or nothing new at all.
///
/// Entries already stored under the same key are reused. All missing entries
/// are fetched before any is written, so a failed install leaves the
/// partition as it was.
///
/// # Errors
///
/// Returns `Error::PrecacheFailed` if any entry cannot be fetched or answers
/// with a non-200 status.
pub async fn install(ctx: &WorkerContext, manifest: &PrecacheManifest) -> Result<InstallReport, Error> {
    let mut report = InstallReport::default();
    let mut fetched: Vec<(&PrecacheEntry, Response)> = Vec::new();

    for entry in manifest.entries() {
        if ctx.cache.get_entry(names::PRECACHE, "GET", &entry.key).await?.is_some() {
            report.reused += 1;
            continue;
        }

        let response = ctx
            .network
            .fetch(&Request::get(entry.url.clone()))
            .await
            .map_err(|e| Error::PrecacheFailed { url: entry.url.to_string(), reason: e.to_string() })?;

        if !response.is_cacheable() {
            return Err(Error::PrecacheFailed {
                url: entry.url.to_string(),
                reason: format!("status {}", response.status),
            });
        }

        fetched.push((entry, response));
    }

    let now = ctx.clock.now();
    for (entry, response) in fetched {
        let stored = StoredEntry::new(&entry.key, response, now).with_revision(entry.revision.clone());
        ctx.cache.put_entry(names::PRECACHE, &stored).await?;
        report.fetched += 1;
    }

    tracing::info!(fetched = report.fetched, reused = report.reused, "precache installed");
    Ok(report)
}

/// Delete precached entries the manifest no longer lists.
///
/// Returns the number of deleted entries.
pub async fn cleanup_outdated(ctx: &WorkerContext, manifest: &PrecacheManifest) -> Result<u64, Error> {
    let mut deleted = 0;
    for key in ctx.cache.entry_urls(names::PRECACHE).await? {
        if !manifest.has_key(&key) && ctx.cache.delete_entry(names::PRECACHE, "GET", &key).await? {
            deleted += 1;
        }
    }

    if deleted > 0 {
        tracing::info!(deleted, "removed outdated precache entries");
    }
    Ok(deleted)
}

/// Serve precached assets; fall back to the network if the entry is gone.
#[derive(Debug, Clone)]
pub struct PrecacheFirst {
    partition: Partition,
    manifest: Arc<PrecacheManifest>,
}

impl PrecacheFirst {
    pub fn new(manifest: Arc<PrecacheManifest>) -> Self {
        Self { partition: precache_partition(), manifest }
    }

    /// Stored precache response answering `url`.
    pub async fn lookup(&self, ctx: &WorkerContext, url: &Url) -> Result<Option<Response>, Error> {
        let Some(entry) = self.manifest.resolve(url) else {
            return Ok(None);
        };
        let stored = ctx.cache.get_entry(self.partition.name(), "GET", &entry.key).await?;
        Ok(stored.map(|stored| stored.response))
    }
}

#[async_trait]
impl Strategy for PrecacheFirst {
    fn name(&self) -> &'static str {
        "Precache"
    }

    fn partition(&self) -> &Partition {
        &self.partition
    }

    async fn handle(&self, ctx: &WorkerContext, request: &Request) -> Result<Response, Error> {
        if let Some(response) = self.lookup(ctx, &request.url).await? {
            return Ok(response);
        }

        tracing::warn!(url = %request.url, "precached entry missing, using network");
        ctx.network.fetch(request).await
    }
}
