//! Caching strategies.
//!
//! Each strategy owns the partition it reads and writes. After every write
//! the partition's expiration policy runs as a detached background task, so
//! eviction never delays a response.
//!
//! | strategy                 | cache hit                        | cache miss              |
//! |--------------------------|----------------------------------|-------------------------|
//! | [`NetworkFirst`]         | only used when the network fails | network, store          |
//! | [`CacheFirst`]           | served, network untouched        | network, store          |
//! | [`StaleWhileRevalidate`] | served, refreshed in background  | network, store          |

pub mod cache_first;
pub mod context;
pub mod network_first;
pub mod stale_while_revalidate;

use async_trait::async_trait;
use std::fmt::Debug;

use aula_core::{Error, Partition, Response, StoredEntry};

use crate::request::Request;

pub use cache_first::CacheFirst;
pub use context::{BackgroundTasks, WorkerContext};
pub use network_first::NetworkFirst;
pub use stale_while_revalidate::StaleWhileRevalidate;

/// Common contract of every caching strategy.
#[async_trait]
pub trait Strategy: Send + Sync + Debug {
    /// Short name for logs and tool output.
    fn name(&self) -> &'static str;

    /// Partition the strategy reads and writes.
    fn partition(&self) -> &Partition;

    /// Produce a response for the request.
    async fn handle(&self, ctx: &WorkerContext, request: &Request) -> Result<Response, Error>;
}

fn cache_url(request: &Request) -> Result<String, Error> {
    request.cache_url().map_err(|e| Error::InvalidUrl(e.to_string()))
}

/// Servable cached copy of the request, if any.
pub(crate) async fn cached_response(
    ctx: &WorkerContext, partition: &Partition, request: &Request,
) -> Result<Option<Response>, Error> {
    let url = cache_url(request)?;
    let entry = ctx
        .cache
        .lookup(partition, request.method.as_str(), &url, ctx.clock.now())
        .await?;
    Ok(entry.map(|entry| entry.response))
}

/// Store a response copy and schedule the partition's expiration sweep.
///
/// Non-cacheable responses are skipped. Storage failures are logged and never
/// reach the caller, who already has a usable response.
pub(crate) async fn store_response(ctx: &WorkerContext, partition: &Partition, request: &Request, response: &Response) {
    if !response.is_cacheable() {
        tracing::debug!(
            partition = partition.name(),
            url = %request.url,
            status = response.status,
            "response not cacheable"
        );
        return;
    }

    let url = match cache_url(request) {
        Ok(url) => url,
        Err(err) => {
            tracing::warn!(url = %request.url, error = %err, "cannot derive cache key");
            return;
        }
    };

    let mut entry = StoredEntry::new(url, response.clone(), ctx.clock.now());
    entry.method = request.method.as_str().to_string();

    if let Err(err) = ctx.cache.put_entry(partition.name(), &entry).await {
        tracing::warn!(partition = partition.name(), url = %request.url, error = %err, "cache write failed");
        return;
    }

    schedule_expiration(ctx, partition);
}

/// Run the partition's eviction policy off the response path.
pub(crate) fn schedule_expiration(ctx: &WorkerContext, partition: &Partition) {
    if partition.policy().is_unbounded() {
        return;
    }

    let cache = ctx.cache.clone();
    let clock = ctx.clock.clone();
    let partition = partition.clone();
    ctx.background.spawn(async move {
        if let Err(err) = cache.apply_expiration(&partition, clock.now()).await {
            tracing::warn!(partition = partition.name(), error = %err, "expiration sweep failed");
        }
    });
}
