//! Stale-while-revalidate: answer from cache now, refresh in the background.

use async_trait::async_trait;

use aula_core::{Error, Partition, Response};

use super::{Strategy, WorkerContext, cached_response, store_response};
use crate::request::Request;

/// Serve the cached copy immediately and refresh it off the response path.
///
/// A miss waits for the network like [`super::CacheFirst`]. A failed
/// background refresh leaves the previous entry in place.
#[derive(Debug, Clone)]
pub struct StaleWhileRevalidate {
    partition: Partition,
}

impl StaleWhileRevalidate {
    pub fn new(partition: Partition) -> Self {
        Self { partition }
    }

    fn revalidate(&self, ctx: &WorkerContext, request: &Request) {
        let task_ctx = ctx.clone();
        let partition = self.partition.clone();
        let request = request.clone();
        ctx.background.spawn(async move {
            match task_ctx.network.fetch(&request).await {
                Ok(fresh) => store_response(&task_ctx, &partition, &request, &fresh).await,
                Err(err) => {
                    tracing::debug!(
                        partition = partition.name(),
                        url = %request.url,
                        error = %err,
                        "revalidation failed, keeping cached copy"
                    );
                }
            }
        });
    }
}

#[async_trait]
impl Strategy for StaleWhileRevalidate {
    fn name(&self) -> &'static str {
        "StaleWhileRevalidate"
    }

    fn partition(&self) -> &Partition {
        &self.partition
    }

    async fn handle(&self, ctx: &WorkerContext, request: &Request) -> Result<Response, Error> {
        if let Some(cached) = cached_response(ctx, &self.partition, request).await? {
            self.revalidate(ctx, request);
            return Ok(cached);
        }

        let response = ctx.network.fetch(request).await?;
        store_response(ctx, &self.partition, request, &response).await;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Destination;
    use crate::test_support::{MockNetwork, context, page_url};
    use aula_core::cache::partition::names;
    use aula_core::{ExpirationPolicy, StoredEntry};
    use chrono::Duration;

    fn api() -> Partition {
        Partition::new(names::API_CACHE, ExpirationPolicy::new(100, Duration::minutes(5)))
    }

    const COURSES: &str = "https://xyz.supabase.co/rest/v1/courses";

    #[tokio::test]
    async fn test_hit_returns_stale_then_refreshes() {
        let network = MockNetwork::new();
        network.respond(COURSES, Response::ok(COURSES, "fresh"));
        let gate = network.hold();
        let (ctx, _clock) = context(network.clone()).await;
        ctx.cache
            .put_entry(names::API_CACHE, &StoredEntry::new(COURSES, Response::ok(COURSES, "stale"), ctx.clock.now()))
            .await
            .unwrap();
        let request = Request::get(url::Url::parse(COURSES).unwrap());

        let response = StaleWhileRevalidate::new(api()).handle(&ctx, &request).await.unwrap();
        assert_eq!(response.text_lossy(), "stale");

        let entry = ctx.cache.get_entry(names::API_CACHE, "GET", COURSES).await.unwrap().unwrap();
        assert_eq!(entry.response.text_lossy(), "stale");

        gate.release();
        ctx.background.settle().await;

        let entry = ctx.cache.get_entry(names::API_CACHE, "GET", COURSES).await.unwrap().unwrap();
        assert_eq!(entry.response.text_lossy(), "fresh");
        assert_eq!(network.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_revalidation_keeps_entry() {
        let network = MockNetwork::new();
        network.go_offline();
        let (ctx, _clock) = context(network).await;
        ctx.cache
            .put_entry(names::API_CACHE, &StoredEntry::new(COURSES, Response::ok(COURSES, "kept"), ctx.clock.now()))
            .await
            .unwrap();
        let request = Request::get(url::Url::parse(COURSES).unwrap());

        let response = StaleWhileRevalidate::new(api()).handle(&ctx, &request).await.unwrap();
        ctx.background.settle().await;

        assert_eq!(response.text_lossy(), "kept");
        let entry = ctx.cache.get_entry(names::API_CACHE, "GET", COURSES).await.unwrap().unwrap();
        assert_eq!(entry.response.text_lossy(), "kept");
    }

    #[tokio::test]
    async fn test_miss_waits_for_network() {
        let network = MockNetwork::new();
        let css = "https://campus.test/assets/app.css";
        network.respond(css, Response::ok(css, "body{}"));
        let (ctx, _clock) = context(network.clone()).await;
        let request = Request::subresource(page_url("/assets/app.css"), Destination::Style);

        let strategy = StaleWhileRevalidate::new(Partition::unbounded(names::STATIC_RESOURCES));
        let response = strategy.handle(&ctx, &request).await.unwrap();

        assert_eq!(response.text_lossy(), "body{}");
        assert_eq!(ctx.cache.count_entries(names::STATIC_RESOURCES).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_not_served_and_is_purged() {
        let network = MockNetwork::new();
        network.respond(COURSES, Response::ok(COURSES, "fresh"));
        let (ctx, clock) = context(network.clone()).await;
        let stored_at = ctx.clock.now();
        ctx.cache
            .put_entry(names::API_CACHE, &StoredEntry::new(COURSES, Response::ok(COURSES, "old"), stored_at))
            .await
            .unwrap();
        let other = "https://xyz.supabase.co/rest/v1/lessons";
        ctx.cache
            .put_entry(names::API_CACHE, &StoredEntry::new(other, Response::ok(other, "old"), stored_at))
            .await
            .unwrap();
        clock.advance(Duration::minutes(6));

        let request = Request::get(url::Url::parse(COURSES).unwrap());
        let response = StaleWhileRevalidate::new(api()).handle(&ctx, &request).await.unwrap();
        ctx.background.settle().await;

        assert_eq!(response.text_lossy(), "fresh");
        assert!(ctx.cache.get_entry(names::API_CACHE, "GET", other).await.unwrap().is_none());
    }
}
