//! Cache first; the network is only touched on a miss.

use async_trait::async_trait;

use aula_core::{Error, Partition, Response};

use super::{Strategy, WorkerContext, cached_response, store_response};
use crate::request::Request;

/// Serve the cached copy when present, otherwise fetch and store.
#[derive(Debug, Clone)]
pub struct CacheFirst {
    partition: Partition,
}

impl CacheFirst {
    pub fn new(partition: Partition) -> Self {
        Self { partition }
    }
}

#[async_trait]
impl Strategy for CacheFirst {
    fn name(&self) -> &'static str {
        "CacheFirst"
    }

    fn partition(&self) -> &Partition {
        &self.partition
    }

    async fn handle(&self, ctx: &WorkerContext, request: &Request) -> Result<Response, Error> {
        if let Some(cached) = cached_response(ctx, &self.partition, request).await? {
            tracing::trace!(partition = self.partition.name(), url = %request.url, "cache hit");
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
    use aula_core::ExpirationPolicy;
    use aula_core::cache::partition::names;
    use chrono::Duration;

    fn fonts() -> Partition {
        Partition::new(names::FONTS, ExpirationPolicy::new(30, Duration::days(30)))
    }

    fn font_request(name: &str) -> Request {
        Request::subresource(page_url(&format!("/fonts/{name}.woff2")), Destination::Font)
    }

    #[tokio::test]
    async fn test_hit_makes_no_network_call() {
        let network = MockNetwork::new();
        let (ctx, _clock) = context(network.clone()).await;
        let request = font_request("inter");
        let url = request.cache_url().unwrap();
        ctx.cache
            .put_entry(names::FONTS, &aula_core::StoredEntry::new(&url, Response::ok(&url, "woff2"), ctx.clock.now()))
            .await
            .unwrap();

        let response = CacheFirst::new(fonts()).handle(&ctx, &request).await.unwrap();
        assert_eq!(response.text_lossy(), "woff2");
        assert_eq!(network.calls(), 0);
    }

    #[tokio::test]
    async fn test_miss_fetches_and_stores() {
        let network = MockNetwork::new();
        let font = "https://campus.test/fonts/inter.woff2";
        network.respond(font, Response::ok(font, "woff2"));
        let (ctx, _clock) = context(network.clone()).await;
        let strategy = CacheFirst::new(fonts());
        let request = font_request("inter");

        strategy.handle(&ctx, &request).await.unwrap();
        strategy.handle(&ctx, &request).await.unwrap();
        assert_eq!(network.calls(), 1);
    }

    #[tokio::test]
    async fn test_miss_while_offline_propagates() {
        let network = MockNetwork::new();
        network.go_offline();
        let (ctx, _clock) = context(network).await;

        let result = CacheFirst::new(fonts()).handle(&ctx, &font_request("inter")).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_31st_font_evicts_oldest() {
        let network = MockNetwork::new();
        for i in 0..31 {
            let url = format!("https://campus.test/fonts/f{i}.woff2");
            network.respond(&url, Response::ok(&url, "woff2"));
        }
        let (ctx, clock) = context(network).await;
        let strategy = CacheFirst::new(fonts());

        for i in 0..31 {
            strategy.handle(&ctx, &font_request(&format!("f{i}"))).await.unwrap();
            clock.advance(Duration::seconds(1));
        }
        ctx.background.settle().await;

        assert_eq!(ctx.cache.count_entries(names::FONTS).await.unwrap(), 30);
        let oldest = ctx.cache.get_entry(names::FONTS, "GET", "https://campus.test/fonts/f0.woff2").await.unwrap();
        assert!(oldest.is_none());
    }
}
