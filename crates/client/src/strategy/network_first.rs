//! Network first, cache as the offline fallback.

use async_trait::async_trait;

use aula_core::{Error, Partition, Response};

use super::{Strategy, WorkerContext, cached_response, store_response};
use crate::request::Request;

/// Try the network; on failure serve the cached copy, if any.
#[derive(Debug, Clone)]
pub struct NetworkFirst {
    partition: Partition,
}

impl NetworkFirst {
    pub fn new(partition: Partition) -> Self {
        Self { partition }
    }
}

#[async_trait]
impl Strategy for NetworkFirst {
    fn name(&self) -> &'static str {
        "NetworkFirst"
    }

    fn partition(&self) -> &Partition {
        &self.partition
    }

    async fn handle(&self, ctx: &WorkerContext, request: &Request) -> Result<Response, Error> {
        match ctx.network.fetch(request).await {
            Ok(response) => {
                store_response(ctx, &self.partition, request, &response).await;
                Ok(response)
            }
            Err(err) => match cached_response(ctx, &self.partition, request).await {
                Ok(Some(cached)) => {
                    tracing::debug!(
                        partition = self.partition.name(),
                        url = %request.url,
                        error = %err,
                        "network failed, serving cached copy"
                    );
                    Ok(cached)
                }
                Ok(None) => Err(err),
                Err(lookup) => {
                    tracing::warn!(
                        partition = self.partition.name(),
                        url = %request.url,
                        error = %lookup,
                        "cache lookup failed after network error"
                    );
                    Err(err)
                }
            },
        }
    }
}
