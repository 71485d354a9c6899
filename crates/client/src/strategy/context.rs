//! Shared state handed to every strategy invocation.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use aula_core::{CacheDb, Clock, SystemClock};
use tokio::task::JoinSet;

use crate::fetch::Network;

/// Detached work spawned off the response path (revalidation, expiration).
///
/// Tasks run on their own; [`BackgroundTasks::settle`] exists so a host or a
/// test can wait until the partitions stop changing.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundTasks {
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Wait for every spawned task, including tasks spawned while waiting.
    pub async fn settle(&self) {
        loop {
            let mut pending = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
            if pending.is_empty() {
                return;
            }
            while let Some(result) = pending.join_next().await {
                if let Err(err) = result {
                    tracing::warn!(error = %err, "background task failed");
                }
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Cache, network and clock shared by strategies, precache and the worker.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub cache: CacheDb,
    pub network: Arc<dyn Network>,
    pub clock: Arc<dyn Clock>,
    pub background: BackgroundTasks,
}

impl WorkerContext {
    pub fn new(cache: CacheDb, network: Arc<dyn Network>) -> Self {
        Self { cache, network, clock: Arc::new(SystemClock), background: BackgroundTasks::default() }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
