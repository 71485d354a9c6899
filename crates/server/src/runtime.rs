//! Shared state behind every tool call: the worker host and the partitions
//! the route table knows about.

use std::sync::Arc;

use aula_client::{
    FetchClient, FetchConfig, LocalWorkerHost, ManifestFileSource, Network, PrecacheManifest, RegistrationOutcome,
    Router, ScriptSource, WorkerContext, WorkerHost, WorkerSettings,
};
use aula_core::{AppConfig, CacheDb, Error, Partition};

#[derive(Debug)]
pub struct Runtime {
    pub host: LocalWorkerHost,
    pub config: AppConfig,
    partitions: Vec<Partition>,
}

impl Runtime {
    pub fn new(config: AppConfig, ctx: WorkerContext, source: Arc<dyn ScriptSource>) -> Result<Self, Error> {
        let settings = WorkerSettings::from_app_config(&config).map_err(|e| Error::InvalidInput(e.to_string()))?;
        let partitions = Router::standard(&settings.routing, Arc::new(PrecacheManifest::default()))
            .partitions()
            .into_iter()
            .cloned()
            .collect();
        let host = LocalWorkerHost::new(ctx, source, settings);
        Ok(Self { host, config, partitions })
    }

    /// Open the cache database and build the reqwest-backed host.
    pub async fn open(config: AppConfig) -> Result<Self, Error> {
        let cache = CacheDb::open(&config.db_path).await?;
        let network: Arc<dyn Network> = Arc::new(FetchClient::new(FetchConfig::from_app_config(&config))?);
        let source = Arc::new(ManifestFileSource::new(&config.manifest_path));
        Self::new(config, WorkerContext::new(cache, network), source)
    }

    /// (Re-)register the worker script at the configured path.
    pub async fn register(&self) -> Result<RegistrationOutcome, Error> {
        self.host.register(&self.config.script_path).await
    }

    pub fn cache(&self) -> &CacheDb {
        &self.host.context().cache
    }

    /// Partitions bound by the route table, precache first.
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn partition(&self, name: &str) -> Result<&Partition, Error> {
        self.partitions
            .iter()
            .find(|partition| partition.name() == name)
            .ok_or_else(|| Error::UnknownPartition(name.to_string()))
    }
}
