//! A single worker instance: lifecycle state, messages and fetch handling.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use url::Url;

use aula_core::cache::partition::names;
use aula_core::{AppConfig, ConfigError, Error, NavigationFallback, Response};

use crate::fetch::canonicalize;
use crate::precache::{self, InstallReport, PrecacheFirst, PrecacheManifest};
use crate::request::Request;
use crate::router::{Router, RoutingConfig};
use crate::strategy::WorkerContext;

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

/// Commands a page can post to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Activate as soon as possible instead of waiting for pages to close.
    SkipWaiting,
}

impl WorkerMessage {
    /// Parse a posted message. Unknown message types yield `Ok(None)`.
    pub fn from_json(json: &str) -> Result<Option<Self>, Error> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| Error::InvalidInput(format!("invalid worker message: {e}")))?;

        match serde_json::from_value::<WorkerMessage>(value) {
            Ok(message) => Ok(Some(message)),
            Err(err) => {
                tracing::debug!(message = json, error = %err, "ignoring unknown worker message");
                Ok(None)
            }
        }
    }
}

/// Identifier handed out by the host, increasing per registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Per-worker settings derived from the application config.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Origin the worker controls; the root document is resolved against it.
    pub scope: Url,
    pub routing: RoutingConfig,
    pub navigation_fallback: NavigationFallback,
}

impl WorkerSettings {
    pub fn new(scope: Url) -> Self {
        Self { scope, routing: RoutingConfig::default(), navigation_fallback: NavigationFallback::default() }
    }

    pub fn from_app_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            scope: config.origin_url()?,
            routing: RoutingConfig::from_app_config(config),
            navigation_fallback: config.navigation_fallback,
        })
    }
}

/// One installed copy of the worker script.
#[derive(Debug)]
pub struct ServiceWorker {
    id: WorkerId,
    ctx: WorkerContext,
    manifest: Arc<PrecacheManifest>,
    precache: PrecacheFirst,
    router: Router,
    settings: WorkerSettings,
    state: Mutex<WorkerState>,
    skip_waiting: AtomicBool,
}

impl ServiceWorker {
    pub fn new(id: WorkerId, ctx: WorkerContext, manifest: PrecacheManifest, settings: WorkerSettings) -> Self {
        let manifest = Arc::new(manifest);
        let router = Router::standard(&settings.routing, manifest.clone());
        Self {
            id,
            ctx,
            precache: PrecacheFirst::new(manifest.clone()),
            manifest,
            router,
            settings,
            state: Mutex::new(WorkerState::Installing),
            skip_waiting: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        tracing::debug!(worker = %self.id, ?state, "worker state changed");
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    pub fn manifest(&self) -> &PrecacheManifest {
        &self.manifest
    }

    /// Precache the manifest. A failure leaves the worker redundant.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        if self.state() != WorkerState::Installing {
            return Err(Error::InvalidState(format!("{} is {:?}, cannot install", self.id, self.state())));
        }

        match precache::install(&self.ctx, &self.manifest).await {
            Ok(report) => {
                self.set_state(WorkerState::Installed);
                Ok(report)
            }
            Err(err) => {
                tracing::warn!(worker = %self.id, error = %err, "install failed");
                self.set_state(WorkerState::Redundant);
                Err(err)
            }
        }
    }

    /// Take control: drop outdated precache entries and start serving.
    pub async fn activate(&self) -> Result<(), Error> {
        if self.state() != WorkerState::Installed {
            return Err(Error::InvalidState(format!("{} is {:?}, cannot activate", self.id, self.state())));
        }

        self.set_state(WorkerState::Activating);
        if let Err(err) = precache::cleanup_outdated(&self.ctx, &self.manifest).await {
            tracing::warn!(worker = %self.id, error = %err, "precache cleanup failed");
        }
        self.set_state(WorkerState::Activated);
        Ok(())
    }

    pub fn mark_redundant(&self) {
        self.set_state(WorkerState::Redundant);
    }

    pub fn handle_message(&self, message: &WorkerMessage) {
        match message {
            WorkerMessage::SkipWaiting => {
                tracing::info!(worker = %self.id, "skip waiting requested");
                self.skip_waiting.store(true, Ordering::SeqCst);
            }
        }
    }

    pub fn wants_skip_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Answer an intercepted request.
    ///
    /// Navigations are first answered with a cached root document when one
    /// exists; everything else goes through the router.
    pub async fn handle_fetch(&self, request: &Request) -> Result<Response, Error> {
        if self.state() != WorkerState::Activated {
            return Err(Error::InvalidState(format!("{} is {:?}, not serving", self.id, self.state())));
        }

        if self.tries_root_document(request)
            && let Some(document) = self.root_document().await?
        {
            tracing::trace!(worker = %self.id, url = %request.url, "serving root document");
            return Ok(document);
        }

        self.router.handle(&self.ctx, request).await
    }

    /// Whether `request` is answered with the root document when one is cached.
    pub fn tries_root_document(&self, request: &Request) -> bool {
        self.settings.navigation_fallback == NavigationFallback::RootDocument
            && request.is_navigation()
            && request.method == reqwest::Method::GET
    }

    /// Cached copy of `/`, searched across partitions in registration order.
    pub async fn root_document(&self) -> Result<Option<Response>, Error> {
        let root = self
            .settings
            .scope
            .join("/")
            .map_err(|e| Error::InvalidUrl(e.to_string()))
            .and_then(|url| canonicalize(url).map_err(|e| Error::InvalidUrl(e.to_string())))?;
        let now = self.ctx.clock.now();

        for partition in self.router.partitions() {
            let found = if partition.name() == names::PRECACHE {
                self.precache.lookup(&self.ctx, &root).await?
            } else {
                self.ctx
                    .cache
                    .lookup(partition, "GET", root.as_str(), now)
                    .await?
                    .map(|entry| entry.response)
            };
            if found.is_some() {
                return Ok(found);
            }
        }

        Ok(None)
    }

    /// Wait for the worker's background revalidation and eviction.
    pub async fn settle(&self) {
        self.ctx.background.settle().await;
    }
}
