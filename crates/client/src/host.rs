//! Worker host: owns the installing, waiting and active worker slots and
//! broadcasts lifecycle events to subscribed pages.
//!
//! A registration whose script is byte-identical to the active or waiting
//! worker's is a no-op. A changed script installs a new worker; with nothing
//! active it activates at once, otherwise it waits until it is told to skip
//! waiting.

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;

use aula_core::{Error, Response};

use crate::precache::{ManifestEntry, PrecacheManifest};
use crate::request::Request;
use crate::strategy::WorkerContext;
use crate::worker::{ServiceWorker, WorkerId, WorkerMessage, WorkerSettings, WorkerState};

const EVENT_CAPACITY: usize = 16;

/// Lifecycle notifications delivered to pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "worker", rename_all = "lowercase")]
pub enum LifecycleEvent {
    Installed(WorkerId),
    /// Installed while another worker is active.
    Waiting(WorkerId),
    Activated(WorkerId),
    /// The page is now served by this worker.
    Controlling(WorkerId),
    Redundant(WorkerId),
}

/// A loaded worker script, reduced to what the host acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerScript {
    /// Hex SHA-256 of the script bytes.
    pub content_hash: String,
    pub manifest: Vec<ManifestEntry>,
}

impl WorkerScript {
    /// Hash `bytes` and parse them as the JSON precache manifest.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let content_hash = hex::encode(Sha256::digest(bytes));
        let manifest =
            serde_json::from_slice(bytes).map_err(|e| Error::ScriptLoad(format!("invalid precache manifest: {e}")))?;
        Ok(Self { content_hash, manifest })
    }
}

/// Where worker scripts come from.
#[async_trait]
pub trait ScriptSource: Send + Sync + Debug {
    async fn load(&self, script_path: &str) -> Result<WorkerScript, Error>;
}

/// Reads the build's precache manifest from disk; the file's hash is the
/// script version.
#[derive(Debug, Clone)]
pub struct ManifestFileSource {
    path: PathBuf,
}

impl ManifestFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ScriptSource for ManifestFileSource {
    async fn load(&self, script_path: &str) -> Result<WorkerScript, Error> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| Error::ScriptLoad(format!("{script_path}: {}: {e}", self.path.display())))?;
        WorkerScript::from_bytes(&bytes)
    }
}

/// Result of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "worker", rename_all = "lowercase")]
pub enum RegistrationOutcome {
    /// Same script as the active or waiting worker.
    Unchanged,
    /// First worker; activated immediately.
    Activated(WorkerId),
    /// New version installed behind an active worker.
    Waiting(WorkerId),
}

/// The contract pages use to talk to their worker runtime.
#[async_trait]
pub trait WorkerHost: Send + Sync + Debug {
    fn supports_workers(&self) -> bool;

    /// Lifecycle events emitted after this call.
    fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent>;

    async fn register(&self, script_path: &str) -> Result<RegistrationOutcome, Error>;

    async fn post_message(&self, worker: WorkerId, message: WorkerMessage) -> Result<(), Error>;
}

/// Snapshot of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    pub id: WorkerId,
    pub state: WorkerState,
    pub script_hash: String,
    pub precached: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostStatus {
    pub installing: Option<WorkerSummary>,
    pub waiting: Option<WorkerSummary>,
    pub active: Option<WorkerSummary>,
}

#[derive(Debug, Clone)]
struct Slot {
    worker: Arc<ServiceWorker>,
    script_hash: String,
}

impl Slot {
    fn summary(&self) -> WorkerSummary {
        WorkerSummary {
            id: self.worker.id(),
            state: self.worker.state(),
            script_hash: self.script_hash.clone(),
            precached: self.worker.manifest().len(),
        }
    }
}

#[derive(Debug, Default)]
struct Slots {
    installing: Option<Slot>,
    waiting: Option<Slot>,
    active: Option<Slot>,
}

/// In-process worker host.
#[derive(Debug)]
pub struct LocalWorkerHost {
    ctx: WorkerContext,
    source: Arc<dyn ScriptSource>,
    settings: WorkerSettings,
    slots: Mutex<Slots>,
    registration: tokio::sync::Mutex<()>,
    events: broadcast::Sender<LifecycleEvent>,
    next_id: AtomicU64,
}

impl LocalWorkerHost {
    pub fn new(ctx: WorkerContext, source: Arc<dyn ScriptSource>, settings: WorkerSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            ctx,
            source,
            settings,
            slots: Mutex::new(Slots::default()),
            registration: tokio::sync::Mutex::new(()),
            events,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: LifecycleEvent) {
        tracing::debug!(?event, "lifecycle event");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn active(&self) -> Option<Arc<ServiceWorker>> {
        self.slots().active.as_ref().map(|slot| slot.worker.clone())
    }

    pub fn waiting(&self) -> Option<Arc<ServiceWorker>> {
        self.slots().waiting.as_ref().map(|slot| slot.worker.clone())
    }

    pub fn status(&self) -> HostStatus {
        let slots = self.slots();
        HostStatus {
            installing: slots.installing.as_ref().map(Slot::summary),
            waiting: slots.waiting.as_ref().map(Slot::summary),
            active: slots.active.as_ref().map(Slot::summary),
        }
    }

    /// Dispatch through the active worker, or straight to the network.
    pub async fn handle_fetch(&self, request: &Request) -> Result<Response, Error> {
        match self.active() {
            Some(worker) => worker.handle_fetch(request).await,
            None => self.ctx.network.fetch(request).await,
        }
    }

    /// Wait for background revalidation and expiration to finish.
    pub async fn settle(&self) {
        self.ctx.background.settle().await;
    }

    fn find(&self, id: WorkerId) -> Option<(Arc<ServiceWorker>, bool)> {
        let slots = self.slots();
        if let Some(slot) = slots.waiting.as_ref().filter(|slot| slot.worker.id() == id) {
            return Some((slot.worker.clone(), true));
        }
        [slots.installing.as_ref(), slots.active.as_ref()]
            .into_iter()
            .flatten()
            .find(|slot| slot.worker.id() == id)
            .map(|slot| (slot.worker.clone(), false))
    }

    /// Activate the waiting worker `id` and hand it control of the page.
    ///
    /// Does nothing when `id` no longer holds the waiting slot.
    async fn promote_waiting(&self, id: WorkerId) -> Result<(), Error> {
        let Some(next) = self.slots().waiting.take_if(|slot| slot.worker.id() == id) else {
            tracing::debug!(worker = %id, "worker no longer waiting, not promoting");
            return Ok(());
        };

        if let Err(err) = next.worker.activate().await {
            next.worker.mark_redundant();
            self.emit(LifecycleEvent::Redundant(id));
            return Err(err);
        }

        let previous = self.slots().active.replace(next);
        if let Some(previous) = previous {
            previous.worker.mark_redundant();
            self.emit(LifecycleEvent::Redundant(previous.worker.id()));
        }

        tracing::info!(worker = %id, "worker activated and controlling");
        self.emit(LifecycleEvent::Activated(id));
        self.emit(LifecycleEvent::Controlling(id));
        Ok(())
    }
}

#[async_trait]
impl WorkerHost for LocalWorkerHost {
    fn supports_workers(&self) -> bool {
        true
    }

    fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    async fn register(&self, script_path: &str) -> Result<RegistrationOutcome, Error> {
        let _registering = self.registration.lock().await;
        let script = self.source.load(script_path).await?;

        let unchanged = {
            let slots = self.slots();
            [slots.active.as_ref(), slots.waiting.as_ref()]
                .into_iter()
                .flatten()
                .any(|slot| slot.script_hash == script.content_hash)
                .then(|| slots.waiting.as_ref().map(|slot| slot.worker.id()))
        };
        if let Some(waiting) = unchanged {
            tracing::debug!(script = script_path, hash = %script.content_hash, "worker script unchanged");
            // A version declined on an earlier load is offered again.
            if let Some(waiting) = waiting {
                self.emit(LifecycleEvent::Waiting(waiting));
            }
            return Ok(RegistrationOutcome::Unchanged);
        }

        let manifest = PrecacheManifest::new(&self.settings.scope, script.manifest)?;
        let id = WorkerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let worker = Arc::new(ServiceWorker::new(id, self.ctx.clone(), manifest, self.settings.clone()));
        let slot = Slot { worker: worker.clone(), script_hash: script.content_hash };
        self.slots().installing = Some(slot.clone());

        tracing::info!(worker = %id, script = script_path, hash = %slot.script_hash, "installing worker");
        let installed = worker.install().await;
        self.slots().installing = None;
        if let Err(err) = installed {
            self.emit(LifecycleEvent::Redundant(id));
            return Err(err);
        }
        self.emit(LifecycleEvent::Installed(id));

        if self.slots().active.is_none() {
            worker.activate().await?;
            self.slots().active = Some(slot);
            tracing::info!(worker = %id, "first worker activated");
            self.emit(LifecycleEvent::Activated(id));
            return Ok(RegistrationOutcome::Activated(id));
        }

        let replaced = self.slots().waiting.replace(slot);
        if let Some(replaced) = replaced {
            replaced.worker.mark_redundant();
            self.emit(LifecycleEvent::Redundant(replaced.worker.id()));
        }

        if worker.wants_skip_waiting() {
            self.promote_waiting(id).await?;
            return Ok(RegistrationOutcome::Activated(id));
        }

        tracing::info!(worker = %id, "worker waiting");
        self.emit(LifecycleEvent::Waiting(id));
        Ok(RegistrationOutcome::Waiting(id))
    }

    async fn post_message(&self, worker: WorkerId, message: WorkerMessage) -> Result<(), Error> {
        // Slots only change under the registration lock.
        let _registering = self.registration.lock().await;
        let Some((target, waiting)) = self.find(worker) else {
            return Err(Error::InvalidState(format!("{worker} is not registered")));
        };

        target.handle_message(&message);
        if waiting && target.wants_skip_waiting() {
            self.promote_waiting(worker).await?;
        }
        Ok(())
    }
}
