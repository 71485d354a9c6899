//! Test doubles shared by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use aula_core::{CacheDb, Error, ManualClock, Response};
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use url::Url;

use crate::fetch::Network;
use crate::host::{ScriptSource, WorkerScript};
use crate::precache::ManifestEntry;
use crate::request::Request;
use crate::strategy::WorkerContext;

pub const ORIGIN: &str = "https://campus.test";

pub fn page_url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

/// Scripted network: fixed responses per URL, 404 otherwise.
#[derive(Debug, Clone, Default)]
pub struct MockNetwork {
    responses: Arc<Mutex<HashMap<String, Response>>>,
    offline: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
    gate: Arc<Mutex<Option<watch::Receiver<bool>>>>,
}

/// Holds network responses until released.
pub struct Gate(watch::Sender<bool>);

impl Gate {
    pub fn release(&self) {
        self.0.send_replace(true);
    }
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, response: Response) {
        self.responses.lock().unwrap().insert(url.to_string(), response);
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Block every fetch until the returned gate is released.
    pub fn hold(&self) -> Gate {
        let (tx, rx) = watch::channel(false);
        *self.gate.lock().unwrap() = Some(rx);
        Gate(tx)
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().unwrap().clone();
        if let Some(mut gate) = gate {
            let _ = gate.wait_for(|open| *open).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {}", request.url)));
        }

        let url = request.url.as_str();
        let response = self.responses.lock().unwrap().get(url).cloned();
        Ok(response.unwrap_or_else(|| Response::ok(url, "").with_status(404, "Not Found")))
    }
}

/// In-memory store, the given network and a manual clock.
pub async fn context(network: MockNetwork) -> (WorkerContext, ManualClock) {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let clock = ManualClock::default();
    let ctx = WorkerContext::new(cache, Arc::new(network)).with_clock(Arc::new(clock.clone()));
    (ctx, clock)
}

/// Worker script whose version and manifest tests can swap.
#[derive(Debug, Clone)]
pub struct StaticScriptSource {
    script: Arc<Mutex<Result<WorkerScript, String>>>,
}

impl StaticScriptSource {
    pub fn new(version: &str, manifest: &[(&str, Option<&str>)]) -> Self {
        let source = Self { script: Arc::new(Mutex::new(Err(String::new()))) };
        source.set(version, manifest);
        source
    }

    pub fn set(&self, version: &str, manifest: &[(&str, Option<&str>)]) {
        let manifest = manifest.iter().map(|(url, rev)| ManifestEntry::new(*url, *rev)).collect();
        let content_hash = hex::encode(Sha256::digest(version.as_bytes()));
        *self.script.lock().unwrap() = Ok(WorkerScript { content_hash, manifest });
    }

    pub fn fail(&self, reason: &str) {
        *self.script.lock().unwrap() = Err(reason.to_string());
    }
}

#[async_trait]
impl ScriptSource for StaticScriptSource {
    async fn load(&self, script_path: &str) -> Result<WorkerScript, Error> {
        self.script
            .lock()
            .unwrap()
            .clone()
            .map_err(|reason| Error::ScriptLoad(format!("{script_path}: {reason}")))
    }
}
