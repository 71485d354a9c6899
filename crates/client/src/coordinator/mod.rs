//! Page-side update flow.
//!
//! On page load the coordinator registers the worker script once, and when a
//! new version is installed behind the active one it asks the user whether to
//! switch. A confirmed update tells the waiting worker to skip waiting and
//! reloads the page as soon as that worker takes control.

pub mod capability;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::host::{LifecycleEvent, WorkerHost};
use crate::worker::{WorkerId, WorkerMessage};

pub use capability::{DeviceClass, DisplayContext, DisplayMode, is_mobile, is_standalone};

/// Text of the update confirmation.
pub const UPDATE_PROMPT: &str = "A new version is available. Update now?";

/// Asks the user a yes/no question.
#[async_trait]
pub trait UpdatePrompt: Send + Sync + Debug {
    async fn confirm(&self, message: &str) -> bool;
}

/// Reloads the current page.
pub trait PageReloader: Send + Sync + Debug {
    fn reload(&self);
}

/// Drives registration and the update prompt for one page load.
#[derive(Debug)]
pub struct UpdateCoordinator {
    host: Arc<dyn WorkerHost>,
    prompt: Arc<dyn UpdatePrompt>,
    reloader: Arc<dyn PageReloader>,
    script_path: String,
}

impl UpdateCoordinator {
    pub fn new(
        host: Arc<dyn WorkerHost>, prompt: Arc<dyn UpdatePrompt>, reloader: Arc<dyn PageReloader>,
        script_path: impl Into<String>,
    ) -> Self {
        Self { host, prompt, reloader, script_path: script_path.into() }
    }

    /// Register the worker script and listen for updates.
    ///
    /// Returns the listener task, or `None` when the runtime has no worker
    /// support or registration failed. Failures are logged, never returned:
    /// the page keeps working without offline support.
    pub async fn start(self) -> Option<JoinHandle<()>> {
        if !self.host.supports_workers() {
            tracing::debug!("background workers unsupported, skipping registration");
            return None;
        }

        let events = self.host.subscribe();
        match self.host.register(&self.script_path).await {
            Ok(outcome) => tracing::info!(script = %self.script_path, ?outcome, "worker registered"),
            Err(err) => {
                tracing::error!(script = %self.script_path, error = %err, "worker registration failed");
                return None;
            }
        }

        Some(tokio::spawn(self.listen(events)))
    }

    async fn listen(self, mut events: broadcast::Receiver<LifecycleEvent>) {
        let mut reload_armed = false;

        loop {
            match events.recv().await {
                Ok(LifecycleEvent::Waiting(worker)) => {
                    if self.offer_update(worker).await {
                        reload_armed = true;
                    }
                }
                Ok(LifecycleEvent::Controlling(worker)) if reload_armed => {
                    tracing::info!(worker = %worker, "new worker controlling, reloading page");
                    self.reloader.reload();
                    return;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "missed lifecycle events");
                }
                Err(RecvError::Closed) => return,
            }
        }
    }

    /// Prompt for the waiting worker; true once it has been told to skip waiting.
    async fn offer_update(&self, worker: WorkerId) -> bool {
        if !self.prompt.confirm(UPDATE_PROMPT).await {
            tracing::info!(worker = %worker, "update declined");
            return false;
        }

        match self.host.post_message(worker, WorkerMessage::SkipWaiting).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(worker = %worker, error = %err, "skip waiting failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::LocalWorkerHost;
    use crate::test_support::{MockNetwork, ORIGIN, StaticScriptSource, context};
    use crate::worker::WorkerSettings;
    use aula_core::{Error, Response};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    const SCRIPT: &str = "/service-worker.js";

    #[derive(Debug, Default)]
    struct CountingPrompt {
        answer: bool,
        asked: AtomicUsize,
    }

    #[async_trait]
    impl UpdatePrompt for CountingPrompt {
        async fn confirm(&self, message: &str) -> bool {
            assert_eq!(message, UPDATE_PROMPT);
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    #[derive(Debug, Default)]
    struct CountingReloader(AtomicUsize);

    impl PageReloader for CountingReloader {
        fn reload(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Debug)]
    struct NoWorkers;

    #[async_trait]
    impl WorkerHost for NoWorkers {
        fn supports_workers(&self) -> bool {
            false
        }

        fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
            broadcast::channel(1).1
        }

        async fn register(&self, _script_path: &str) -> Result<crate::host::RegistrationOutcome, Error> {
            panic!("register called without worker support");
        }

        async fn post_message(&self, _worker: WorkerId, _message: WorkerMessage) -> Result<(), Error> {
            Ok(())
        }
    }

    async fn host_with_active(network: &MockNetwork, source: &StaticScriptSource) -> Arc<LocalWorkerHost> {
        let (ctx, _clock) = context(network.clone()).await;
        let settings = WorkerSettings::new(Url::parse(ORIGIN).unwrap());
        let host = LocalWorkerHost::new(ctx, Arc::new(source.clone()), settings);
        host.register(SCRIPT).await.unwrap();
        Arc::new(host)
    }

    fn serve_shell(network: &MockNetwork) {
        network.respond("https://campus.test/index.html", Response::ok("https://campus.test/index.html", "shell"));
    }

    #[tokio::test]
    async fn test_confirmed_update_reloads_once() {
        let network = MockNetwork::new();
        serve_shell(&network);
        let source = StaticScriptSource::new("v1", &[("/index.html", Some("a1"))]);
        let host = host_with_active(&network, &source).await;
        source.set("v2", &[("/index.html", Some("b2"))]);

        let prompt = Arc::new(CountingPrompt { answer: true, ..Default::default() });
        let reloader = Arc::new(CountingReloader::default());
        let coordinator = UpdateCoordinator::new(host.clone(), prompt.clone(), reloader.clone(), SCRIPT);

        let listener = coordinator.start().await.unwrap();
        listener.await.unwrap();

        assert_eq!(prompt.asked.load(Ordering::SeqCst), 1);
        assert_eq!(reloader.0.load(Ordering::SeqCst), 1);
        assert_eq!(host.active().unwrap().id(), WorkerId(2));
    }

    #[tokio::test]
    async fn test_declined_update_keeps_old_worker() {
        let network = MockNetwork::new();
        serve_shell(&network);
        let source = StaticScriptSource::new("v1", &[("/index.html", Some("a1"))]);
        let host = host_with_active(&network, &source).await;
        source.set("v2", &[("/index.html", Some("b2"))]);

        let prompt = Arc::new(CountingPrompt { answer: false, ..Default::default() });
        let reloader = Arc::new(CountingReloader::default());
        let listener = UpdateCoordinator::new(host.clone(), prompt.clone(), reloader.clone(), SCRIPT)
            .start()
            .await
            .unwrap();

        while prompt.asked.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        listener.abort();

        assert_eq!(reloader.0.load(Ordering::SeqCst), 0);
        assert_eq!(host.active().unwrap().id(), WorkerId(1));
        assert_eq!(host.waiting().unwrap().id(), WorkerId(2));
    }

    #[tokio::test]
    async fn test_declined_update_offered_again_on_next_load() {
        let network = MockNetwork::new();
        serve_shell(&network);
        let source = StaticScriptSource::new("v1", &[("/index.html", Some("a1"))]);
        let host = host_with_active(&network, &source).await;
        source.set("v2", &[("/index.html", Some("b2"))]);

        let declined = Arc::new(CountingPrompt { answer: false, ..Default::default() });
        let first_reloader = Arc::new(CountingReloader::default());
        let first_load = UpdateCoordinator::new(host.clone(), declined.clone(), first_reloader.clone(), SCRIPT)
            .start()
            .await
            .unwrap();
        while declined.asked.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        first_load.abort();
        assert_eq!(host.active().unwrap().id(), WorkerId(1));

        let accepted = Arc::new(CountingPrompt { answer: true, ..Default::default() });
        let reloader = Arc::new(CountingReloader::default());
        let second_load = UpdateCoordinator::new(host.clone(), accepted.clone(), reloader.clone(), SCRIPT)
            .start()
            .await
            .unwrap();
        second_load.await.unwrap();

        assert_eq!(declined.asked.load(Ordering::SeqCst), 1);
        assert_eq!(accepted.asked.load(Ordering::SeqCst), 1);
        assert_eq!(first_reloader.0.load(Ordering::SeqCst), 0);
        assert_eq!(reloader.0.load(Ordering::SeqCst), 1);
        assert_eq!(host.active().unwrap().id(), WorkerId(2));
        assert!(host.waiting().is_none());
    }

    #[tokio::test]
    async fn test_first_install_does_not_prompt() {
        let network = MockNetwork::new();
        serve_shell(&network);
        let source = StaticScriptSource::new("v1", &[("/index.html", Some("a1"))]);
        let (ctx, _clock) = context(network).await;
        let host = Arc::new(LocalWorkerHost::new(
            ctx,
            Arc::new(source),
            WorkerSettings::new(Url::parse(ORIGIN).unwrap()),
        ));

        let prompt = Arc::new(CountingPrompt { answer: true, ..Default::default() });
        let reloader = Arc::new(CountingReloader::default());
        let listener = UpdateCoordinator::new(host.clone(), prompt.clone(), reloader.clone(), SCRIPT)
            .start()
            .await
            .unwrap();
        tokio::task::yield_now().await;
        listener.abort();

        assert_eq!(prompt.asked.load(Ordering::SeqCst), 0);
        assert_eq!(reloader.0.load(Ordering::SeqCst), 0);
        assert_eq!(host.active().unwrap().id(), WorkerId(1));
    }

    #[tokio::test]
    async fn test_registration_failure_is_not_fatal() {
        let source = StaticScriptSource::new("v1", &[]);
        source.fail("connection refused");
        let (ctx, _clock) = context(MockNetwork::new()).await;
        let host = Arc::new(LocalWorkerHost::new(
            ctx,
            Arc::new(source),
            WorkerSettings::new(Url::parse(ORIGIN).unwrap()),
        ));

        let prompt = Arc::new(CountingPrompt::default());
        let reloader = Arc::new(CountingReloader::default());
        let started = UpdateCoordinator::new(host.clone(), prompt, reloader, SCRIPT).start().await;

        assert!(started.is_none());
        assert!(host.active().is_none());
    }

    #[tokio::test]
    async fn test_unsupported_runtime_skips_registration() {
        let prompt = Arc::new(CountingPrompt::default());
        let reloader = Arc::new(CountingReloader::default());
        let started = UpdateCoordinator::new(Arc::new(NoWorkers), prompt, reloader, SCRIPT).start().await;
        assert!(started.is_none());
    }
}
