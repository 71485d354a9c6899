//! Client side of aula: the request interceptor and the update flow.
//!
//! This crate provides the caching strategies, the route table, precaching,
//! the worker lifecycle and host, and the page-side update coordinator. The
//! server binary drives it through [`LocalWorkerHost`].

pub mod coordinator;
pub mod fetch;
pub mod host;
pub mod precache;
pub mod request;
pub mod router;
pub mod strategy;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use coordinator::{PageReloader, UPDATE_PROMPT, UpdateCoordinator, UpdatePrompt};
pub use fetch::{FetchClient, FetchConfig, Network};
pub use host::{
    HostStatus, LifecycleEvent, LocalWorkerHost, ManifestFileSource, RegistrationOutcome, ScriptSource, WorkerHost,
    WorkerScript, WorkerSummary,
};
pub use precache::{InstallReport, ManifestEntry, PrecacheManifest};
pub use request::{Destination, Request, RequestMode};
pub use reqwest::Method;
pub use router::{Matcher, RouteRule, Router, RoutingConfig};
pub use strategy::{CacheFirst, NetworkFirst, StaleWhileRevalidate, Strategy, WorkerContext};
pub use worker::{ServiceWorker, WorkerId, WorkerMessage, WorkerSettings, WorkerState};
