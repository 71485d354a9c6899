//! Ordered route rules: the first matching rule handles the request.
//!
//! The standard rule set, in order:
//!
//! | rule             | matches                                   | strategy             | partition          | bounds        |
//! |------------------|-------------------------------------------|----------------------|--------------------|---------------|
//! | `precache`       | URLs listed in the build manifest         | precache             | `precache`         | none          |
//! | `pages`          | navigations                               | NetworkFirst         | `pages`            | 50 / 24 h     |
//! | `static`         | style, script and image destinations      | StaleWhileRevalidate | `static-resources` | none          |
//! | `fonts`          | font destination                          | CacheFirst           | `fonts`            | 30 / 30 days  |
//! | `api`            | host contains the backend fragment        | StaleWhileRevalidate | `api-cache`        | 100 / 5 min   |
//! | `course-images`  | images whose path contains the marker     | CacheFirst           | `course-images`    | 100 / 7 days  |
//!
//! Anything else, and any non-GET request, goes to the network uncached.
//! Because `static` already takes every image, `course-images` only sees
//! requests when `static` is left out of a custom router.

use std::sync::Arc;

use chrono::Duration;
use reqwest::Method;

use aula_core::cache::partition::names;
use aula_core::{AppConfig, Error, ExpirationPolicy, Partition, Response};

use crate::precache::{PrecacheFirst, PrecacheManifest};
use crate::request::{Destination, Request};
use crate::strategy::{CacheFirst, NetworkFirst, StaleWhileRevalidate, Strategy, WorkerContext};

/// Matcher inputs that come from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    /// Requests whose host contains this go to the API cache.
    pub backend_host_fragment: String,
    /// Image requests whose path contains this are course images.
    pub course_image_marker: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self { backend_host_fragment: "supabase".into(), course_image_marker: "/courses/".into() }
    }
}

impl RoutingConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            backend_host_fragment: config.backend_host_fragment.clone(),
            course_image_marker: config.course_image_marker.clone(),
        }
    }
}

/// Predicate over an intercepted request.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// URL listed in the precache manifest.
    Precached(Arc<PrecacheManifest>),
    /// Full-document navigation.
    Navigation,
    /// Any of the listed destinations.
    Destinations(Vec<Destination>),
    /// Target host contains the fragment.
    HostContains(String),
    /// Image destination whose path contains the marker.
    ImagePathContains(String),
}

impl Matcher {
    pub fn matches(&self, request: &Request) -> bool {
        match self {
            Matcher::Precached(manifest) => manifest.resolve(&request.url).is_some(),
            Matcher::Navigation => request.is_navigation(),
            Matcher::Destinations(destinations) => destinations.contains(&request.destination),
            Matcher::HostContains(fragment) => {
                request.url.host_str().is_some_and(|host| host.contains(fragment.as_str()))
            }
            Matcher::ImagePathContains(marker) => {
                request.destination == Destination::Image && request.url.path().contains(marker.as_str())
            }
        }
    }
}

/// Matcher bound to a strategy (and through it, a partition).
#[derive(Debug, Clone)]
pub struct RouteRule {
    name: String,
    matcher: Matcher,
    strategy: Arc<dyn Strategy>,
}

impl RouteRule {
    pub fn new(name: impl Into<String>, matcher: Matcher, strategy: Arc<dyn Strategy>) -> Self {
        Self { name: name.into(), matcher, strategy }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn strategy(&self) -> &dyn Strategy {
        self.strategy.as_ref()
    }

    pub fn partition(&self) -> &Partition {
        self.strategy.partition()
    }
}

pub fn pages_partition() -> Partition {
    Partition::new(names::PAGES, ExpirationPolicy::new(50, Duration::hours(24)))
}

pub fn static_resources_partition() -> Partition {
    Partition::unbounded(names::STATIC_RESOURCES)
}

pub fn fonts_partition() -> Partition {
    Partition::new(names::FONTS, ExpirationPolicy::new(30, Duration::days(30)))
}

pub fn api_cache_partition() -> Partition {
    Partition::new(names::API_CACHE, ExpirationPolicy::new(100, Duration::minutes(5)))
}

pub fn course_images_partition() -> Partition {
    Partition::new(names::COURSE_IMAGES, ExpirationPolicy::new(100, Duration::days(7)))
}

/// Ordered rule list, built once per worker.
#[derive(Debug, Clone, Default)]
pub struct Router {
    rules: Vec<RouteRule>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule; it is consulted after every rule registered before it.
    pub fn register(&mut self, rule: RouteRule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    /// The application's rule set, precache route first.
    pub fn standard(config: &RoutingConfig, manifest: Arc<PrecacheManifest>) -> Self {
        let mut router = Self::new();
        router
            .register(RouteRule::new(
                "precache",
                Matcher::Precached(manifest.clone()),
                Arc::new(PrecacheFirst::new(manifest)),
            ))
            .register(RouteRule::new("pages", Matcher::Navigation, Arc::new(NetworkFirst::new(pages_partition()))))
            .register(RouteRule::new(
                "static",
                Matcher::Destinations(vec![Destination::Style, Destination::Script, Destination::Image]),
                Arc::new(StaleWhileRevalidate::new(static_resources_partition())),
            ))
            .register(RouteRule::new(
                "fonts",
                Matcher::Destinations(vec![Destination::Font]),
                Arc::new(CacheFirst::new(fonts_partition())),
            ))
            .register(RouteRule::new(
                "api",
                Matcher::HostContains(config.backend_host_fragment.clone()),
                Arc::new(StaleWhileRevalidate::new(api_cache_partition())),
            ))
            .register(RouteRule::new(
                "course-images",
                Matcher::ImagePathContains(config.course_image_marker.clone()),
                Arc::new(CacheFirst::new(course_images_partition())),
            ));
        router
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// First rule matching the request. Only GET requests are routed.
    pub fn classify(&self, request: &Request) -> Option<&RouteRule> {
        if request.method != Method::GET {
            return None;
        }
        self.rules.iter().find(|rule| rule.matcher.matches(request))
    }

    /// Dispatch through the first matching rule, or straight to the network.
    pub async fn handle(&self, ctx: &WorkerContext, request: &Request) -> Result<Response, Error> {
        match self.classify(request) {
            Some(rule) => {
                tracing::trace!(
                    rule = rule.name(),
                    strategy = rule.strategy().name(),
                    url = %request.url,
                    "routing request"
                );
                rule.strategy.handle(ctx, request).await
            }
            None => ctx.network.fetch(request).await,
        }
    }

    /// Partitions bound by the rules, in registration order, without repeats.
    pub fn partitions(&self) -> Vec<&Partition> {
        let mut partitions: Vec<&Partition> = Vec::new();
        for rule in &self.rules {
            let partition = rule.partition();
            if !partitions.iter().any(|p| p.name() == partition.name()) {
                partitions.push(partition);
            }
        }
        partitions
    }

    pub fn partition(&self, name: &str) -> Option<&Partition> {
        self.rules
            .iter()
            .map(RouteRule::partition)
            .find(|partition| partition.name() == name)
    }
}
