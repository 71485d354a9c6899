//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (AULA_*)
//! 2. TOML config file (if AULA_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

mod validation;

pub use validation::ConfigError;

/// How navigations are answered when the root document is already cached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationFallback {
    /// Serve the cached `/` document for every navigation, ahead of the
    /// navigation route. Falls back to the route when `/` is not cached.
    #[default]
    RootDocument,
    /// Navigations only go through the navigation route.
    Route,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (AULA_*)
/// 2. TOML config file (if AULA_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite cache database holding every partition.
    ///
    /// Set via AULA_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin of the application; relative URLs (manifest entries, `/`)
    /// resolve against it.
    ///
    /// Set via AULA_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Well-known path of the worker script.
    ///
    /// Set via AULA_SCRIPT_PATH environment variable.
    #[serde(default = "default_script_path")]
    pub script_path: String,

    /// Build-time precache manifest (JSON list of `{url, revision}`).
    ///
    /// Set via AULA_MANIFEST_PATH environment variable.
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,

    /// User-Agent string for network requests.
    ///
    /// Set via AULA_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to read per response.
    ///
    /// Set via AULA_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Network client timeout in milliseconds.
    ///
    /// Set via AULA_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Requests whose host contains this fragment go to the API cache.
    ///
    /// Set via AULA_BACKEND_HOST_FRAGMENT environment variable.
    #[serde(default = "default_backend_host_fragment")]
    pub backend_host_fragment: String,

    /// Image requests whose path contains this marker are course images.
    ///
    /// Set via AULA_COURSE_IMAGE_MARKER environment variable.
    #[serde(default = "default_course_image_marker")]
    pub course_image_marker: String,

    /// Precedence between the root-document fallback and the navigation route.
    ///
    /// Set via AULA_NAVIGATION_FALLBACK environment variable.
    #[serde(default)]
    pub navigation_fallback: NavigationFallback,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./aula-cache.sqlite")
}

fn default_origin() -> String {
    "http://localhost:5173".into()
}

fn default_script_path() -> String {
    "/service-worker.js".into()
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("./precache-manifest.json")
}

fn default_user_agent() -> String {
    "aula/0.1".into()
}

fn default_max_bytes() -> usize {
    10_485_760 // 10MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_backend_host_fragment() -> String {
    "supabase".into()
}

fn default_course_image_marker() -> String {
    "/courses/".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            script_path: default_script_path(),
            manifest_path: default_manifest_path(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            backend_host_fragment: default_backend_host_fragment(),
            course_image_marker: default_course_image_marker(),
            navigation_fallback: NavigationFallback::default(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parsed application origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `origin` is not an absolute http(s) URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => {
                Err(ConfigError::Invalid { field: "origin".into(), reason: format!("unsupported scheme {scheme}") })
            }
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `AULA_`
    /// 2. TOML file from `AULA_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("AULA_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("AULA_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
