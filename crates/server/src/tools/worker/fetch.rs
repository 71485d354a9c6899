//! worker_fetch tool implementation.
//!
//! Runs one request through the active worker, exactly as an intercepted page
//! request would be handled.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use aula_client::fetch::resolve;
use aula_client::{Destination, Method, Request, RequestMode};
use aula_core::Error;

use crate::runtime::Runtime;

/// Bodies longer than this are cut in the tool output.
const MAX_BODY_CHARS: usize = 64 * 1024;

/// Reported for navigations answered with the cached root document.
const ROOT_DOCUMENT_ROUTE: &str = "root-document";
const ROOT_DOCUMENT_STRATEGY: &str = "CacheOnly";

/// Input parameters for the worker_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerFetchParams {
    /// Absolute URL, or a path resolved against the configured origin.
    pub url: String,

    /// Request mode: "navigate", "same-origin", "no-cors" or "cors" (default).
    #[serde(default)]
    pub mode: Option<String>,

    /// Request destination: "document", "style", "script", "image", "font", ...
    /// Defaults to "document" for navigations and empty otherwise.
    #[serde(default)]
    pub destination: Option<String>,

    /// HTTP method (default: GET). Only GET requests are routed to a cache.
    #[serde(default = "default_method")]
    pub method: String,

    /// Wait for background revalidation and eviction before returning.
    #[serde(default)]
    pub settle: bool,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for the worker_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerFetchOutput {
    /// The URL that was requested.
    pub url: String,
    /// URL of the response (after redirects, or as stored).
    pub response_url: String,
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    /// Response body as UTF-8 (lossy).
    pub body: String,
    pub body_truncated: bool,
    /// Route rule that matched, if any.
    pub route: Option<String>,
    /// Strategy of the matched rule.
    pub strategy: Option<String>,
}

fn build_request(runtime: &Runtime, params: &WorkerFetchParams) -> Result<Request, Error> {
    let base = runtime
        .config
        .origin_url()
        .map_err(|e| Error::InvalidInput(e.to_string()))?;
    let url = resolve(&base, &params.url).map_err(|e| Error::InvalidUrl(format!("{}: {e}", params.url)))?;

    let mode: RequestMode = match params.mode.as_deref() {
        Some(mode) => mode.parse().map_err(Error::InvalidInput)?,
        None => RequestMode::default(),
    };
    let destination: Destination = match params.destination.as_deref() {
        Some(destination) => destination.parse().map_err(Error::InvalidInput)?,
        None if mode == RequestMode::Navigate => Destination::Document,
        None => Destination::default(),
    };
    let method: Method = params
        .method
        .to_ascii_uppercase()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("invalid method: {}", params.method)))?;

    Ok(Request { mode, destination, ..Request::get(url) }.with_method(method))
}

/// Implementation of the worker_fetch tool.
pub async fn fetch_impl(runtime: &Runtime, params: WorkerFetchParams) -> Result<CallToolResult, McpError> {
    let request = build_request(runtime, &params)?;

    let mut matched = None;
    if let Some(worker) = runtime.host.active() {
        matched = if worker.tries_root_document(&request) && worker.root_document().await?.is_some() {
            Some((ROOT_DOCUMENT_ROUTE.to_string(), ROOT_DOCUMENT_STRATEGY))
        } else {
            worker
                .router()
                .classify(&request)
                .map(|rule| (rule.name().to_string(), rule.strategy().name()))
        };
    }

    let response = runtime.host.handle_fetch(&request).await?;
    if params.settle {
        runtime.host.settle().await;
    }

    let mut body = response.text_lossy();
    let body_truncated = body.len() > MAX_BODY_CHARS;
    if body_truncated {
        let mut cut = MAX_BODY_CHARS;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }

    let output = WorkerFetchOutput {
        url: request.url.to_string(),
        response_url: response.url,
        status: response.status,
        status_text: response.status_text,
        headers: response.headers,
        body,
        body_truncated,
        route: matched.as_ref().map(|(route, _)| route.clone()),
        strategy: matched.map(|(_, strategy)| strategy.to_string()),
    };

    let json =
        serde_json::to_string_pretty(&output).map_err(|e| Error::InvalidInput(format!("Failed to serialize: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::{StubNetwork, runtime};

    fn output(result: &CallToolResult) -> WorkerFetchOutput {
        let text = result.content[0].as_text().unwrap();
        serde_json::from_str(&text.text).unwrap()
    }

    fn params(url: &str) -> WorkerFetchParams {
        WorkerFetchParams { url: url.into(), mode: None, destination: None, method: default_method(), settle: true }
    }

    #[tokio::test]
    async fn test_navigation_served_from_precache() {
        let runtime = runtime(StubNetwork::default()).await;
        let navigate = WorkerFetchParams { mode: Some("navigate".into()), ..params("/courses") };
        let request = build_request(&runtime, &navigate).unwrap();
        assert_eq!(request.destination, Destination::Document);

        let result = fetch_impl(&runtime, navigate).await.unwrap();
        let output = output(&result);
        assert_eq!(output.body, "<html>shell</html>");
        assert_eq!(output.route.as_deref(), Some("root-document"));
        assert_eq!(output.strategy.as_deref(), Some("CacheOnly"));
    }

    #[tokio::test]
    async fn test_plain_request_reports_matched_rule() {
        let network = StubNetwork::default().serve("https://campus.test/assets/app.css", "body{}");
        let runtime = runtime(network).await;
        let css = WorkerFetchParams { destination: Some("style".into()), ..params("/assets/app.css") };

        let result = fetch_impl(&runtime, css).await.unwrap();
        let output = output(&result);
        assert_eq!(output.route.as_deref(), Some("static"));
        assert_eq!(output.strategy.as_deref(), Some("StaleWhileRevalidate"));
    }

    #[tokio::test]
    async fn test_routed_api_request() {
        let network = StubNetwork::default().serve("https://xyz.supabase.co/rest/v1/courses", "[]");
        let runtime = runtime(network).await;

        let result = fetch_impl(&runtime, params("https://xyz.supabase.co/rest/v1/courses")).await;
        assert!(result.is_ok());
        assert_eq!(runtime.cache().count_entries("api-cache").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_network_failure_maps_to_error() {
        let runtime = runtime(StubNetwork::default()).await;
        let err = fetch_impl(&runtime, params("/api/unreachable")).await.unwrap_err();
        assert_eq!(err.code.0, -32008);
    }

    #[tokio::test]
    async fn test_invalid_params() {
        let runtime = runtime(StubNetwork::default()).await;
        let bad_mode = WorkerFetchParams { mode: Some("teleport".into()), ..params("/") };
        assert!(build_request(&runtime, &bad_mode).is_err());

        let bad_scheme = params("ftp://campus.test/file");
        assert!(matches!(build_request(&runtime, &bad_scheme), Err(Error::InvalidUrl(_))));

        let post = WorkerFetchParams { method: "post".into(), ..params("/api/enroll") };
        assert_eq!(build_request(&runtime, &post).unwrap().method, Method::POST);
    }
}
