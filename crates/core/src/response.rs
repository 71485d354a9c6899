//! Response values stored in and served from cache partitions.

use bytes::Bytes;

/// A response as seen by the caching layer.
///
/// The same type carries network responses and cached copies, so a strategy
/// can hand either back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// URL the response was produced for (after redirects).
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Response {
    /// Build a 200 response with no headers.
    pub fn ok(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self { url: url.into(), status: 200, status_text: "OK".into(), headers: Vec::new(), body: body.into() }
    }

    pub fn with_status(mut self, status: u16, status_text: impl Into<String>) -> Self {
        self.status = status;
        self.status_text = status_text.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup (first match).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Only plain 200 responses are written to a partition.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
