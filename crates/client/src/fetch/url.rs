//! URL canonicalization for consistent cache keys.

use url::Url;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Resolve a possibly relative URL against the application origin and
/// canonicalize it.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Resolve relative references (`/`, `assets/app.js`) against `base`
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn resolve(base: &Url, input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let parsed = base.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    canonicalize(parsed)
}

/// Canonicalize an absolute URL so equal resources share one cache key.
pub fn canonicalize(mut parsed: Url) -> Result<Url, UrlError> {
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let lowered = host.to_lowercase();
        if lowered != host {
            parsed
                .set_host(Some(&lowered))
                .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
        }
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("https://campus.test").unwrap()
    }

    #[test]
    fn test_resolve_root() {
        let url = resolve(&origin(), "/").unwrap();
        assert_eq!(url.as_str(), "https://campus.test/");
    }

    #[test]
    fn test_resolve_relative_asset() {
        let url = resolve(&origin(), "assets/index-4f2a.js").unwrap();
        assert_eq!(url.as_str(), "https://campus.test/assets/index-4f2a.js");
    }

    #[test]
    fn test_resolve_absolute_keeps_other_origin() {
        let url = resolve(&origin(), "https://fonts.gstatic.com/s/inter.woff2").unwrap();
        assert_eq!(url.host_str(), Some("fonts.gstatic.com"));
    }

    #[test]
    fn test_canonicalize_lowercase_host() {
        let url = resolve(&origin(), "https://XYZ.Supabase.CO/rest/v1/courses").unwrap();
        assert_eq!(url.host_str(), Some("xyz.supabase.co"));
        assert_eq!(url.path(), "/rest/v1/courses");
    }

    #[test]
    fn test_canonicalize_remove_fragment_keep_query() {
        let url = resolve(&origin(), "/courses?id=4&tab=lessons#intro").unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.query(), Some("id=4&tab=lessons"));
    }

    #[test]
    fn test_resolve_empty() {
        assert!(matches!(resolve(&origin(), "   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_canonicalize_unsupported_scheme() {
        let result = resolve(&origin(), "data:text/plain,hello");
        assert!(matches!(result, Err(UrlError::UnsupportedScheme(_))));
    }
}
