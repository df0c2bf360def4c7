use crate::UrlError;
use url::Url;

/// Options applied on top of the fixed normalization rules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Drop the query string entirely
    pub strip_query: bool,
}

/// Normalizes a URL according to Sumi-Mirror's normalization rules
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject anything that is not HTTP(S) or has no host
/// 3. Lowercase the host
/// 4. Strip the port when it is the scheme default
/// 5. Remove dot segments; an empty path becomes `/`
/// 6. Remove the fragment
///
/// Unlike a link-graph crawler, a mirror keeps the scheme, `www.` prefix,
/// trailing slash and query order intact: each of them can address a
/// different stored file.
///
/// # Examples
///
/// ```
/// use sumi_mirror::url::normalize_url;
///
/// let url = normalize_url("HTTP://Example.COM:80/a/../b#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/b");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_parsed(url, NormalizeOptions::default())
}

/// Normalizes an already parsed URL
pub fn normalize_parsed(mut url: Url, options: NormalizeOptions) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url.host_str().ok_or(UrlError::MissingHost)?.to_lowercase();
    if host.is_empty() {
        return Err(UrlError::MissingHost);
    }
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    if url.port().is_some() && url.port() == default_port(url.scheme()) {
        let _ = url.set_port(None);
    }

    if url.path().is_empty() {
        url.set_path("/");
    }

    url.set_fragment(None);

    if options.strip_query || url.query() == Some("") {
        url.set_query(None);
    }

    Ok(url)
}

/// Resolves a reference found in a document against the document's base URL
///
/// Returns None if the reference should not be followed:
/// - empty or fragment-only references
/// - `javascript:`, `mailto:`, `tel:` and `data:` schemes
/// - anything that does not resolve to HTTP(S)
pub fn resolve_reference(base: &Url, reference: &str) -> Option<Url> {
    let reference = reference.trim();

    if reference.is_empty() || reference.starts_with('#') {
        return None;
    }

    let lower = reference.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
        || lower.starts_with("about:")
        || lower.starts_with("blob:")
    {
        return None;
    }

    let resolved = base.join(reference).ok()?;
    if resolved.scheme() == "http" || resolved.scheme() == "https" {
        Some(resolved)
    } else {
        None
    }
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}
