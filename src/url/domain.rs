use url::{Host, Url};

/// Extracts the domain from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
/// If the URL has no host (which shouldn't happen for valid HTTP(S) URLs), it returns None.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_mirror::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the registrable domain of a URL's host
///
/// The registrable domain is the public suffix of the host plus one label,
/// looked up in the Public Suffix List (private entries such as `github.io`
/// included). IP addresses, single-label hosts (`localhost`) and hosts that
/// are themselves a public suffix are their own registrable domain.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_mirror::url::registrable_domain;
///
/// let url = Url::parse("https://blog.example.com/").unwrap();
/// assert_eq!(registrable_domain(&url).as_deref(), Some("example.com"));
///
/// let url = Url::parse("https://shop.example.co.uk/").unwrap();
/// assert_eq!(registrable_domain(&url).as_deref(), Some("example.co.uk"));
///
/// let url = Url::parse("https://alice.github.io/").unwrap();
/// assert_eq!(registrable_domain(&url).as_deref(), Some("alice.github.io"));
/// ```
pub fn registrable_domain(url: &Url) -> Option<String> {
    match url.host()? {
        Host::Ipv4(addr) => Some(addr.to_string()),
        Host::Ipv6(addr) => Some(addr.to_string()),
        Host::Domain(domain) => Some(registrable_from_host(domain)),
    }
}

fn registrable_from_host(host: &str) -> String {
    let host = host.trim_end_matches('.').to_lowercase();
    match psl::domain_str(&host) {
        Some(domain) => domain.to_string(),
        None => host,
    }
}

/// Returns true if both URLs share a registrable domain
pub fn same_site(a: &Url, b: &Url) -> bool {
    match (registrable_domain(a), registrable_domain(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
