//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the mirror, including:
//! - Building the HTTP client from the job's identity, proxy and TLS settings
//! - GET requests with per-request basic auth
//! - Size and ignored-MIME checks before and while the body is read
//! - Error classification into transient and permanent failures
//!
//! Fetching sits behind the [`FetchStrategy`] trait so that an embedder can
//! swap in a strategy that renders pages before their links are extracted.

use std::fmt;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{redirect::Policy, Client, Proxy, Response};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::classify::mime_matches;
use crate::config::{AuthConfig, Config};
use crate::state::{FailReason, SkipReason};

/// Redirect hops followed before a request fails
pub const MAX_REDIRECTS: usize = 10;

/// A successful response, fully read
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    /// URL after redirects
    pub final_url: Url,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Why a fetch produced no usable response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("fetch failed: {0}")]
    Failed(FailReason),

    #[error("fetch skipped: {0}")]
    Skipped(SkipReason),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Failed(reason) if reason.is_transient())
    }
}

/// Retrieves one URL
///
/// Implementations must enforce the job's size limit and ignored MIME types
/// and report failures with a [`FailReason`]. Retries are the caller's job.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, FetchError>;

    /// Short name used in logs
    fn name(&self) -> &str {
        "http"
    }
}

/// Builds the HTTP client shared by page and robots requests
///
/// # Arguments
///
/// * `config` - The job configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Invalid proxy or TLS backend failure
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    let job = &config.job;

    let mut builder = Client::builder()
        .user_agent(config.user_agent.resolve())
        .default_headers(default_headers(config))
        .timeout(job.timeout())
        .connect_timeout(job.timeout())
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .danger_accept_invalid_certs(job.ignore_https_errors);

    if let Some(proxy_config) = &config.proxy {
        let mut proxy = Proxy::all(proxy_config.url.as_str())?;
        if let Some(username) = &proxy_config.username {
            proxy = proxy.basic_auth(username, proxy_config.password.as_deref().unwrap_or(""));
        }
        builder = builder.proxy(proxy);
    }

    builder.build()
}

fn default_headers(config: &Config) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for entry in &config.headers {
        match (
            HeaderName::from_bytes(entry.name.as_bytes()),
            HeaderValue::from_str(&entry.value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!(header = %entry.name, "ignoring invalid custom header"),
        }
    }
    headers
}

/// Plain HTTP(S) strategy
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    auth: Option<AuthConfig>,
    /// Bytes; 0 means unlimited
    max_file_size: u64,
    ignored_mime_types: Vec<String>,
}

impl fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("max_file_size", &self.max_file_size)
            .field("ignored_mime_types", &self.ignored_mime_types)
            .field("auth", &self.auth.as_ref().map(|a| a.username.as_str()))
            .finish()
    }
}

impl HttpFetcher {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            auth: config.auth.clone(),
            max_file_size: config.job.max_file_size,
            ignored_mime_types: config.job.ignored_mime_types.clone(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config)?, config))
    }

    /// Sends a GET and maps non-success statuses to failures
    pub async fn send(&self, url: &Url) -> Result<Response, FailReason> {
        let mut request = self.client.get(url.clone());
        if let Some(auth) = &self.auth {
            request = request.basic_auth(&auth.username, auth.password.as_deref());
        }

        let response = request.send().await.map_err(|e| classify_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            debug!(url = %url, status = status.as_u16(), "non-success status");
            return Err(FailReason::HttpStatus(status.as_u16()));
        }
        Ok(response)
    }

    fn exceeds_limit(&self, size: u64) -> bool {
        self.max_file_size > 0 && size > self.max_file_size
    }

    fn is_ignored(&self, content_type: &str) -> bool {
        self.ignored_mime_types
            .iter()
            .any(|pattern| mime_matches(pattern, content_type))
    }
}

#[async_trait]
impl FetchStrategy for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, FetchError> {
        let mut response = self.send(url).await.map_err(FetchError::Failed)?;
        let status = response.status().as_u16();
        let final_url = response.url().clone();

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        if let Some(ct) = &content_type {
            if self.is_ignored(ct) {
                debug!(url = %url, content_type = %ct, "ignored MIME type");
                return Err(FetchError::Skipped(SkipReason::IgnoredMimeType));
            }
        }

        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if let Some(length) = declared {
            if self.exceeds_limit(length) {
                debug!(url = %url, length, "declared size over limit");
                return Err(FetchError::Skipped(SkipReason::TooLarge));
            }
        }

        let mut body = Vec::with_capacity(declared.unwrap_or(0).min(1 << 20) as usize);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Failed(classify_error(&e)))?
        {
            if self.exceeds_limit((body.len() + chunk.len()) as u64) {
                debug!(url = %url, "measured size over limit");
                return Err(FetchError::Skipped(SkipReason::TooLarge));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchResponse {
            status,
            final_url,
            content_type,
            body,
        })
    }
}

/// Maps a reqwest error onto a failure reason
///
/// | Condition | Reason | Retried |
/// |-----------|--------|---------|
/// | Timeout | Timeout | yes |
/// | Redirect limit | TooManyRedirects | no |
/// | Name resolution | Dns | no |
/// | Certificate / handshake | Tls | no |
/// | Refused / reset / body cut off | Connection | yes |
pub fn classify_error(error: &reqwest::Error) -> FailReason {
    if error.is_timeout() {
        return FailReason::Timeout;
    }
    if error.is_redirect() {
        return FailReason::TooManyRedirects;
    }
    if error.is_builder() {
        return FailReason::Internal;
    }

    let chain = error_chain(error).to_lowercase();
    if chain.contains("dns error")
        || chain.contains("failed to lookup address")
        || chain.contains("name or service not known")
        || chain.contains("no such host")
    {
        return FailReason::Dns;
    }
    if chain.contains("certificate") || chain.contains("tls") || chain.contains("handshake") {
        return FailReason::Tls;
    }
    if chain.contains("timed out") {
        return FailReason::Timeout;
    }

    FailReason::Connection
}

fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
