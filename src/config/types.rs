use crate::classify::ResourceKind;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Chrome on Windows, used when no identity is configured
const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36";
const FIREFOX_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:118.0) Gecko/20100101 Firefox/118.0";
const SAFARI_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_5) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Safari/605.1.15";
const EDGE_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36 Edg/115.0.1901.188";

/// Main configuration structure for Sumi-Mirror
///
/// A `Config` is the frozen snapshot a job runs with; it is never mutated once
/// the job has started.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub job: JobConfig,
    #[serde(default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default, rename = "header")]
    pub headers: Vec<HeaderEntry>,
}

/// Crawl behaviour for one job
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobConfig {
    /// Entry URLs, admitted at depth 0
    pub seeds: Vec<String>,

    /// Directory the mirror is written to
    pub output_root: PathBuf,

    /// Resource kinds to download besides HTML
    #[serde(default = "default_resource_types")]
    pub resource_types: Vec<ResourceKind>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Retries after the first attempt for transient failures
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Base delay of the exponential retry backoff (milliseconds)
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: u64,

    /// Maximum link depth from a seed
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Number of fetch workers
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    #[serde(default = "default_true")]
    pub respect_robots: bool,

    /// Minimum interval between requests (milliseconds, 0 disables)
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u64,

    /// Apply the rate limit per host instead of across the whole job
    #[serde(default)]
    pub per_host_rate_limit: bool,

    #[serde(default)]
    pub ignore_https_errors: bool,

    /// Maximum size of a single resource in bytes (0 = unlimited)
    #[serde(default)]
    pub max_file_size: u64,

    #[serde(default)]
    pub structure: StructureMode,

    #[serde(default)]
    pub follow_external_links: bool,

    /// MIME types never stored, e.g. "video/mp4" or "video/*"
    #[serde(default)]
    pub ignored_mime_types: Vec<String>,

    /// Wall-clock time before which the job does not start
    #[serde(default)]
    pub scheduled_start: Option<DateTime<Utc>>,

    /// URL globs never admitted to the frontier
    #[serde(default)]
    pub exclusions: Vec<String>,

    #[serde(default)]
    pub remove_query_strings: bool,

    /// Cache database location; defaults to `<output-root>/.sumi-mirror/cache.db`
    #[serde(default)]
    pub cache_path: Option<PathBuf>,

    /// Optional markdown job report
    #[serde(default)]
    pub report_path: Option<PathBuf>,

    /// Capacity of the progress event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            output_root: PathBuf::from("mirror"),
            resource_types: default_resource_types(),
            timeout: default_timeout(),
            retries: default_retries(),
            retry_backoff: default_retry_backoff(),
            max_depth: default_max_depth(),
            concurrency: default_concurrency(),
            respect_robots: true,
            rate_limit: default_rate_limit(),
            per_host_rate_limit: false,
            ignore_https_errors: false,
            max_file_size: 0,
            structure: StructureMode::default(),
            follow_external_links: false,
            ignored_mime_types: Vec::new(),
            scheduled_start: None,
            exclusions: Vec::new(),
            remove_query_strings: false,
            cache_path: None,
            report_path: None,
            event_buffer: default_event_buffer(),
        }
    }
}

impl JobConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn rate_limit_interval(&self) -> Duration {
        Duration::from_millis(self.rate_limit)
    }

    /// Directory holding the cache database and original document bytes
    pub fn state_dir(&self) -> PathBuf {
        self.output_root.join(".sumi-mirror")
    }

    pub fn cache_db_path(&self) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(|| self.state_dir().join("cache.db"))
    }

    /// Returns true if resources of this kind may be admitted and stored
    ///
    /// HTML is always traversed, whatever the whitelist says.
    pub fn allows_kind(&self, kind: ResourceKind) -> bool {
        kind == ResourceKind::Html || self.resource_types.contains(&kind)
    }
}

/// Output layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureMode {
    /// Mirror each URL path under `<output-root>/<host>/`
    #[default]
    Preserve,
    /// Everything in `<output-root>/`, collisions disambiguated by content hash
    Flatten,
}

/// Named User-Agent identities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserAgentPreset {
    Chrome,
    Firefox,
    Safari,
    Edge,
    /// Honest crawler identity naming this tool
    Bot,
}

impl UserAgentPreset {
    pub fn as_header(&self) -> String {
        match self {
            Self::Chrome => CHROME_UA.to_string(),
            Self::Firefox => FIREFOX_UA.to_string(),
            Self::Safari => SAFARI_UA.to_string(),
            Self::Edge => EDGE_UA.to_string(),
            Self::Bot => format!("sumi-mirror/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// User-Agent selection: a preset or a literal string, never both
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    #[serde(default)]
    pub preset: Option<UserAgentPreset>,
    #[serde(default)]
    pub literal: Option<String>,
}

impl UserAgentConfig {
    /// Resolves the header value sent with every request
    pub fn resolve(&self) -> String {
        match (&self.literal, self.preset) {
            (Some(literal), _) => literal.clone(),
            (None, Some(preset)) => preset.as_header(),
            (None, None) => UserAgentPreset::Chrome.as_header(),
        }
    }
}

/// Outbound proxy endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// HTTP basic-auth credentials sent with every request
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// Custom request header
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

fn default_resource_types() -> Vec<ResourceKind> {
    ResourceKind::downloadable().to_vec()
}

fn default_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    1000
}

fn default_max_depth() -> u32 {
    2
}

fn default_concurrency() -> u32 {
    5
}

fn default_rate_limit() -> u64 {
    100
}

fn default_event_buffer() -> usize {
    256
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_defaults_to_chrome() {
        let ua = UserAgentConfig::default();
        assert!(ua.resolve().contains("Chrome/"));
    }

    #[test]
    fn test_user_agent_literal_wins() {
        let ua = UserAgentConfig {
            preset: None,
            literal: Some("TestBot/1.0".to_string()),
        };
        assert_eq!(ua.resolve(), "TestBot/1.0");
    }

    #[test]
    fn test_bot_preset_names_crate() {
        assert!(UserAgentPreset::Bot.as_header().starts_with("sumi-mirror/"));
    }

    #[test]
    fn test_html_always_allowed() {
        let job = JobConfig {
            resource_types: vec![ResourceKind::Css],
            ..JobConfig::default()
        };
        assert!(job.allows_kind(ResourceKind::Html));
        assert!(job.allows_kind(ResourceKind::Css));
        assert!(!job.allows_kind(ResourceKind::Image));
        assert!(!job.allows_kind(ResourceKind::Other));
    }

    #[test]
    fn test_default_cache_path_under_output_root() {
        let job = JobConfig {
            output_root: PathBuf::from("/tmp/site"),
            ..JobConfig::default()
        };
        assert_eq!(
            job.cache_db_path(),
            PathBuf::from("/tmp/site/.sumi-mirror/cache.db")
        );
    }
}
