//! Robots.txt handling module
//!
//! This module fetches, parses and caches robots.txt per origin and answers
//! whether a URL may be fetched. Every origin's file is requested at most once
//! per TTL, however many workers ask concurrently.

mod cache;
mod parser;

pub use cache::{CachedRobots, ROBOTS_TTL_HOURS};
pub use parser::ParsedRobots;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use crate::crawler::{HttpFetcher, RetryDecision, RetryPolicy};
use crate::state::FailReason;

/// Bytes of robots.txt that are evaluated; the rest is ignored
const MAX_ROBOTS_BYTES: usize = 512 * 1024;

type OriginSlot = Arc<tokio::sync::Mutex<Option<Arc<CachedRobots>>>>;

/// Outcome of a robots check for one URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobotsVerdict {
    pub allowed: bool,
    /// Crawl-delay that applies to our user agent on this origin
    pub crawl_delay: Option<Duration>,
}

impl RobotsVerdict {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            crawl_delay: None,
        }
    }
}

/// Per-job robots policy evaluator
#[derive(Debug)]
pub struct RobotsEvaluator {
    enabled: bool,
    http: HttpFetcher,
    user_agent: String,
    retry: RetryPolicy,
    origins: Mutex<HashMap<String, OriginSlot>>,
}

impl RobotsEvaluator {
    pub fn new(enabled: bool, http: HttpFetcher, user_agent: String, retry: RetryPolicy) -> Self {
        Self {
            enabled,
            http,
            user_agent,
            retry,
            origins: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// Always true when robots handling is disabled.
    pub async fn is_allowed(&self, url: &Url, user_agent: &str) -> bool {
        if !self.enabled {
            return true;
        }
        match self.rules_for(url).await {
            Some(rules) => rules.is_allowed(url.as_str(), user_agent),
            None => true,
        }
    }

    /// Evaluates a URL for the job's own user agent
    pub async fn check(&self, url: &Url) -> RobotsVerdict {
        if !self.enabled {
            return RobotsVerdict::allow();
        }
        let Some(rules) = self.rules_for(url).await else {
            return RobotsVerdict::allow();
        };
        RobotsVerdict {
            allowed: rules.is_allowed(url.as_str(), &self.user_agent),
            crawl_delay: rules.crawl_delay(&self.user_agent),
        }
    }

    /// Cached rules for the URL's origin, fetching them when missing or stale
    async fn rules_for(&self, url: &Url) -> Option<Arc<CachedRobots>> {
        let origin = url.origin();
        if !origin.is_tuple() {
            return None;
        }
        let key = origin.ascii_serialization();

        let slot = {
            let mut origins = self.origins.lock().ok()?;
            origins.entry(key.clone()).or_default().clone()
        };

        // Held across the fetch so concurrent callers wait for one request
        let mut cached = slot.lock().await;
        if let Some(rules) = cached.as_ref() {
            if !rules.is_stale() {
                return Some(rules.clone());
            }
            debug!(origin = %key, "robots.txt expired");
        }

        let robots_url = url.join("/robots.txt").ok()?;
        let rules = Arc::new(CachedRobots::new(self.fetch_rules(&robots_url).await));
        *cached = Some(rules.clone());
        Some(rules)
    }

    /// Fetches and parses robots.txt, falling back to allow-all
    async fn fetch_rules(&self, robots_url: &Url) -> ParsedRobots {
        let mut attempt = 1;
        loop {
            let failure = match self.http.send(robots_url).await {
                Ok(response) => match response.bytes().await {
                    Ok(body) => {
                        let body = &body[..body.len().min(MAX_ROBOTS_BYTES)];
                        info!(url = %robots_url, bytes = body.len(), "fetched robots.txt");
                        return ParsedRobots::from_content(&String::from_utf8_lossy(body));
                    }
                    Err(e) => crate::crawler::classify_error(&e),
                },
                Err(reason) => reason,
            };

            match self.retry.should_retry(&failure, attempt) {
                RetryDecision::Retry { delay, attempt: next } => {
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::GiveUp => {
                    match failure {
                        FailReason::HttpStatus(status) if (400..500).contains(&status) => {
                            debug!(url = %robots_url, status, "no robots.txt, allowing all");
                        }
                        other => {
                            warn!(url = %robots_url, reason = %other, "robots.txt unavailable, allowing all");
                        }
                    }
                    return ParsedRobots::allow_all();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn evaluator(enabled: bool) -> RobotsEvaluator {
        let config = Config::default();
        RobotsEvaluator::new(
            enabled,
            HttpFetcher::from_config(&config).unwrap(),
            "sumi-mirror/1.0".to_string(),
            RetryPolicy::new(2, Duration::from_millis(10)),
        )
    }

    fn url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
    }

    #[tokio::test]
    async fn test_disallowed_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("User-agent: *\nDisallow: /private/\nCrawl-delay: 2"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let robots = evaluator(true);
        let denied = robots.check(&url(&server, "/private/x.html")).await;
        assert!(!denied.allowed);
        assert_eq!(denied.crawl_delay, Some(Duration::from_secs(2)));

        assert!(robots.check(&url(&server, "/public/x.html")).await.allowed);
        assert!(
            robots
                .is_allowed(&url(&server, "/index.html"), "OtherAgent/1.0")
                .await
        );
    }

    #[tokio::test]
    async fn test_disabled_never_fetches() {
        let server = MockServer::start().await;
        Mock::given(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /"))
            .expect(0)
            .mount(&server)
            .await;

        let robots = evaluator(false);
        assert!(robots.check(&url(&server, "/private/x.html")).await.allowed);
    }

    #[tokio::test]
    async fn test_missing_robots_allows_all() {
        let server = MockServer::start().await;
        Mock::given(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let robots = evaluator(true);
        assert!(robots.check(&url(&server, "/anything")).await.allowed);
        assert!(robots.check(&url(&server, "/else")).await.allowed);
    }

    #[tokio::test]
    async fn test_server_error_retried_then_allows_all() {
        let server = MockServer::start().await;
        Mock::given(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let robots = evaluator(true);
        assert!(robots.check(&url(&server, "/page")).await.allowed);
    }

    #[tokio::test]
    async fn test_concurrent_checks_fetch_once() {
        let server = MockServer::start().await;
        Mock::given(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("User-agent: *\nDisallow: /x")
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let robots = Arc::new(evaluator(true));
        let mut handles = Vec::new();
        for i in 0..5 {
            let robots = robots.clone();
            let target = url(&server, &format!("/page{}", i));
            handles.push(tokio::spawn(async move { robots.check(&target).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().allowed);
        }
    }
}
