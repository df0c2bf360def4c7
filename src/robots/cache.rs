//! Cached robots rules with expiry

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};

/// How long fetched rules stay valid
pub const ROBOTS_TTL_HOURS: i64 = 24;

/// Robots rules for one origin along with when they were fetched
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub rules: ParsedRobots,
    pub fetched_at: DateTime<Utc>,
    ttl: Duration,
}

impl CachedRobots {
    pub fn new(rules: ParsedRobots) -> Self {
        Self {
            rules,
            fetched_at: Utc::now(),
            ttl: Duration::hours(ROBOTS_TTL_HOURS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns true once the rules are older than their TTL
    pub fn is_stale(&self) -> bool {
        self.age() > self.ttl
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }

    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        self.rules.is_allowed(url, user_agent)
    }

    /// Crawl delay as a std duration, ignoring zero
    pub fn crawl_delay(&self, user_agent: &str) -> Option<std::time::Duration> {
        self.rules
            .crawl_delay(user_agent)
            .filter(|secs| *secs > 0.0)
            .map(std::time::Duration::from_secs_f64)
    }
}
