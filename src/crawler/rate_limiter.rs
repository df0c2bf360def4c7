//! Request rate limiting
//!
//! Grants at most one outbound request per interval, either across the whole
//! job or per host. A host's robots `Crawl-delay` acts as a floor on that
//! host's interval in both modes. Waiting for a slot is cancelled by Stop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use url::Url;

use crate::config::JobConfig;
use crate::crawler::Controller;

/// Slot key shared by every host when the limit applies to the whole job
const GLOBAL_KEY: &str = "*";

type Slot = Arc<tokio::sync::Mutex<Option<Instant>>>;

/// Interval-based limiter shared by all workers of a job
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    per_host: bool,
    /// Crawl-delay floors keyed like the per-host slots
    floors: Mutex<HashMap<String, Duration>>,
    /// Time of the last grant per key; the async lock is held while waiting
    slots: Mutex<HashMap<String, Slot>>,
}

impl RateLimiter {
    pub fn new(interval: Duration, per_host: bool) -> Self {
        debug!(
            interval_ms = interval.as_millis() as u64,
            per_host, "creating rate limiter"
        );
        Self {
            interval,
            per_host,
            floors: Mutex::new(HashMap::new()),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(job: &JobConfig) -> Self {
        Self::new(job.rate_limit_interval(), job.per_host_rate_limit)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Raises the interval for one host, e.g. from a robots `Crawl-delay`
    pub fn set_host_floor(&self, url: &Url, floor: Duration) {
        if floor.is_zero() {
            return;
        }
        let key = host_key(url);
        debug!(host = %key, floor_ms = floor.as_millis() as u64, "host rate floor");
        if let Ok(mut floors) = self.floors.lock() {
            let entry = floors.entry(key).or_insert(floor);
            *entry = (*entry).max(floor);
        }
    }

    fn host_floor(&self, key: &str) -> Option<Duration> {
        self.floors.lock().ok()?.get(key).copied()
    }

    /// Keys and intervals a request to `url` must pass, host first
    fn plan(&self, url: &Url) -> Vec<(String, Duration)> {
        let key = host_key(url);
        let floor = self.host_floor(&key);
        let mut plan = Vec::with_capacity(2);

        if self.per_host {
            let interval = floor.map_or(self.interval, |f| f.max(self.interval));
            if !interval.is_zero() {
                plan.push((key, interval));
            }
        } else {
            if let Some(floor) = floor {
                plan.push((key, floor));
            }
            if !self.interval.is_zero() {
                plan.push((GLOBAL_KEY.to_string(), self.interval));
            }
        }
        plan
    }

    fn slot(&self, key: &str) -> Option<Slot> {
        let mut slots = self.slots.lock().ok()?;
        Some(
            slots
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None)))
                .clone(),
        )
    }

    /// Waits for a request slot for `url`
    ///
    /// Blocks while the job is paused. Returns false, without granting a
    /// slot, if the job is stopped before or during the wait.
    pub async fn acquire(&self, url: &Url, controller: &Controller) -> bool {
        if !controller.wait_until_running().await {
            return false;
        }

        for (key, interval) in self.plan(url) {
            let Some(slot) = self.slot(&key) else {
                continue;
            };

            let mut last = tokio::select! {
                biased;
                _ = controller.stopped() => return false,
                guard = slot.lock() => guard,
            };

            if let Some(previous) = *last {
                let elapsed = previous.elapsed();
                if elapsed < interval {
                    let delay = interval - elapsed;
                    debug!(key = %key, delay_ms = delay.as_millis() as u64, "applying rate limit delay");
                    tokio::select! {
                        biased;
                        _ = controller.stopped() => return false,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }

            *last = Some(Instant::now());
        }

        !controller.is_stopped()
    }
}

/// Host and explicit port of a URL, the unit of per-host limiting
pub(crate) fn host_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or("unknown").to_lowercase();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    }
}
