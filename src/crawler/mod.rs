//! Crawler module: the mirroring engine
//!
//! This module contains the core job logic, including:
//! - The pause/resume/stop controller shared by every component
//! - The URL frontier with admission rules and FIFO dispatch
//! - Rate limiting, HTTP fetching and retry with backoff
//! - The worker pool and per-node pipeline
//! - Overall job coordination

mod controller;
mod coordinator;
mod fetcher;
mod frontier;
mod rate_limiter;
mod retry;
mod worker;

pub use controller::{ControlError, Controller, RunState};
pub use coordinator::{run_job, Job};
pub use fetcher::{
    build_http_client, classify_error, FetchError, FetchResponse, FetchStrategy, HttpFetcher,
    MAX_REDIRECTS,
};
pub use frontier::{Admission, AdmissionPolicy, Dispatch, Frontier, FrontierCounts, UrlNode};
pub use rate_limiter::RateLimiter;
pub use retry::{RetryDecision, RetryPolicy};
