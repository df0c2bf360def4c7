//! Fetch workers and the per-node pipeline
//!
//! Each worker takes nodes from the frontier until it is settled or the job
//! is stopped. For one node the order is: cache, robots, rate limiter, fetch
//! with retries, classification, storage, link discovery, recording. A node's
//! failure never leaves the worker; only a stop ends the loop early.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};
use url::Url;

use crate::classify::{classify, disambiguate, extract_links, local_path, ResourceKind};
use crate::config::StructureMode;
use crate::crawler::fetcher::{FetchError, FetchResponse, FetchStrategy};
use crate::crawler::frontier::{Dispatch, Frontier};
use crate::crawler::rate_limiter::RateLimiter;
use crate::crawler::retry::{RetryDecision, RetryPolicy};
use crate::crawler::Controller;
use crate::output::{Event, EventReporter, NodeIssue, ResourceInfo};
use crate::robots::RobotsEvaluator;
use crate::state::{FailReason, NodeState, SkipReason};
use crate::storage::{
    content_hash, CacheEntry, CacheStore, Outcome, PathClaim, ResourceFiles, StorageError,
    StorageResult, StoredResource,
};

/// Shared cache store handle; operations are short and never held across an await
pub(crate) type SharedStore = Arc<Mutex<Box<dyn CacheStore + Send>>>;

/// Running totals that the frontier does not track
#[derive(Debug, Default)]
pub(crate) struct Tally {
    pub bytes_transferred: u64,
    pub from_cache: u64,
    pub failures: Vec<NodeIssue>,
    pub skips: Vec<NodeIssue>,
}

/// Everything a worker needs, shared by all workers of a job
pub(crate) struct JobContext {
    pub job_id: i64,
    pub structure: StructureMode,
    pub frontier: Arc<Frontier>,
    pub controller: Controller,
    pub limiter: RateLimiter,
    pub robots: RobotsEvaluator,
    pub fetcher: Arc<dyn FetchStrategy>,
    pub retry: RetryPolicy,
    pub store: SharedStore,
    pub files: ResourceFiles,
    pub reporter: EventReporter,
    pub tally: Mutex<Tally>,
}

impl JobContext {
    pub fn store(&self) -> MutexGuard<'_, Box<dyn CacheStore + Send>> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn tally(&self) -> MutexGuard<'_, Tally> {
        self.tally.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// How a node ended
#[derive(Debug)]
enum NodeResult {
    Stored {
        resource: StoredResource,
        attempts: u32,
        transferred: u64,
        from_cache: bool,
    },
    Skipped {
        reason: SkipReason,
        attempts: u32,
        from_cache: bool,
    },
    Failed {
        reason: FailReason,
        attempts: u32,
        from_cache: bool,
    },
}

impl NodeResult {
    fn skipped(reason: SkipReason, attempts: u32) -> Self {
        Self::Skipped {
            reason,
            attempts,
            from_cache: false,
        }
    }

    fn failed(reason: FailReason, attempts: u32) -> Self {
        Self::Failed {
            reason,
            attempts,
            from_cache: false,
        }
    }
}

/// Worker loop
pub(crate) async fn run_worker(id: usize, ctx: Arc<JobContext>) {
    debug!(worker = id, "worker started");

    while let Some(dispatch) = ctx.frontier.next(&ctx.controller).await {
        let result = tokio::select! {
            biased;
            _ = ctx.controller.stopped() => NodeResult::skipped(SkipReason::Cancelled, 0),
            result = process(&ctx, &dispatch) => result,
        };
        settle(&ctx, dispatch, result);
    }

    debug!(worker = id, "worker finished");
}

async fn process(ctx: &JobContext, dispatch: &Dispatch) -> NodeResult {
    let url = dispatch.url();
    ctx.reporter.emit(Event::TaskStarted {
        url: dispatch.key().to_string(),
        depth: dispatch.depth(),
    });

    if let Some(result) = reuse_cached(ctx, dispatch).await {
        return result;
    }

    let verdict = ctx.robots.check(url).await;
    if let Some(delay) = verdict.crawl_delay {
        ctx.limiter.set_host_floor(url, delay);
    }
    if !verdict.allowed {
        debug!(url = %url, "disallowed by robots.txt");
        return NodeResult::skipped(SkipReason::RobotsDenied, 0);
    }

    let (response, attempts) = match fetch_with_retry(ctx, url).await {
        Ok(fetched) => fetched,
        Err(result) => return result,
    };

    let kind = classify(response.content_type.as_deref(), &response.final_url, &response.body);
    if !ctx.frontier.policy().allows_kind(kind) {
        debug!(url = %url, kind = %kind, "fetched kind not whitelisted");
        return NodeResult::skipped(SkipReason::TypeNotWhitelisted, attempts);
    }

    let resource = match store_resource(ctx, url, kind, &response).await {
        Ok(resource) => resource,
        Err(e) => {
            warn!(url = %url, error = %e, "failed to store resource");
            return NodeResult::failed(FailReason::Io(e.to_string()), attempts);
        }
    };

    discover(ctx, dispatch, kind, &response.body, &response.final_url);

    NodeResult::Stored {
        resource,
        attempts,
        transferred: response.body.len() as u64,
        from_cache: false,
    }
}

/// Honors the outcome an earlier job recorded for this node
///
/// Permanent failures and policy skips are settled as recorded, without a
/// request or a robots.txt lookup. Transient failures and cancelled nodes
/// are fetched again. A robots denial is only honored while robots.txt is
/// respected.
async fn reuse_cached(ctx: &JobContext, dispatch: &Dispatch) -> Option<NodeResult> {
    let entry: CacheEntry = match ctx.store().lookup(dispatch.key()) {
        Ok(entry) => entry?,
        Err(e) => {
            warn!(url = %dispatch.key(), error = %e, "cache lookup failed");
            return None;
        }
    };

    match entry.outcome {
        Outcome::Done(resource) => reuse_stored(ctx, dispatch, resource, entry.attempt_count).await,
        Outcome::Failed(reason) if reason.is_permanent() => {
            debug!(url = %dispatch.key(), reason = %reason, "failure settled from cache");
            Some(NodeResult::Failed {
                reason,
                attempts: entry.attempt_count,
                from_cache: true,
            })
        }
        Outcome::Skipped(reason)
            if reason.is_permanent()
                && (reason != SkipReason::RobotsDenied || ctx.robots.is_enabled()) =>
        {
            debug!(url = %dispatch.key(), reason = %reason, "skip settled from cache");
            Some(NodeResult::Skipped {
                reason,
                attempts: entry.attempt_count,
                from_cache: true,
            })
        }
        _ => None,
    }
}

/// Honors a Done entry
///
/// Pages and stylesheets are re-parsed from their stored original so
/// traversal continues without touching the network. An entry whose bytes
/// are gone is invalidated and the node is fetched again.
async fn reuse_stored(
    ctx: &JobContext,
    dispatch: &Dispatch,
    resource: StoredResource,
    attempts: u32,
) -> Option<NodeResult> {
    let available = if resource.kind.is_parsed() {
        match ctx.files.load_original(&resource.content_hash).await {
            Ok(Some(original)) => {
                let base = Url::parse(&resource.final_url).unwrap_or_else(|_| dispatch.url().clone());
                discover(ctx, dispatch, resource.kind, &original, &base);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(url = %dispatch.key(), error = %e, "failed to read stored original");
                false
            }
        }
    } else {
        ctx.files.exists(&resource.local_path).await
    };

    if !available {
        warn!(url = %dispatch.key(), "cached resource missing on disk, fetching again");
        if let Err(e) = ctx.store().invalidate(dispatch.key()) {
            warn!(url = %dispatch.key(), error = %e, "failed to invalidate cache entry");
        }
        return None;
    }

    debug!(url = %dispatch.key(), "satisfied from cache");
    Some(NodeResult::Stored {
        resource,
        attempts,
        transferred: 0,
        from_cache: true,
    })
}

/// Fetches through the rate limiter, retrying transient failures
async fn fetch_with_retry(
    ctx: &JobContext,
    url: &Url,
) -> Result<(FetchResponse, u32), NodeResult> {
    let mut attempt = 1;
    loop {
        if !ctx.limiter.acquire(url, &ctx.controller).await {
            return Err(NodeResult::skipped(SkipReason::Cancelled, attempt - 1));
        }

        match ctx.fetcher.fetch(url).await {
            Ok(response) => return Ok((response, attempt)),
            Err(FetchError::Skipped(reason)) => {
                return Err(NodeResult::skipped(reason, attempt));
            }
            Err(FetchError::Failed(reason)) => match ctx.retry.should_retry(&reason, attempt) {
                RetryDecision::Retry { delay, attempt: next } => {
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::GiveUp => return Err(NodeResult::failed(reason, attempt)),
            },
        }
    }
}

/// Writes the body under a claimed local path
///
/// Pages and stylesheets also keep their original bytes, from which the
/// finalize pass regenerates the rewritten copy.
async fn store_resource(
    ctx: &JobContext,
    url: &Url,
    kind: ResourceKind,
    response: &FetchResponse,
) -> StorageResult<StoredResource> {
    let hash = content_hash(&response.body);
    let wanted = local_path(ctx.structure, url, kind, response.content_type.as_deref());
    let (path, claim) = claim_local_path(ctx, &wanted, &hash)?;

    if kind.is_parsed() {
        ctx.files.store_original(&hash, &response.body).await?;
    }
    if claim == PathClaim::Claimed || !ctx.files.exists(&path).await {
        ctx.files.write(&path, &response.body).await?;
    } else {
        debug!(url = %url, path = %path, "identical content already stored");
    }

    Ok(StoredResource {
        local_path: path,
        content_hash: hash,
        content_type: response.content_type.clone(),
        kind,
        byte_size: response.body.len() as u64,
        final_url: response.final_url.to_string(),
    })
}

/// Claims `wanted`, or its content-hash variant when other content holds it
fn claim_local_path(
    ctx: &JobContext,
    wanted: &str,
    hash: &str,
) -> StorageResult<(String, PathClaim)> {
    let mut store = ctx.store();
    match store.claim_path(wanted, hash)? {
        PathClaim::Taken => {
            let alternative = disambiguate(wanted, hash);
            debug!(wanted = %wanted, path = %alternative, "local path collision");
            match store.claim_path(&alternative, hash)? {
                PathClaim::Taken => Err(StorageError::Corrupt(alternative)),
                claim => Ok((alternative, claim)),
            }
        }
        claim => Ok((wanted.to_string(), claim)),
    }
}

/// Offers every reference of a page or stylesheet to the frontier
fn discover(ctx: &JobContext, dispatch: &Dispatch, kind: ResourceKind, body: &[u8], base: &Url) {
    if !kind.is_parsed() {
        return;
    }
    let references = extract_links(kind, body, base);
    let mut admitted = 0;
    for reference in &references {
        let admission = ctx.frontier.enqueue(
            &reference.url,
            Some(dispatch.depth()),
            Some(dispatch.url()),
            reference.hint,
        );
        if admission.is_admitted() {
            admitted += 1;
        }
    }
    debug!(
        url = %dispatch.key(),
        found = references.len(),
        admitted,
        "links extracted"
    );
}

/// Records the outcome, reports it and settles the node
fn settle(ctx: &JobContext, dispatch: Dispatch, result: NodeResult) {
    let key = dispatch.key().to_string();

    let (state, event) = match result {
        NodeResult::Stored {
            resource,
            attempts,
            transferred,
            from_cache,
        } => {
            if !from_cache {
                record(ctx, &key, &Outcome::Done(resource.clone()), attempts);
            }
            {
                let mut tally = ctx.tally();
                tally.bytes_transferred += transferred;
                if from_cache {
                    tally.from_cache += 1;
                }
            }
            info!(url = %key, path = %resource.local_path, bytes = resource.byte_size, from_cache, "stored");
            let event = Event::TaskSucceeded {
                url: key.clone(),
                resource: ResourceInfo {
                    local_path: resource.local_path,
                    kind: resource.kind,
                    content_type: resource.content_type,
                    byte_size: resource.byte_size,
                    content_hash: resource.content_hash,
                    from_cache,
                },
            };
            (NodeState::Done, event)
        }
        NodeResult::Skipped {
            reason,
            attempts,
            from_cache,
        } => {
            if !from_cache {
                record(ctx, &key, &Outcome::Skipped(reason), attempts);
            }
            ctx.tally().skips.push(NodeIssue {
                url: key.clone(),
                reason: reason.as_code().to_string(),
            });
            debug!(url = %key, reason = %reason, "skipped");
            (NodeState::Skipped, Event::TaskSkipped { url: key.clone(), reason })
        }
        NodeResult::Failed {
            reason,
            attempts,
            from_cache,
        } => {
            if !from_cache {
                record(ctx, &key, &Outcome::Failed(reason.clone()), attempts);
            }
            ctx.tally().failures.push(NodeIssue {
                url: key.clone(),
                reason: reason.as_code(),
            });
            warn!(url = %key, reason = %reason, attempts, "failed");
            (
                NodeState::Failed,
                Event::TaskFailed {
                    url: key.clone(),
                    reason,
                    attempts,
                },
            )
        }
    };

    dispatch.complete(state);
    ctx.reporter.emit(event);
}

fn record(ctx: &JobContext, key: &str, outcome: &Outcome, attempts: u32) {
    if let Err(e) = ctx.store().record(ctx.job_id, key, outcome, attempts) {
        warn!(url = %key, error = %e, "failed to record outcome");
    }
}

/// Settles nodes that never left the queue because the job stopped
pub(crate) fn cancel_pending(ctx: &JobContext) {
    let drained = ctx.frontier.drain_pending();
    if drained.is_empty() {
        return;
    }
    info!(count = drained.len(), "cancelling pending nodes");

    let mut tally = ctx.tally();
    for node in drained {
        if let Err(e) = ctx.store().record(
            ctx.job_id,
            &node.key,
            &Outcome::Skipped(SkipReason::Cancelled),
            0,
        ) {
            warn!(url = %node.key, error = %e, "failed to record outcome");
        }
        tally.skips.push(NodeIssue {
            url: node.key.clone(),
            reason: SkipReason::Cancelled.as_code().to_string(),
        });
        ctx.reporter.emit(Event::TaskSkipped {
            url: node.key,
            reason: SkipReason::Cancelled,
        });
    }
}
