//! Job coordinator - main mirroring orchestration logic
//!
//! This module runs one job from start to terminal report:
//! - Waiting for the scheduled start, if any
//! - Opening the cache store and recording the job
//! - Seeding the frontier and running the worker pool
//! - Settling leftovers after a stop
//! - Rewriting stored pages and stylesheets for offline browsing
//! - Producing the summary, the job record and the optional report

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use crate::classify::LinkRewriter;
use crate::config::{hash_config_content, validate, Config};
use crate::crawler::fetcher::{FetchStrategy, HttpFetcher};
use crate::crawler::frontier::{AdmissionPolicy, Frontier};
use crate::crawler::rate_limiter::RateLimiter;
use crate::crawler::retry::RetryPolicy;
use crate::crawler::worker::{cancel_pending, run_worker, JobContext, SharedStore, Tally};
use crate::crawler::Controller;
use crate::output::{write_markdown_report, Event, EventReporter, EventStream, JobSummary};
use crate::robots::RobotsEvaluator;
use crate::storage::{open_storage, CacheStore, JobStatus, ResourceFiles};
use crate::url::{normalize_parsed, NormalizeOptions};
use crate::{MirrorError, Result};

/// One mirroring run over a frozen configuration
pub struct Job {
    config: Arc<Config>,
    config_hash: String,
    fresh: bool,
    controller: Controller,
    reporter: EventReporter,
    fetch_strategy: Option<Arc<dyn FetchStrategy>>,
}

impl Job {
    /// Creates a job
    ///
    /// # Arguments
    ///
    /// * `config` - The job configuration, validated here
    /// * `fresh` - Clear the cache store first so nothing is reused
    ///
    /// # Returns
    ///
    /// * `Ok(Job)` - Ready to run
    /// * `Err(MirrorError)` - The configuration is invalid
    pub fn new(config: Config, fresh: bool) -> Result<Self> {
        validate(&config)?;
        let config_hash = hash_config_content(&format!("{:?}", config));
        let reporter = EventReporter::new(config.job.event_buffer);

        Ok(Self {
            config: Arc::new(config),
            config_hash,
            fresh,
            controller: Controller::new(),
            reporter,
            fetch_strategy: None,
        })
    }

    /// Uses the hash of the configuration file instead of the derived one
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    /// Replaces plain HTTP fetching, e.g. with a strategy that renders pages
    pub fn with_fetch_strategy(mut self, strategy: Arc<dyn FetchStrategy>) -> Self {
        self.fetch_strategy = Some(strategy);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle to pause, resume or stop this job
    pub fn controller(&self) -> Controller {
        self.controller.clone()
    }

    /// Subscribes to progress events; only events emitted afterwards are seen
    pub fn events(&self) -> EventStream {
        self.reporter.subscribe()
    }

    /// Runs the job to completion or until stopped
    ///
    /// Only a cache store or output root that cannot be opened is fatal;
    /// node failures end up in the summary.
    pub async fn run(self) -> Result<JobSummary> {
        let job = &self.config.job;

        if let Some(start_at) = job.scheduled_start {
            wait_for_start(start_at, &self.controller).await;
        }

        let started_at = Utc::now();
        std::fs::create_dir_all(&job.output_root)?;

        let mut storage = open_storage(&job.cache_db_path())?;
        if self.fresh {
            info!("clearing cache store for a fresh run");
            storage.clear()?;
        }
        let job_id = storage.create_job(&self.config_hash)?;
        let storage: Box<dyn CacheStore + Send> = Box::new(storage);
        let store: SharedStore = Arc::new(Mutex::new(storage));

        let http = HttpFetcher::from_config(&self.config)?;
        let fetcher: Arc<dyn FetchStrategy> = match &self.fetch_strategy {
            Some(strategy) => strategy.clone(),
            None => Arc::new(http.clone()),
        };
        let retry = RetryPolicy::from_config(job);
        let normalize = NormalizeOptions {
            strip_query: job.remove_query_strings,
        };

        let seeds = job
            .seeds
            .iter()
            .map(|seed| -> Result<Url> { Ok(normalize_parsed(Url::parse(seed)?, normalize)?) })
            .collect::<Result<Vec<Url>>>()?;

        let frontier = Arc::new(Frontier::new(AdmissionPolicy::from_config(job, &seeds)));
        for seed in &seeds {
            frontier.enqueue(seed, None, None, None);
        }

        let ctx = Arc::new(JobContext {
            job_id,
            structure: job.structure,
            frontier,
            controller: self.controller.clone(),
            limiter: RateLimiter::from_config(job),
            robots: RobotsEvaluator::new(
                job.respect_robots,
                http,
                self.config.user_agent.resolve(),
                retry.clone(),
            ),
            fetcher,
            retry,
            store,
            files: ResourceFiles::new(&job.output_root, &job.state_dir()),
            reporter: self.reporter.clone(),
            tally: Mutex::new(Tally::default()),
        });

        info!(
            job_id,
            seeds = seeds.len(),
            workers = job.concurrency,
            strategy = ctx.fetcher.name(),
            "job started"
        );
        self.reporter.emit(Event::JobStarted {
            job_id,
            seeds: seeds.len(),
        });

        let mut workers = JoinSet::new();
        for id in 0..job.concurrency as usize {
            workers.spawn(run_worker(id, ctx.clone()));
        }

        let mut panicked = false;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "worker task ended abnormally");
                panicked = true;
            }
        }

        if !ctx.frontier.is_settled() {
            cancel_pending(&ctx);
        }

        let rewritten = finalize(&ctx, normalize).await;
        debug!(rewritten, "finalize pass complete");

        let status = if panicked {
            JobStatus::Failed
        } else if self.controller.is_stopped() {
            JobStatus::Stopped
        } else {
            JobStatus::Completed
        };

        let summary = build_summary(&ctx, status, started_at, &job.output_root);
        ctx.store()
            .complete_job(job_id, status, &summary.totals())
            .map_err(MirrorError::from)?;

        if let Some(report_path) = &job.report_path {
            if let Err(e) = write_markdown_report(&summary, report_path) {
                warn!(path = %report_path.display(), error = %e, "failed to write job report");
            }
        }

        info!(
            job_id,
            status = status.to_db_string(),
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            rejected = summary.rejected,
            bytes = summary.bytes_transferred,
            elapsed_secs = summary.elapsed().as_secs_f64(),
            "job finished"
        );
        self.reporter.emit(Event::JobCompleted(summary.clone()));

        Ok(summary)
    }
}

/// Creates and runs a job with default wiring
pub async fn run_job(config: Config, fresh: bool) -> Result<JobSummary> {
    Job::new(config, fresh)?.run().await
}

/// Wall-clock gate before the job starts; a stop ends the wait
async fn wait_for_start(start_at: chrono::DateTime<Utc>, controller: &Controller) {
    let Ok(wait) = (start_at - Utc::now()).to_std() else {
        return;
    };
    info!(start_at = %start_at.to_rfc3339(), "waiting for scheduled start");
    tokio::select! {
        _ = tokio::time::sleep(wait) => {}
        _ = controller.stopped() => {}
    }
}

/// Regenerates every stored page and stylesheet with local references
///
/// Targets are all Done entries of the cache store, keyed by requested and
/// by final URL. Returns the number of documents rewritten.
async fn finalize(ctx: &JobContext, normalize: NormalizeOptions) -> usize {
    let entries = match ctx.store().done_entries() {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "cannot load stored resources, skipping link rewriting");
            return 0;
        }
    };

    let mut targets: HashMap<String, String> = HashMap::new();
    for entry in &entries {
        if let Some(resource) = entry.resource() {
            targets.insert(entry.normalized_url.clone(), resource.local_path.clone());
        }
    }
    for resource in entries.iter().filter_map(|e| e.resource()) {
        let final_key = Url::parse(&resource.final_url)
            .ok()
            .and_then(|u| normalize_parsed(u, normalize).ok());
        if let Some(final_key) = final_key {
            targets
                .entry(final_key.to_string())
                .or_insert_with(|| resource.local_path.clone());
        }
    }

    let rewriter = LinkRewriter::new(&targets, normalize);
    let mut rewritten = 0;
    for entry in &entries {
        let Some(resource) = entry.resource() else {
            continue;
        };
        if !resource.kind.is_parsed() {
            continue;
        }

        let original = match ctx.files.load_original(&resource.content_hash).await {
            Ok(Some(original)) => original,
            Ok(None) => {
                warn!(url = %entry.normalized_url, "original bytes missing, not rewritten");
                continue;
            }
            Err(e) => {
                warn!(url = %entry.normalized_url, error = %e, "failed to read original");
                continue;
            }
        };

        let Ok(base) = Url::parse(&resource.final_url).or_else(|_| Url::parse(&entry.normalized_url))
        else {
            continue;
        };

        if let Some(bytes) = rewriter.rewrite(resource.kind, &original, &base, &resource.local_path) {
            match ctx.files.write(&resource.local_path, &bytes).await {
                Ok(_) => rewritten += 1,
                Err(e) => warn!(path = %resource.local_path, error = %e, "failed to write rewritten copy"),
            }
        }
    }
    rewritten
}

fn build_summary(
    ctx: &JobContext,
    status: JobStatus,
    started_at: chrono::DateTime<Utc>,
    output_root: &std::path::Path,
) -> JobSummary {
    let counts = ctx.frontier.counts();
    let mut summary = JobSummary::new(ctx.job_id, output_root, started_at);
    summary.status = status;
    summary.succeeded = counts.done;
    summary.failed = counts.failed;
    summary.skipped = counts.skipped;
    summary.rejected = counts.rejected;
    summary.finished_at = Utc::now();

    let mut tally = ctx.tally();
    summary.bytes_transferred = tally.bytes_transferred;
    summary.from_cache = tally.from_cache;
    summary.failures = std::mem::take(&mut tally.failures);
    summary.skips = std::mem::take(&mut tally.skips);
    summary
}
