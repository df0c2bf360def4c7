//! URL frontier and dispatch
//!
//! This module owns every node of a job:
//! - Admission of candidates against depth, scope, type and exclusion rules
//! - At most one node per normalized URL, also under concurrent enqueues
//! - FIFO dispatch to workers, which gives breadth-first traversal
//! - Completion detection once the queue is empty and nothing is in flight
//!
//! All state sits behind one lock; workers never touch it directly.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, warn};
use url::Url;

use crate::classify::{infer_kind, ResourceKind};
use crate::config::JobConfig;
use crate::crawler::{Controller, RunState};
use crate::state::{NodeState, RejectReason};
use crate::url::{is_excluded, normalize_parsed, NormalizeOptions, Scope};

/// A discovered URL tracked through its lifecycle
#[derive(Debug, Clone)]
pub struct UrlNode {
    /// Normalized URL that is fetched
    pub url: Url,
    /// Cache key, the serialized normalized URL
    pub key: String,
    pub parent: Option<Url>,
    pub depth: u32,
    pub discovered_at: DateTime<Utc>,
    pub state: NodeState,
    /// Kind suggested by the referencing element, if any
    pub hint: Option<ResourceKind>,
}

/// Result of offering a candidate to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted { depth: u32 },
    Rejected(RejectReason),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }
}

/// Rules a candidate must satisfy to become a node
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    pub max_depth: u32,
    pub scope: Scope,
    pub resource_types: Vec<ResourceKind>,
    pub exclusions: Vec<String>,
    pub normalize: NormalizeOptions,
}

impl AdmissionPolicy {
    /// Builds the policy of a job; scope is derived from the normalized seeds
    pub fn from_config(job: &JobConfig, seeds: &[Url]) -> Self {
        Self {
            max_depth: job.max_depth,
            scope: Scope::new(seeds, job.follow_external_links),
            resource_types: job.resource_types.clone(),
            exclusions: job.exclusions.clone(),
            normalize: NormalizeOptions {
                strip_query: job.remove_query_strings,
            },
        }
    }

    /// HTML is always traversed
    pub fn allows_kind(&self, kind: ResourceKind) -> bool {
        kind == ResourceKind::Html || self.resource_types.contains(&kind)
    }
}

/// Node counts per lifecycle state plus rejected candidates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrontierCounts {
    pub pending: u64,
    pub in_flight: u64,
    pub done: u64,
    pub skipped: u64,
    pub failed: u64,
    pub rejected: u64,
}

#[derive(Debug, Default)]
struct FrontierInner {
    nodes: HashMap<String, UrlNode>,
    queue: VecDeque<String>,
    in_flight: usize,
    rejected: HashMap<RejectReason, u64>,
}

impl FrontierInner {
    fn settle(&mut self, key: &str, state: NodeState) {
        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };
        if node.state == NodeState::InFlight && node.state.can_transition_to(state) {
            node.state = state;
            self.in_flight = self.in_flight.saturating_sub(1);
        } else {
            warn!(url = %key, from = %node.state, to = %state, "ignoring illegal node transition");
        }
    }
}

/// The frontier of one job
#[derive(Debug)]
pub struct Frontier {
    policy: AdmissionPolicy,
    inner: Mutex<FrontierInner>,
    changed: Notify,
}

impl Frontier {
    pub fn new(policy: AdmissionPolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(FrontierInner::default()),
            changed: Notify::new(),
        }
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    fn lock(&self) -> MutexGuard<'_, FrontierInner> {
        // A panicking holder leaves the maps consistent; keep going
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Offers a candidate URL
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute candidate URL, already resolved against its base
    /// * `parent_depth` - Depth of the referencing node, None for seeds
    /// * `parent_url` - URL of the referencing node
    /// * `hint` - Kind suggested by the referencing element
    pub fn enqueue(
        &self,
        url: &Url,
        parent_depth: Option<u32>,
        parent_url: Option<&Url>,
        hint: Option<ResourceKind>,
    ) -> Admission {
        let admission = self.admit(url, parent_depth, parent_url, hint);
        if let Admission::Rejected(reason) = admission {
            debug!(url = %url, reason = %reason, "candidate rejected");
            *self.lock().rejected.entry(reason).or_insert(0) += 1;
        }
        admission
    }

    fn admit(
        &self,
        url: &Url,
        parent_depth: Option<u32>,
        parent_url: Option<&Url>,
        hint: Option<ResourceKind>,
    ) -> Admission {
        let Ok(normalized) = normalize_parsed(url.clone(), self.policy.normalize) else {
            return Admission::Rejected(RejectReason::Unsupported);
        };

        let depth = parent_depth.map_or(0, |d| d.saturating_add(1));
        if depth > self.policy.max_depth {
            return Admission::Rejected(RejectReason::DepthExceeded);
        }
        if !self.policy.scope.contains(&normalized) {
            return Admission::Rejected(RejectReason::OutOfScope);
        }
        if is_excluded(&self.policy.exclusions, normalized.as_str()) {
            return Admission::Rejected(RejectReason::Excluded);
        }
        if !self.policy.allows_kind(infer_kind(&normalized, hint)) {
            return Admission::Rejected(RejectReason::TypeNotWhitelisted);
        }

        let key = normalized.to_string();
        {
            let mut inner = self.lock();
            if inner.nodes.contains_key(&key) {
                return Admission::Rejected(RejectReason::Duplicate);
            }
            inner.nodes.insert(
                key.clone(),
                UrlNode {
                    url: normalized,
                    key: key.clone(),
                    parent: parent_url.cloned(),
                    depth,
                    discovered_at: Utc::now(),
                    state: NodeState::Pending,
                    hint,
                },
            );
            inner.queue.push_back(key);
        }

        self.changed.notify_waiters();
        Admission::Admitted { depth }
    }

    /// Takes the next Pending node in discovery order
    ///
    /// Waits while the job is paused or the queue is empty but nodes are in
    /// flight, since those may still discover work.
    ///
    /// # Returns
    ///
    /// * `Some(Dispatch)` - A node now InFlight
    /// * `None` - The job is stopped, or every node is settled
    pub async fn next(self: &Arc<Self>, controller: &Controller) -> Option<Dispatch> {
        loop {
            if !controller.wait_until_running().await {
                return None;
            }

            let changed = self.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            {
                let mut inner = self.lock();
                match controller.state() {
                    RunState::Stopped => return None,
                    RunState::Paused => continue,
                    RunState::Running => {}
                }

                if let Some(key) = inner.queue.pop_front() {
                    let node = match inner.nodes.get_mut(&key) {
                        Some(node) => {
                            node.state = NodeState::InFlight;
                            node.clone()
                        }
                        None => continue,
                    };
                    inner.in_flight += 1;
                    return Some(Dispatch {
                        frontier: Arc::clone(self),
                        node,
                        settled: false,
                    });
                }

                if inner.in_flight == 0 {
                    drop(inner);
                    // Wake the other idle workers so they see the end too
                    self.changed.notify_waiters();
                    return None;
                }
            }

            tokio::select! {
                _ = &mut changed => {}
                _ = controller.stopped() => return None,
            }
        }
    }

    /// Removes every queued node after a stop and marks it Skipped
    pub fn drain_pending(&self) -> Vec<UrlNode> {
        let drained = {
            let mut inner = self.lock();
            let keys: Vec<String> = inner.queue.drain(..).collect();
            keys.iter()
                .filter_map(|key| {
                    let node = inner.nodes.get_mut(key)?;
                    node.state = NodeState::Skipped;
                    Some(node.clone())
                })
                .collect::<Vec<_>>()
        };
        self.changed.notify_waiters();
        drained
    }

    /// True when nothing is queued or in flight
    pub fn is_settled(&self) -> bool {
        let inner = self.lock();
        inner.queue.is_empty() && inner.in_flight == 0
    }

    pub fn counts(&self) -> FrontierCounts {
        let inner = self.lock();
        let mut counts = FrontierCounts {
            rejected: inner.rejected.values().sum(),
            ..FrontierCounts::default()
        };
        for node in inner.nodes.values() {
            match node.state {
                NodeState::Pending => counts.pending += 1,
                NodeState::InFlight => counts.in_flight += 1,
                NodeState::Done => counts.done += 1,
                NodeState::Skipped => counts.skipped += 1,
                NodeState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Rejections per reason
    pub fn rejections(&self) -> HashMap<RejectReason, u64> {
        self.lock().rejected.clone()
    }

    /// Snapshot of one node
    pub fn node(&self, key: &str) -> Option<UrlNode> {
        self.lock().nodes.get(key).cloned()
    }

    fn settle(&self, key: &str, state: NodeState) {
        self.lock().settle(key, state);
        self.changed.notify_waiters();
    }
}

/// A node handed to a worker
///
/// Must be completed with a terminal state. A dispatch dropped without
/// completion, e.g. when a worker task panics, settles the node as Failed so
/// the frontier can still finish.
#[derive(Debug)]
pub struct Dispatch {
    frontier: Arc<Frontier>,
    node: UrlNode,
    settled: bool,
}

impl Dispatch {
    pub fn node(&self) -> &UrlNode {
        &self.node
    }

    pub fn url(&self) -> &Url {
        &self.node.url
    }

    pub fn key(&self) -> &str {
        &self.node.key
    }

    pub fn depth(&self) -> u32 {
        self.node.depth
    }

    /// Settles the node in a terminal state
    pub fn complete(mut self, state: NodeState) {
        debug_assert!(state.is_terminal());
        self.frontier.settle(&self.node.key, state);
        self.settled = true;
    }
}

impl Drop for Dispatch {
    fn drop(&mut self) {
        if !self.settled {
            warn!(url = %self.node.key, "dispatch dropped before completion");
            self.frontier.settle(&self.node.key, NodeState::Failed);
        }
    }
}
