//! Progress events
//!
//! Events go out over a bounded broadcast channel. The engine never waits for
//! a consumer: when a subscriber falls behind, its oldest unread events are
//! overwritten and the [`EventStream`] counts how many it lost.

use tokio::sync::broadcast;
use tracing::debug;

use crate::classify::ResourceKind;
use crate::output::JobSummary;
use crate::state::{FailReason, SkipReason};

/// Metadata of a stored resource, as reported to consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub local_path: String,
    pub kind: ResourceKind,
    pub content_type: Option<String>,
    pub byte_size: u64,
    pub content_hash: String,
    /// True when the resource was satisfied from a previous job
    pub from_cache: bool,
}

/// Discrete status events emitted during a job
#[derive(Debug, Clone)]
pub enum Event {
    JobStarted {
        job_id: i64,
        seeds: usize,
    },
    TaskStarted {
        url: String,
        depth: u32,
    },
    TaskSucceeded {
        url: String,
        resource: ResourceInfo,
    },
    TaskFailed {
        url: String,
        reason: FailReason,
        attempts: u32,
    },
    TaskSkipped {
        url: String,
        reason: SkipReason,
    },
    JobCompleted(JobSummary),
}

impl Event {
    /// Short machine-readable event name
    pub fn name(&self) -> &'static str {
        match self {
            Self::JobStarted { .. } => "job-started",
            Self::TaskStarted { .. } => "task-started",
            Self::TaskSucceeded { .. } => "task-succeeded",
            Self::TaskFailed { .. } => "task-failed",
            Self::TaskSkipped { .. } => "task-skipped",
            Self::JobCompleted(_) => "job-completed",
        }
    }

    /// URL the event is about, if it concerns a single node
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::TaskStarted { url, .. }
            | Self::TaskSucceeded { url, .. }
            | Self::TaskFailed { url, .. }
            | Self::TaskSkipped { url, .. } => Some(url),
            Self::JobStarted { .. } | Self::JobCompleted(_) => None,
        }
    }
}

/// Sending side, shared by every worker of a job
#[derive(Debug, Clone)]
pub struct EventReporter {
    tx: broadcast::Sender<Event>,
}

impl EventReporter {
    /// Creates a reporter whose subscribers buffer up to `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Emits an event without waiting; events with no subscriber are discarded
    pub fn emit(&self, event: Event) {
        if self.tx.send(event).is_err() {
            debug!("event emitted with no subscriber");
        }
    }

    /// Subscribes to events emitted from now on
    pub fn subscribe(&self) -> EventStream {
        EventStream {
            rx: self.tx.subscribe(),
            dropped: 0,
        }
    }
}

/// Receiving side of the event channel
#[derive(Debug)]
pub struct EventStream {
    rx: broadcast::Receiver<Event>,
    dropped: u64,
}

impl EventStream {
    /// Receives the next event in emission order
    ///
    /// Returns None once the job and all reporters are gone. Events lost to
    /// lag are skipped and added to [`EventStream::dropped`].
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.dropped += n;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next event if one is buffered
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    self.dropped += n;
                }
                Err(_) => return None,
            }
        }
    }

    /// Events overwritten before this stream read them
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
