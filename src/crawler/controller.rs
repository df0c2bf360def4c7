//! Pause/resume/stop control plane
//!
//! A [`Controller`] is a cheap, cloneable handle around a watch channel
//! holding the job's [`RunState`]. Every component that must observe the
//! state gets a clone; nothing reads it from global state.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

/// Run state shared by the frontier and every worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    Running,
    Paused,
    /// Terminal
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

/// Errors for illegal control transitions
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("job is stopped; create a new job to run again")]
    AlreadyStopped,
}

/// Handle used to pause, resume and stop a job
#[derive(Debug, Clone)]
pub struct Controller {
    tx: Arc<watch::Sender<RunState>>,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(RunState::Running);
        Self { tx: Arc::new(tx) }
    }

    /// Creates a controller that starts paused
    pub fn paused() -> Self {
        let (tx, _rx) = watch::channel(RunState::Paused);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> RunState {
        *self.tx.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == RunState::Stopped
    }

    /// Running -> Paused; pausing a paused job is a no-op
    ///
    /// In-flight fetches are not cancelled; only new dispatch and new
    /// rate-limiter acquisitions wait.
    pub fn pause(&self) -> Result<(), ControlError> {
        self.transition(RunState::Paused)
    }

    /// Paused -> Running; resuming a running job is a no-op
    pub fn resume(&self) -> Result<(), ControlError> {
        self.transition(RunState::Running)
    }

    /// Moves to the terminal Stopped state; idempotent
    pub fn stop(&self) {
        let changed = self.tx.send_if_modified(|state| {
            if *state == RunState::Stopped {
                false
            } else {
                *state = RunState::Stopped;
                true
            }
        });
        if changed {
            info!("stop requested");
        }
    }

    fn transition(&self, next: RunState) -> Result<(), ControlError> {
        let mut result = Ok(());
        let changed = self.tx.send_if_modified(|state| match *state {
            RunState::Stopped => {
                result = Err(ControlError::AlreadyStopped);
                false
            }
            current if current == next => false,
            _ => {
                *state = next;
                true
            }
        });
        if changed {
            info!(state = %next, "run state changed");
        }
        result
    }

    /// Waits while paused
    ///
    /// # Returns
    ///
    /// * `true` - The job is running
    /// * `false` - The job was stopped
    pub async fn wait_until_running(&self) -> bool {
        let mut rx = self.tx.subscribe();
        loop {
            match *rx.borrow_and_update() {
                RunState::Running => return true,
                RunState::Stopped => return false,
                RunState::Paused => {}
            }
            if rx.changed().await.is_err() {
                return false;
            }
        }
    }

    /// Resolves once the job is stopped
    ///
    /// Used as the cancelling branch of `tokio::select!` around every
    /// suspension point.
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|state| *state == RunState::Stopped).await;
    }
}
