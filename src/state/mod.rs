//! State module for tracking mirror progress
//!
//! # Components
//!
//! - `NodeState`: Lifecycle of a discovered URL (pending, in flight, done, skipped, failed)
//! - `SkipReason`, `FailReason`: Machine-readable reasons for non-successful outcomes
//! - `RejectReason`: Why a candidate URL never became a node

mod node_state;
mod outcome;

// Re-export main types
pub use node_state::NodeState;
pub use outcome::{FailReason, RejectReason, SkipReason};
