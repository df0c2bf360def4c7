//! Configuration module for Sumi-Mirror
//!
//! This module handles loading, parsing, and validating TOML job configurations.
//!
//! # Example
//!
//! ```no_run
//! use sumi_mirror::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("mirror.toml")).unwrap();
//! println!("Mirroring with max depth: {}", config.job.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AuthConfig, Config, HeaderEntry, JobConfig, ProxyConfig, StructureMode, UserAgentConfig,
    UserAgentPreset,
};

// Re-export parser functions
pub use parser::{compute_config_hash, hash_config_content, load_config, load_config_with_hash};
pub use validation::validate;
