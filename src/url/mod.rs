//! URL handling module for Sumi-Mirror
//!
//! This module provides URL normalization, registrable-domain extraction,
//! scope checks and exclusion-pattern matching.

mod domain;
mod matcher;
mod normalize;

use ::url::Url;

// Re-export main functions
pub use domain::{extract_domain, registrable_domain, same_site};
pub use matcher::{is_excluded, matches_exclusion};
pub use normalize::{normalize_parsed, normalize_url, resolve_reference, NormalizeOptions};

/// The host boundary of a job
///
/// Built from the seed URLs: a candidate is in scope when its registrable
/// domain matches the registrable domain of any seed, or always when
/// external links are followed.
#[derive(Debug, Clone)]
pub struct Scope {
    domains: Vec<String>,
    follow_external: bool,
}

impl Scope {
    pub fn new(seeds: &[Url], follow_external: bool) -> Self {
        let mut domains: Vec<String> = seeds.iter().filter_map(registrable_domain).collect();
        domains.sort();
        domains.dedup();
        Self {
            domains,
            follow_external,
        }
    }

    pub fn contains(&self, url: &Url) -> bool {
        if self.follow_external {
            return true;
        }
        match registrable_domain(url) {
            Some(domain) => self.domains.iter().any(|d| *d == domain),
            None => false,
        }
    }
}
