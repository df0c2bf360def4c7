//! Resource classification and link rewriting
//!
//! This module decides what a fetched resource is, finds the references it
//! carries, chooses where it lives on disk, and produces the rewritten copy
//! used for offline browsing.

mod css;
mod html;
mod kind;
mod layout;
mod rewrite;

use std::collections::HashSet;

use url::Url;

pub use css::{extract_css_links, rewrite_css};
pub use html::{document_base, extract_html_links};
pub use kind::{classify, infer_kind, mime_essence, mime_matches, sniff, ResourceKind};
pub use layout::{disambiguate, flat_name, local_path, preserve_path, relative_link};
pub use rewrite::LinkRewriter;

/// A reference found in a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Absolute URL, not yet normalized
    pub url: Url,
    /// Kind suggested by the element or rule the reference came from
    pub hint: Option<ResourceKind>,
}

/// Extracts the references of a parsed kind; other kinds have none
pub fn extract_links(kind: ResourceKind, body: &[u8], url: &Url) -> Vec<Reference> {
    let text = String::from_utf8_lossy(body);
    match kind {
        ResourceKind::Html => extract_html_links(&text, url),
        ResourceKind::Css => extract_css_links(&text, url),
        _ => Vec::new(),
    }
}

/// Drops repeated URLs, keeping the first occurrence
fn dedup_references(refs: Vec<Reference>) -> Vec<Reference> {
    let mut seen = HashSet::new();
    refs.into_iter()
        .filter(|r| seen.insert(r.url.as_str().to_string()))
        .collect()
}
