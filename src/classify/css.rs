//! Stylesheet reference scanning
//!
//! Stylesheets are never parsed into a tree; `url(...)` and `@import "..."`
//! references are located with regular expressions, which keeps malformed
//! CSS harmless: whatever matches is used and the rest is left untouched.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use url::Url;

use super::{dedup_references, Reference, ResourceKind};
use crate::url::resolve_reference;

/// `url(...)` with double-quoted, single-quoted or bare content
#[allow(clippy::expect_used)]
static URL_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^)"'\s]+))\s*\)"#)
        .expect("url() regex is valid")
});

/// `@import "..."` without `url()`; the `url()` form is caught by [`URL_FUNCTION`]
#[allow(clippy::expect_used)]
static IMPORT_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)@import\s+(?:"([^"]*)"|'([^']*)')"#).expect("@import regex is valid")
});

/// Extracts every followable reference from a stylesheet
pub fn extract_css_links(css: &str, base: &Url) -> Vec<Reference> {
    let mut refs = Vec::new();

    for caps in IMPORT_STRING.captures_iter(css) {
        if let Some(raw) = first_group(&caps) {
            if let Some(url) = resolve_reference(base, raw.as_str()) {
                refs.push(Reference {
                    url,
                    hint: Some(ResourceKind::Css),
                });
            }
        }
    }

    for caps in URL_FUNCTION.captures_iter(css) {
        if let Some(raw) = first_group(&caps) {
            let is_import = css[..caps.get(0).map(|m| m.start()).unwrap_or(0)]
                .trim_end()
                .to_ascii_lowercase()
                .ends_with("@import");
            if let Some(url) = resolve_reference(base, raw.as_str()) {
                refs.push(Reference {
                    url,
                    hint: is_import.then_some(ResourceKind::Css),
                });
            }
        }
    }

    dedup_references(refs)
}

/// Rewrites stylesheet references
///
/// `map` receives each raw reference and returns its replacement, or None
/// to leave it as written. Quoting and surrounding whitespace are kept.
pub fn rewrite_css<F>(css: &str, map: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let pass = URL_FUNCTION.replace_all(css, |caps: &Captures| splice(caps, &map));
    IMPORT_STRING
        .replace_all(&pass, |caps: &Captures| splice(caps, &map))
        .into_owned()
}

fn first_group<'t>(caps: &Captures<'t>) -> Option<regex::Match<'t>> {
    (1..caps.len()).find_map(|i| caps.get(i))
}

/// Replaces the matched inner group while keeping the rest of the match
fn splice<F>(caps: &Captures, map: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let whole = &caps[0];
    let Some(inner) = first_group(caps) else {
        return whole.to_string();
    };
    let Some(replacement) = map(inner.as_str()) else {
        return whole.to_string();
    };

    let offset = caps.get(0).map(|m| m.start()).unwrap_or(0);
    let start = inner.start() - offset;
    let end = inner.end() - offset;
    format!("{}{}{}", &whole[..start], replacement, &whole[end..])
}
