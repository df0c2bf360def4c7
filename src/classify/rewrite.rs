//! Reference rewriting for offline browsing
//!
//! Rewriting works on the raw text of a document rather than on a parsed
//! tree, so everything except the rewritten attribute values is emitted
//! byte for byte. References whose target was stored locally become
//! relative paths; every other reference is left as written.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use url::Url;

use super::css::rewrite_css as rewrite_css_text;
use super::html::{document_base, srcset_urls};
use super::layout::relative_link;
use super::ResourceKind;
use crate::url::{normalize_parsed, resolve_reference, NormalizeOptions};

#[allow(clippy::expect_used)]
static STYLE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)(<style\b[^>]*>)(.*?)(</style\s*>)").expect("style block regex is valid")
});

#[allow(clippy::expect_used)]
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(\s)(href|src|poster|data|srcset|style)(\s*=\s*)("[^"]*"|'[^']*'|[^\s>"']+)"#)
        .expect("attribute regex is valid")
});

/// Spans whose text is not markup: comments, and the bodies of script and
/// textarea elements. Opening tags are captured so their attributes are
/// still rewritten.
#[allow(clippy::expect_used)]
static OPAQUE_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<!--.*?(?:-->|\z)|(?P<script><script\b[^>]*>).*?(?:</script\s*>|\z)|(?P<textarea><textarea\b[^>]*>).*?(?:</textarea\s*>|\z)",
    )
    .expect("opaque span regex is valid")
});

#[allow(clippy::expect_used)]
static BASE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<base\b[^>]*>").expect("base tag regex is valid"));

/// Rewrites references to locally stored resources
pub struct LinkRewriter<'a> {
    /// Normalized URL -> local path relative to the output root
    targets: &'a HashMap<String, String>,
    options: NormalizeOptions,
}

impl<'a> LinkRewriter<'a> {
    pub fn new(targets: &'a HashMap<String, String>, options: NormalizeOptions) -> Self {
        Self { targets, options }
    }

    /// Produces the rewritten copy of a stored document
    ///
    /// `url` is the address the document was served from (after redirects)
    /// and `from` its local path. Returns None for kinds that carry no
    /// references.
    pub fn rewrite(&self, kind: ResourceKind, body: &[u8], url: &Url, from: &str) -> Option<Vec<u8>> {
        let text = decode_text(body);
        let rewritten = match kind {
            ResourceKind::Html => self.rewrite_html(&text, url, from),
            ResourceKind::Css => self.rewrite_css(&text, url, from),
            _ => return None,
        };
        Some(encode_text(rewritten, body))
    }

    pub fn rewrite_html(&self, html: &str, page_url: &Url, from: &str) -> String {
        let base = document_base(html, page_url);
        // Relative links must resolve against the local file, not the site
        let drop_base = base != *page_url;

        let mut out = String::with_capacity(html.len());
        let mut last = 0;
        for caps in OPAQUE_SPAN.captures_iter(html) {
            let Some(span) = caps.get(0) else { continue };
            out.push_str(&self.rewrite_markup(&html[last..span.start()], &base, from, drop_base));
            match caps.name("script").or_else(|| caps.name("textarea")) {
                Some(open) => {
                    out.push_str(&self.rewrite_markup(open.as_str(), &base, from, drop_base));
                    out.push_str(&html[open.end()..span.end()]);
                }
                None => out.push_str(span.as_str()),
            }
            last = span.end();
        }
        out.push_str(&self.rewrite_markup(&html[last..], &base, from, drop_base));
        out
    }

    /// Rewrites style blocks and reference attributes in a run of markup
    fn rewrite_markup(&self, markup: &str, base: &Url, from: &str, drop_base: bool) -> String {
        let styled = STYLE_BLOCK.replace_all(markup, |caps: &Captures| {
            format!(
                "{}{}{}",
                &caps[1],
                self.rewrite_css(&caps[2], base, from),
                &caps[3]
            )
        });

        let attributes = ATTRIBUTE.replace_all(&styled, |caps: &Captures| {
            let name = caps[2].to_ascii_lowercase();
            let (quote, value) = unquote(&caps[4]);
            let replaced = match name.as_str() {
                "srcset" => self.rewrite_srcset(value, base, from),
                "style" => Some(self.rewrite_css(value, base, from)),
                _ => self.map_reference(base, value, from),
            };
            match replaced {
                Some(new_value) => format!(
                    "{}{}{}{}{}{}",
                    &caps[1], &caps[2], &caps[3], quote, new_value, quote
                ),
                None => caps[0].to_string(),
            }
        });

        if drop_base {
            BASE_TAG.replace_all(&attributes, "").into_owned()
        } else {
            attributes.into_owned()
        }
    }

    pub fn rewrite_css(&self, css: &str, sheet_url: &Url, from: &str) -> String {
        rewrite_css_text(css, |raw| self.map_reference(sheet_url, raw, from))
    }

    fn rewrite_srcset(&self, srcset: &str, base: &Url, from: &str) -> Option<String> {
        let mut changed = false;
        let candidates: Vec<String> = srcset
            .split(',')
            .map(|candidate| {
                let trimmed = candidate.trim();
                let Some(raw) = srcset_urls(trimmed).next() else {
                    return trimmed.to_string();
                };
                match self.map_reference(base, raw, from) {
                    Some(local) => {
                        changed = true;
                        format!("{}{}", local, &trimmed[raw.len()..])
                    }
                    None => trimmed.to_string(),
                }
            })
            .collect();

        changed.then(|| candidates.join(", "))
    }

    /// Local relative link for a raw reference, if its target is stored
    fn map_reference(&self, base: &Url, raw: &str, from: &str) -> Option<String> {
        let decoded = decode_entities(raw);
        let resolved = resolve_reference(base, &decoded)?;
        let fragment = resolved.fragment().map(str::to_string);
        let normalized = normalize_parsed(resolved, self.options).ok()?;
        let target = self.targets.get(normalized.as_str())?;

        let mut link = relative_link(from, target);
        if let Some(fragment) = fragment {
            link.push('#');
            link.push_str(&fragment);
        }
        Some(link)
    }
}

fn unquote(value: &str) -> (&str, &str) {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 && (bytes[0] == b'"' || bytes[0] == b'\'') && bytes[bytes.len() - 1] == bytes[0] {
        (&value[..1], &value[1..value.len() - 1])
    } else {
        ("", value)
    }
}

fn decode_entities(raw: &str) -> String {
    raw.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
}

/// UTF-8 when valid; otherwise one char per byte so any ASCII-compatible
/// encoding survives a rewrite unchanged outside the replaced values
fn decode_text(body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(_) => body.iter().map(|&b| b as char).collect(),
    }
}

fn encode_text(text: String, original: &[u8]) -> Vec<u8> {
    if std::str::from_utf8(original).is_ok() {
        text.into_bytes()
    } else {
        // Inserted links are percent-encoded ASCII, so every char fits a byte
        text.chars().map(|c| c as u32 as u8).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(
            "https://example.com/".to_string(),
            "example.com/index.html".to_string(),
        );
        map.insert(
            "https://example.com/css/site.css".to_string(),
            "example.com/css/site.css".to_string(),
        );
        map.insert(
            "https://example.com/img/a.png".to_string(),
            "example.com/img/a.png".to_string(),
        );
        map.insert(
            "https://example.com/img/a-2x.png".to_string(),
            "example.com/img/a-2x.png".to_string(),
        );
        map.insert(
            "https://example.com/about".to_string(),
            "example.com/about/index.html".to_string(),
        );
        map
    }

    fn page() -> Url {
        Url::parse("https://example.com/").unwrap()
    }

    #[test]
    fn test_rewrites_stored_references() {
        let map = targets();
        let rewriter = LinkRewriter::new(&map, NormalizeOptions::default());
        let html = r#"<link rel="stylesheet" href="/css/site.css"><img src='img/a.png'><a href=about#team>About</a>"#;

        let out = rewriter.rewrite_html(html, &page(), "example.com/index.html");
        assert_eq!(
            out,
            r#"<link rel="stylesheet" href="css/site.css"><img src='img/a.png'><a href=about/index.html#team>About</a>"#
        );
    }

    #[test]
    fn test_unstored_references_stay_absolute() {
        let map = targets();
        let rewriter = LinkRewriter::new(&map, NormalizeOptions::default());
        let html = r#"<a href="https://other.org/x">x</a><a href="/missing.html">m</a>"#;

        let out = rewriter.rewrite_html(html, &page(), "example.com/index.html");
        assert_eq!(out, html);
    }

    #[test]
    fn test_rewrites_from_nested_page() {
        let map = targets();
        let rewriter = LinkRewriter::new(&map, NormalizeOptions::default());
        let about = Url::parse("https://example.com/about").unwrap();
        let html = r#"<a href="/">Home</a><div style="background:url('/img/a.png')"></div>"#;

        let out = rewriter.rewrite_html(html, &about, "example.com/about/index.html");
        assert_eq!(
            out,
            r#"<a href="../index.html">Home</a><div style="background:url('../img/a.png')"></div>"#
        );
    }

    #[test]
    fn test_rewrites_srcset_and_style_blocks() {
        let map = targets();
        let rewriter = LinkRewriter::new(&map, NormalizeOptions::default());
        let html = r#"<img srcset="/img/a.png 1x, /img/a-2x.png 2x, /img/a-3x.png 3x"><style>body{background:url(/img/a.png)}</style>"#;

        let out = rewriter.rewrite_html(html, &page(), "example.com/index.html");
        assert_eq!(
            out,
            r#"<img srcset="img/a.png 1x, img/a-2x.png 2x, /img/a-3x.png 3x"><style>body{background:url(img/a.png)}</style>"#
        );
    }

    #[test]
    fn test_script_comment_and_textarea_text_untouched() {
        let map = targets();
        let rewriter = LinkRewriter::new(&map, NormalizeOptions::default());
        let html = concat!(
            r#"<script src="/img/a.png">var tpl = '<img src="/img/a.png">';</script>"#,
            r#"<!-- <a href="/about">old nav</a> -->"#,
            r#"<textarea name="t"> <a href="/about">x</a></textarea>"#,
            r#"<a href="/about">About</a>"#,
        );

        let out = rewriter.rewrite_html(html, &page(), "example.com/index.html");
        assert_eq!(
            out,
            concat!(
                r#"<script src="img/a.png">var tpl = '<img src="/img/a.png">';</script>"#,
                r#"<!-- <a href="/about">old nav</a> -->"#,
                r#"<textarea name="t"> <a href="/about">x</a></textarea>"#,
                r#"<a href="about/index.html">About</a>"#,
            )
        );
    }

    #[test]
    fn test_unterminated_comment_left_alone() {
        let map = targets();
        let rewriter = LinkRewriter::new(&map, NormalizeOptions::default());
        let html = r#"<a href="/about">About</a><!-- <img src="/img/a.png">"#;

        let out = rewriter.rewrite_html(html, &page(), "example.com/index.html");
        assert_eq!(
            out,
            r#"<a href="about/index.html">About</a><!-- <img src="/img/a.png">"#
        );
    }

    #[test]
    fn test_base_tag_removed_when_used() {
        let map = targets();
        let rewriter = LinkRewriter::new(&map, NormalizeOptions::default());
        let html = r#"<head><base href="https://example.com/img/"></head><img src="a.png">"#;

        let out = rewriter.rewrite_html(html, &page(), "example.com/index.html");
        assert_eq!(out, r#"<head></head><img src="img/a.png">"#);
    }

    #[test]
    fn test_rewrite_css_relative_to_sheet() {
        let map = targets();
        let rewriter = LinkRewriter::new(&map, NormalizeOptions::default());
        let sheet = Url::parse("https://example.com/css/site.css").unwrap();

        let out = rewriter.rewrite_css("h1{background:url(../img/a.png)}", &sheet, "example.com/css/site.css");
        assert_eq!(out, "h1{background:url(../img/a.png)}");
    }

    #[test]
    fn test_non_parsed_kinds_not_rewritten() {
        let map = targets();
        let rewriter = LinkRewriter::new(&map, NormalizeOptions::default());
        assert!(rewriter
            .rewrite(ResourceKind::Image, b"\x89PNG", &page(), "example.com/a.png")
            .is_none());
    }

    #[test]
    fn test_non_utf8_bytes_preserved() {
        let map = targets();
        let rewriter = LinkRewriter::new(&map, NormalizeOptions::default());
        let body = b"<p>caf\xe9</p><a href=\"/about\">x</a>".to_vec();

        let out = rewriter
            .rewrite(ResourceKind::Html, &body, &page(), "example.com/index.html")
            .unwrap();
        assert_eq!(out, b"<p>caf\xe9</p><a href=\"about/index.html\">x</a>".to_vec());
    }

    #[test]
    fn test_entities_decoded_before_lookup() {
        let mut map = HashMap::new();
        map.insert(
            "https://example.com/list?a=1&b=2".to_string(),
            "example.com/list-q1234abcd.html".to_string(),
        );
        let rewriter = LinkRewriter::new(&map, NormalizeOptions::default());
        let out = rewriter.rewrite_html(
            r#"<a href="/list?a=1&amp;b=2">l</a>"#,
            &page(),
            "example.com/index.html",
        );
        assert_eq!(out, r#"<a href="list-q1234abcd.html">l</a>"#);
    }
}
