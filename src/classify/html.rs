//! HTML reference extraction
//!
//! This module handles parsing HTML content to extract every reference the
//! mirror may follow:
//! - Navigation links (`<a>`, `<area>`, frames)
//! - Stylesheets, icons and preloads from `<link>`
//! - Scripts, images, `srcset` candidates, media sources and posters
//! - Embedded objects
//! - `url()` and `@import` inside `<style>` blocks and `style` attributes
//!
//! The document's `<base href>` is honored when resolving relative links.

use scraper::{Html, Selector};
use url::Url;

use super::css::extract_css_links;
use super::{dedup_references, Reference, ResourceKind};
use crate::url::resolve_reference;

/// `<link rel>` values that name a relation rather than a resource to mirror
const SKIPPED_LINK_RELS: &[&str] = &[
    "canonical",
    "alternate",
    "preconnect",
    "dns-prefetch",
    "prefetch",
    "prerender",
    "next",
    "prev",
    "search",
    "pingback",
    "author",
    "license",
];

/// (selector, attribute, kind hint) for attributes holding a single reference
const SRC_ATTRIBUTES: &[(&str, &str, Option<ResourceKind>)] = &[
    ("a[href]", "href", None),
    ("area[href]", "href", None),
    ("script[src]", "src", Some(ResourceKind::Js)),
    ("img[src]", "src", Some(ResourceKind::Image)),
    ("input[type='image'][src]", "src", Some(ResourceKind::Image)),
    ("source[src]", "src", None),
    ("video[src]", "src", Some(ResourceKind::Video)),
    ("video[poster]", "poster", Some(ResourceKind::Image)),
    ("audio[src]", "src", None),
    ("track[src]", "src", None),
    ("iframe[src]", "src", Some(ResourceKind::Html)),
    ("frame[src]", "src", Some(ResourceKind::Html)),
    ("embed[src]", "src", None),
    ("object[data]", "data", None),
];

/// Parses an HTML document and returns its references in document order
///
/// Parsing never fails: html5ever recovers from malformed markup the way a
/// browser would, so a broken page still yields whatever links it has.
///
/// # Example
///
/// ```
/// use sumi_mirror::classify::extract_html_links;
/// use url::Url;
///
/// let html = r#"<html><head><link rel="stylesheet" href="/s.css"></head>
///     <body><a href="page.html">Link</a></body></html>"#;
/// let base = Url::parse("https://example.com/dir/").unwrap();
/// let refs = extract_html_links(html, &base);
/// assert_eq!(refs[0].url.as_str(), "https://example.com/s.css");
/// assert_eq!(refs[1].url.as_str(), "https://example.com/dir/page.html");
/// ```
pub fn extract_html_links(html: &str, page_url: &Url) -> Vec<Reference> {
    let document = Html::parse_document(html);
    let base = effective_base(&document, page_url);
    let mut refs = Vec::new();

    extract_link_elements(&document, &base, &mut refs);

    for (selector, attr, hint) in SRC_ATTRIBUTES {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        for element in document.select(&selector) {
            if let Some(value) = element.value().attr(attr) {
                push_resolved(&mut refs, &base, value, *hint);
            }
        }
    }

    if let Ok(selector) = Selector::parse("img[srcset], source[srcset]") {
        for element in document.select(&selector) {
            if let Some(srcset) = element.value().attr("srcset") {
                for candidate in srcset_urls(srcset) {
                    push_resolved(&mut refs, &base, candidate, Some(ResourceKind::Image));
                }
            }
        }
    }

    if let Ok(selector) = Selector::parse("style") {
        for element in document.select(&selector) {
            let css = element.text().collect::<String>();
            refs.extend(extract_css_links(&css, &base));
        }
    }

    if let Ok(selector) = Selector::parse("[style]") {
        for element in document.select(&selector) {
            if let Some(style) = element.value().attr("style") {
                refs.extend(extract_css_links(style, &base));
            }
        }
    }

    dedup_references(refs)
}

/// Returns the URL relative references in this document resolve against
pub fn document_base(html: &str, page_url: &Url) -> Url {
    effective_base(&Html::parse_document(html), page_url)
}

fn effective_base(document: &Html, page_url: &Url) -> Url {
    let Ok(selector) = Selector::parse("base[href]") else {
        return page_url.clone();
    };
    document
        .select(&selector)
        .next()
        .and_then(|base| base.value().attr("href"))
        .and_then(|href| resolve_reference(page_url, href))
        .unwrap_or_else(|| page_url.clone())
}

fn extract_link_elements(document: &Html, base: &Url, refs: &mut Vec<Reference>) {
    let Ok(selector) = Selector::parse("link[href]") else {
        return;
    };

    for element in document.select(&selector) {
        let rel = element
            .value()
            .attr("rel")
            .unwrap_or_default()
            .to_ascii_lowercase();
        let rels: Vec<&str> = rel.split_whitespace().collect();

        if rels.iter().any(|r| SKIPPED_LINK_RELS.contains(r)) {
            continue;
        }

        let hint = if rels.contains(&"stylesheet") {
            Some(ResourceKind::Css)
        } else if rels.iter().any(|r| *r == "icon" || r.starts_with("apple-touch-icon")) {
            Some(ResourceKind::Image)
        } else if rels.contains(&"preload") || rels.contains(&"modulepreload") {
            preload_hint(element.value().attr("as"))
        } else {
            None
        };

        if let Some(href) = element.value().attr("href") {
            push_resolved(refs, base, href, hint);
        }
    }
}

fn preload_hint(as_attr: Option<&str>) -> Option<ResourceKind> {
    match as_attr?.to_ascii_lowercase().as_str() {
        "style" => Some(ResourceKind::Css),
        "script" => Some(ResourceKind::Js),
        "image" => Some(ResourceKind::Image),
        "font" => Some(ResourceKind::Font),
        "video" => Some(ResourceKind::Video),
        "document" => Some(ResourceKind::Html),
        _ => None,
    }
}

fn push_resolved(refs: &mut Vec<Reference>, base: &Url, raw: &str, hint: Option<ResourceKind>) {
    if let Some(url) = resolve_reference(base, raw) {
        refs.push(Reference { url, hint });
    }
}

/// Splits a `srcset` value into its candidate URLs
pub(crate) fn srcset_urls(srcset: &str) -> impl Iterator<Item = &str> {
    srcset
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/blog/post.html").unwrap()
    }

    fn urls(refs: &[Reference]) -> Vec<String> {
        refs.iter().map(|r| r.url.to_string()).collect()
    }

    #[test]
    fn test_extract_resources() {
        let html = r#"
            <html><head>
                <link rel="stylesheet" href="/css/site.css">
                <link rel="icon" href="/favicon.ico">
                <script src="app.js"></script>
            </head><body>
                <img src="img/a.png" srcset="img/a-2x.png 2x, img/a-3x.png 3x">
                <video src="/v/clip.mp4" poster="/v/poster.jpg"></video>
                <a href="other.html">Other</a>
            </body></html>
        "#;
        let refs = extract_html_links(html, &base());
        let found = urls(&refs);

        assert!(found.contains(&"https://example.com/css/site.css".to_string()));
        assert!(found.contains(&"https://example.com/favicon.ico".to_string()));
        assert!(found.contains(&"https://example.com/blog/app.js".to_string()));
        assert!(found.contains(&"https://example.com/blog/img/a.png".to_string()));
        assert!(found.contains(&"https://example.com/blog/img/a-2x.png".to_string()));
        assert!(found.contains(&"https://example.com/blog/img/a-3x.png".to_string()));
        assert!(found.contains(&"https://example.com/v/clip.mp4".to_string()));
        assert!(found.contains(&"https://example.com/v/poster.jpg".to_string()));
        assert!(found.contains(&"https://example.com/blog/other.html".to_string()));

        let css = refs.iter().find(|r| r.url.path() == "/css/site.css").unwrap();
        assert_eq!(css.hint, Some(ResourceKind::Css));
    }

    #[test]
    fn test_skips_relation_links_and_special_schemes() {
        let html = r##"
            <link rel="canonical" href="https://example.com/canonical">
            <link rel="preconnect" href="https://fonts.example.com">
            <a href="mailto:me@example.com">Mail</a>
            <a href="javascript:void(0)">JS</a>
            <a href="#top">Top</a>
            <img src="data:image/gif;base64,R0lGOD">
        "##;
        assert!(extract_html_links(html, &base()).is_empty());
    }

    #[test]
    fn test_inline_styles() {
        let html = r#"
            <style>@import "print.css"; .h { background: url(/img/h.png) }</style>
            <div style="background-image: url('/img/d.png')"></div>
        "#;
        let found = urls(&extract_html_links(html, &base()));
        assert_eq!(
            found,
            vec![
                "https://example.com/blog/print.css",
                "https://example.com/img/h.png",
                "https://example.com/img/d.png",
            ]
        );
    }

    #[test]
    fn test_base_href_honored() {
        let html = r#"<head><base href="https://example.com/assets/"></head>
            <body><img src="x.png"></body>"#;
        let found = urls(&extract_html_links(html, &base()));
        assert_eq!(found, vec!["https://example.com/assets/x.png"]);
    }

    #[test]
    fn test_duplicates_collapsed() {
        let html = r#"<a href="/a">1</a><a href="/a">2</a><a href="https://example.com/a">3</a>"#;
        assert_eq!(extract_html_links(html, &base()).len(), 1);
    }

    #[test]
    fn test_malformed_markup() {
        let html = r#"<html><body><div><a href="/ok.html">ok<p><img src="/i.png"</body>"#;
        let found = urls(&extract_html_links(html, &base()));
        assert!(found.contains(&"https://example.com/ok.html".to_string()));
    }

    #[test]
    fn test_srcset_urls() {
        let found: Vec<&str> = srcset_urls("a.png 1x, b.png 2x,c.png").collect();
        assert_eq!(found, vec!["a.png", "b.png", "c.png"]);
    }
}
