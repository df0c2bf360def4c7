//! Local file layout
//!
//! Local paths are relative to the job's output root and always use `/`
//! separators; they are joined onto the output root only when written.

use sha2::{Digest, Sha256};
use url::Url;

use super::kind::url_extension;
use super::ResourceKind;
use crate::config::StructureMode;

/// Characters that are not allowed in file names on common filesystems
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '\\', '|', '?', '*', '/'];

/// Extensions under which a browser renders a local file as a page
const PAGE_EXTENSIONS: &[&str] = &["html", "htm", "xhtml"];

/// Local path of a resource for the given structure mode
///
/// In flatten mode this is only the preferred name; the store may hand out a
/// disambiguated one instead (see [`disambiguate`]).
pub fn local_path(
    mode: StructureMode,
    url: &Url,
    kind: ResourceKind,
    content_type: Option<&str>,
) -> String {
    match mode {
        StructureMode::Preserve => preserve_path(url, kind, content_type),
        StructureMode::Flatten => flat_name(url, kind, content_type),
    }
}

/// Mirrors the URL path under `<host>[_<port>]/`
///
/// - `/` and `/dir/` become `index.html` inside the directory
/// - an extensionless page `/about` becomes `about/index.html`
/// - a query string adds a short hash suffix so `?page=2` gets its own file
pub fn preserve_path(url: &Url, kind: ResourceKind, content_type: Option<&str>) -> String {
    let host = url.host_str().unwrap_or("unknown-host").to_lowercase();
    let host_dir = match url.port() {
        Some(port) => format!("{}_{}", sanitize(&host), port),
        None => sanitize(&host),
    };

    let mut parts: Vec<String> = vec![host_dir];
    let segments: Vec<String> = url
        .path_segments()
        .map(|s| s.map(decode_segment).collect())
        .unwrap_or_default();

    let (dirs, last) = match segments.split_last() {
        Some((last, dirs)) => (dirs.to_vec(), last.clone()),
        None => (Vec::new(), String::new()),
    };
    parts.extend(dirs.into_iter().filter(|s| !s.is_empty()));

    let file = if last.is_empty() {
        format!("index.{}", kind.default_extension(content_type))
    } else if url_extension(url).is_none() && kind == ResourceKind::Html {
        parts.push(last);
        "index.html".to_string()
    } else {
        with_extension(&last, kind, content_type)
    };

    parts.push(with_query_suffix(&file, url.query()));
    parts.join("/")
}

/// Single-directory name: the last path segment, or `index.html`
pub fn flat_name(url: &Url, kind: ResourceKind, content_type: Option<&str>) -> String {
    let last = url
        .path_segments()
        .and_then(|mut s| s.next_back())
        .map(decode_segment)
        .unwrap_or_default();

    let file = if last.is_empty() {
        format!("index.{}", kind.default_extension(content_type))
    } else {
        with_extension(&last, kind, content_type)
    };

    with_query_suffix(&file, url.query())
}

/// Derives a distinct name from a taken one using the content hash
///
/// `logo.png` with hash `3fa4...` becomes `logo-3fa4c09e1b2d.png`.
pub fn disambiguate(name: &str, content_hash: &str) -> String {
    let short = &content_hash[..content_hash.len().min(12)];
    match split_extension(name) {
        (stem, Some(ext)) => format!("{}-{}.{}", stem, short, ext),
        (stem, None) => format!("{}-{}", stem, short),
    }
}

/// Relative link from the file at `from` to the file at `to`
///
/// Both paths are relative to the output root. Each component is
/// percent-encoded so the result is usable as an `href`.
pub fn relative_link(from: &str, to: &str) -> String {
    let from_dirs: Vec<&str> = {
        let mut parts: Vec<&str> = from.split('/').collect();
        parts.pop();
        parts
    };
    let to_parts: Vec<&str> = to.split('/').collect();

    let common = from_dirs
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count()
        .min(to_parts.len().saturating_sub(1));

    let mut link: Vec<String> = Vec::new();
    for _ in common..from_dirs.len() {
        link.push("..".to_string());
    }
    for part in &to_parts[common..] {
        link.push(urlencoding::encode(part).into_owned());
    }
    link.join("/")
}

fn decode_segment(segment: &str) -> String {
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    let clean = sanitize(&decoded);
    match clean.as_str() {
        "." | ".." => clean.replace('.', "_"),
        _ => clean,
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if ILLEGAL_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Makes sure pages end in an HTML extension and other kinds have one at all
fn with_extension(name: &str, kind: ResourceKind, content_type: Option<&str>) -> String {
    let usable = match split_extension(name).1 {
        Some(ext) if kind == ResourceKind::Html => {
            PAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        }
        Some(_) => true,
        None => false,
    };

    if usable {
        name.to_string()
    } else {
        format!("{}.{}", name, kind.default_extension(content_type))
    }
}

fn with_query_suffix(file: &str, query: Option<&str>) -> String {
    let Some(query) = query.filter(|q| !q.is_empty()) else {
        return file.to_string();
    };
    let digest = hex::encode(Sha256::digest(query.as_bytes()));
    let tag = format!("q{}", &digest[..8]);
    match split_extension(file) {
        (stem, Some(ext)) => format!("{}-{}.{}", stem, tag, ext),
        (stem, None) => format!("{}-{}", stem, tag),
    }
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}
