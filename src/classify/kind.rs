use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Closed set of resource kinds the mirror distinguishes
///
/// `Other` covers everything the classifier cannot place. It is never
/// whitelistable: candidates inferred as `Other` are rejected at admission,
/// seeds included, and fetched bodies classified as `Other` are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Html,
    Css,
    Js,
    Image,
    Font,
    Video,
    Svg,
    Document,
    Other,
}

impl ResourceKind {
    /// Kinds downloaded by default besides HTML
    pub fn downloadable() -> &'static [ResourceKind] {
        &[
            ResourceKind::Css,
            ResourceKind::Js,
            ResourceKind::Image,
            ResourceKind::Font,
            ResourceKind::Video,
            ResourceKind::Svg,
            ResourceKind::Document,
        ]
    }

    /// Returns the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Css => "css",
            Self::Js => "js",
            Self::Image => "image",
            Self::Font => "font",
            Self::Video => "video",
            Self::Svg => "svg",
            Self::Document => "document",
            Self::Other => "other",
        }
    }

    /// Parses the database representation; unknown strings are `Other`
    pub fn from_db_string(s: &str) -> Self {
        match s {
            "html" => Self::Html,
            "css" => Self::Css,
            "js" => Self::Js,
            "image" => Self::Image,
            "font" => Self::Font,
            "video" => Self::Video,
            "svg" => Self::Svg,
            "document" => Self::Document,
            _ => Self::Other,
        }
    }

    /// Returns true for kinds whose bodies carry references worth following
    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Html | Self::Css)
    }

    /// Maps a Content-Type header value to a kind
    ///
    /// Returns None for generic types (`application/octet-stream`,
    /// `text/plain`) so the caller can fall back to the URL extension.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = mime_essence(content_type);
        let kind = match essence.as_str() {
            "text/html" | "application/xhtml+xml" => Self::Html,
            "text/css" => Self::Css,
            "text/javascript"
            | "application/javascript"
            | "application/x-javascript"
            | "application/ecmascript"
            | "text/ecmascript" => Self::Js,
            "image/svg+xml" => Self::Svg,
            "application/pdf"
            | "application/msword"
            | "application/rtf"
            | "application/epub+zip"
            | "application/vnd.ms-excel"
            | "application/vnd.ms-powerpoint"
            | "text/csv" => Self::Document,
            "application/font-woff"
            | "application/font-woff2"
            | "application/x-font-ttf"
            | "application/x-font-otf"
            | "application/vnd.ms-fontobject" => Self::Font,
            e if e.starts_with("image/") => Self::Image,
            e if e.starts_with("font/") => Self::Font,
            e if e.starts_with("video/") => Self::Video,
            e if e.starts_with("application/vnd.openxmlformats-officedocument.")
                || e.starts_with("application/vnd.oasis.opendocument.") =>
            {
                Self::Document
            }
            _ => return None,
        };
        Some(kind)
    }

    /// Maps a file extension (without the dot, any case) to a kind
    pub fn from_extension(ext: &str) -> Option<Self> {
        let kind = match ext.to_ascii_lowercase().as_str() {
            "html" | "htm" | "xhtml" | "shtml" | "php" | "asp" | "aspx" | "jsp" => Self::Html,
            "css" => Self::Css,
            "js" | "mjs" => Self::Js,
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" | "ico" | "avif" | "tif" | "tiff" => {
                Self::Image
            }
            "svg" => Self::Svg,
            "woff" | "woff2" | "ttf" | "otf" | "eot" => Self::Font,
            "mp4" | "webm" | "ogv" | "mov" | "m4v" | "avi" | "mkv" => Self::Video,
            "pdf" | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "odt" | "ods" | "odp"
            | "rtf" | "epub" | "csv" | "txt" => Self::Document,
            _ => return None,
        };
        Some(kind)
    }

    /// Infers a kind from the last path segment of a URL
    pub fn from_url(url: &Url) -> Option<Self> {
        url_extension(url).and_then(|ext| Self::from_extension(&ext))
    }

    /// File extension used when a local name has none of its own
    pub fn default_extension(&self, content_type: Option<&str>) -> &'static str {
        let essence = content_type.map(mime_essence).unwrap_or_default();
        match self {
            Self::Html => "html",
            Self::Css => "css",
            Self::Js => "js",
            Self::Svg => "svg",
            Self::Image => match essence.as_str() {
                "image/jpeg" => "jpg",
                "image/gif" => "gif",
                "image/webp" => "webp",
                "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
                "image/avif" => "avif",
                "image/bmp" => "bmp",
                _ => "png",
            },
            Self::Font => match essence.as_str() {
                "font/woff" | "application/font-woff" => "woff",
                "font/ttf" | "application/x-font-ttf" => "ttf",
                "font/otf" | "application/x-font-otf" => "otf",
                "application/vnd.ms-fontobject" => "eot",
                _ => "woff2",
            },
            Self::Video => match essence.as_str() {
                "video/webm" => "webm",
                "video/ogg" => "ogv",
                "video/quicktime" => "mov",
                _ => "mp4",
            },
            Self::Document => match essence.as_str() {
                "text/csv" => "csv",
                "application/msword" => "doc",
                "application/rtf" => "rtf",
                "application/epub+zip" => "epub",
                _ => "pdf",
            },
            Self::Other => "bin",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Determines the kind of a fetched resource
///
/// Content-Type wins; generic or missing types fall back to the URL
/// extension, then to sniffing the body for markup. Anything left is `Other`.
pub fn classify(content_type: Option<&str>, url: &Url, body: &[u8]) -> ResourceKind {
    content_type
        .and_then(ResourceKind::from_content_type)
        .or_else(|| ResourceKind::from_url(url))
        .or_else(|| sniff(body))
        .unwrap_or(ResourceKind::Other)
}

/// Kind assumed for a candidate link before it is fetched
///
/// The URL extension is the strongest signal; the element the reference
/// came from is next. Without either, only an extensionless link (or one
/// ending in a version-like number such as `/v1.2`) is assumed to be a
/// page; an unrecognised extension such as `.zip` is `Other`.
pub fn infer_kind(url: &Url, hint: Option<ResourceKind>) -> ResourceKind {
    if let Some(kind) = ResourceKind::from_url(url).or(hint) {
        return kind;
    }
    match url_extension(url) {
        Some(ext) if !ext.bytes().all(|b| b.is_ascii_digit()) => ResourceKind::Other,
        _ => ResourceKind::Html,
    }
}

/// Recognizes markup that arrived without a usable Content-Type
pub fn sniff(body: &[u8]) -> Option<ResourceKind> {
    let head = &body[..body.len().min(512)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start().to_ascii_lowercase();

    if text.starts_with("<!doctype html") || text.starts_with("<html") {
        Some(ResourceKind::Html)
    } else if text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg")) {
        Some(ResourceKind::Svg)
    } else if text.starts_with("%pdf-") {
        Some(ResourceKind::Document)
    } else {
        None
    }
}

/// Lowercased `type/subtype` of a Content-Type value, parameters dropped
pub fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Matches a Content-Type against a configured `type/subtype` or `type/*` pattern
pub fn mime_matches(pattern: &str, content_type: &str) -> bool {
    let essence = mime_essence(content_type);
    let pattern = pattern.trim().to_ascii_lowercase();
    match pattern.strip_suffix("/*") {
        Some(major) => essence
            .split_once('/')
            .map(|(t, _)| t == major)
            .unwrap_or(false),
        None => essence == pattern,
    }
}

/// Lowercased extension of the URL's last path segment
pub(crate) fn url_extension(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.last()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 5 {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
