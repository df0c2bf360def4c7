//! Machine-readable reasons attached to non-successful outcomes

use std::fmt;

/// Why a node was deliberately not stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// robots.txt disallows the path for our user agent
    RobotsDenied,
    /// Declared or measured size exceeds `max-file-size`
    TooLarge,
    /// The fetched resource turned out to be of a kind not whitelisted
    TypeNotWhitelisted,
    /// Content-Type matches an ignored MIME pattern
    IgnoredMimeType,
    /// The job was stopped before the node completed
    Cancelled,
}

impl SkipReason {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::RobotsDenied => "robots-denied",
            Self::TooLarge => "too-large",
            Self::TypeNotWhitelisted => "type-not-whitelisted",
            Self::IgnoredMimeType => "ignored-mime-type",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "robots-denied" => Some(Self::RobotsDenied),
            "too-large" => Some(Self::TooLarge),
            "type-not-whitelisted" => Some(Self::TypeNotWhitelisted),
            "ignored-mime-type" => Some(Self::IgnoredMimeType),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns true when a later job should settle the node the same way
    /// without asking the server again
    pub fn is_permanent(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_code())
    }
}

/// Why a node could not be retrieved
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FailReason {
    Timeout,
    /// Connection refused or reset
    Connection,
    /// Final HTTP status after any retries
    HttpStatus(u16),
    Tls,
    Dns,
    TooManyRedirects,
    /// Writing the resource to disk failed
    Io(String),
    /// A worker ended without settling the node
    Internal,
}

impl FailReason {
    /// Returns true for failures worth another attempt
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connection => true,
            Self::HttpStatus(status) => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    /// Returns true for failures a later job should not retry
    ///
    /// Local write errors and unsettled workers say nothing about the
    /// resource itself, so they are retried like transient failures.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient() && !matches!(self, Self::Io(_) | Self::Internal)
    }

    pub fn as_code(&self) -> String {
        match self {
            Self::Timeout => "timeout".to_string(),
            Self::Connection => "connection".to_string(),
            Self::HttpStatus(status) => format!("http-{}", status),
            Self::Tls => "tls".to_string(),
            Self::Dns => "dns".to_string(),
            Self::TooManyRedirects => "too-many-redirects".to_string(),
            Self::Io(_) => "io".to_string(),
            Self::Internal => "internal".to_string(),
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        if let Some(status) = code.strip_prefix("http-") {
            return status.parse().ok().map(Self::HttpStatus);
        }
        match code {
            "timeout" => Some(Self::Timeout),
            "connection" => Some(Self::Connection),
            "tls" => Some(Self::Tls),
            "dns" => Some(Self::Dns),
            "too-many-redirects" => Some(Self::TooManyRedirects),
            "io" => Some(Self::Io(String::new())),
            "internal" => Some(Self::Internal),
            _ => None,
        }
    }
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(detail) if !detail.is_empty() => write!(f, "io: {}", detail),
            other => write!(f, "{}", other.as_code()),
        }
    }
}

/// Why a candidate URL was not admitted to the frontier
///
/// Rejected candidates never become nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Already known in this job
    Duplicate,
    DepthExceeded,
    OutOfScope,
    TypeNotWhitelisted,
    /// Matched an exclusion pattern
    Excluded,
    /// Not an absolute HTTP(S) URL with a host
    Unsupported,
}

impl RejectReason {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::DepthExceeded => "depth-exceeded",
            Self::OutOfScope => "out-of-scope",
            Self::TypeNotWhitelisted => "type-not-whitelisted",
            Self::Excluded => "excluded",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_code())
    }
}
