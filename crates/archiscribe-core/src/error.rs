//! Common error type for remote document fetches

use std::io;
use std::time::Duration;

/// Error from fetching one remote document (metadata lookup or line download).
///
/// Cloneable so a single failure can be observed both on a progress channel
/// and by whoever awaits the fetch outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// HTTP error with optional status code
    Http {
        status: Option<u16>,
        message: String,
    },
    /// I/O error while streaming or writing
    Io { kind: io::ErrorKind, message: String },
    /// Payload could not be decoded (bad gzip, bad XML, bad JSON)
    Malformed(String),
    /// Document decoded fine but carried no usable lines
    NoLines,
    /// Fetch exceeded its deadline
    TimedOut(Duration),
    /// Producer went away without delivering a result or an error
    Aborted,
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Io { message, .. } => write!(f, "IO error: {message}"),
            Self::Malformed(msg) => write!(f, "malformed payload: {msg}"),
            Self::NoLines => write!(f, "document has no OCR lines"),
            Self::TimedOut(d) => write!(f, "timed out after {}s", d.as_secs()),
            Self::Aborted => write!(f, "fetch aborted before completion"),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// Create HTTP error from reqwest error
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }

    pub fn from_io(e: &io::Error) -> Self {
        Self::Io {
            kind: e.kind(),
            message: e.to_string(),
        }
    }

    /// Whether trying the same request again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => {
                // Missing, restricted or withdrawn items stay that way
                !matches!(status, Some(400 | 401 | 403 | 404 | 410))
            }
            Self::Io { kind, .. } => *kind != io::ErrorKind::StorageFull,
            Self::Malformed(_) | Self::NoLines => false,
            Self::TimedOut(_) | Self::Aborted => true,
        }
    }
}

impl From<io::Error> for FetchError {
    fn from(e: io::Error) -> Self {
        Self::from_io(&e)
    }
}
