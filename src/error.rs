//! Error types shared across the acquisition pipeline.
//!
//! Item-level [`ParseError`]s are absorbed by the parser layer, page-level
//! [`FetchError`]s become a per-site status, and only [`PipelineError`]
//! ever reaches the caller of a run.

use thiserror::Error;

use crate::crawl::SiteStatus;

/// Outbound request failure.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network/connection level failure (DNS, TLS, timeout, reset).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response.
    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    /// Retry budget spent; carries the last failure.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<FetchError>,
    },

    /// The run was cancelled before the request was issued.
    #[error("request cancelled")]
    Cancelled,

    /// The request could not be built (bad URL, bad params).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    /// HTTP status carried by this error, looking through retry exhaustion.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::RetriesExhausted { last, .. } => last.status(),
            FetchError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Malformed markup or a field that could not be interpreted.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("bad URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("malformed entry: {0}")]
    Malformed(String),

    #[error("unknown parser `{0}`")]
    UnknownParser(String),
}

/// Failure of a single site operation (page or detail fetch).
#[derive(Debug, Error)]
pub enum SiteError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Run-level failure. Partial site failure is not an error.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no enabled sites configured")]
    NoSitesEnabled,

    #[error("all {} enabled sites failed", .statuses.iter().filter(|s| s.is_failed()).count())]
    AllSitesFailed { statuses: Vec<SiteStatus> },
}
