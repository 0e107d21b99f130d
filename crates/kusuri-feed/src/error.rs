use std::sync::Arc;

use kusuri_core::ParseError;
use kusuri_store::StoreError;
use thiserror::Error;

/// Longest upstream body kept in a [`FetchError::Status`].
pub const BODY_SNIPPET_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl FetchError {
    /// Status error with the body cut to [`BODY_SNIPPET_CHARS`].
    pub fn status(status: u16, body: &str) -> Self {
        FetchError::Status {
            status,
            body: body.chars().take(BODY_SNIPPET_CHARS).collect(),
        }
    }
}

/// Failure of one load. Cheap to clone so every caller waiting on a shared
/// fetch receives the same error.
#[derive(Debug, Clone, Error)]
pub enum FeedError {
    #[error("failed to fetch feed: {0}")]
    Fetch(Arc<FetchError>),
    #[error("failed to parse feed: {0}")]
    Parse(#[from] ParseError),
    #[error("cache error: {0}")]
    Cache(Arc<StoreError>),
    #[error("unknown feed: {0}")]
    UnknownFeed(String),
    #[error("feed {0} has no URL configured")]
    NotConfigured(&'static str),
    #[error("fetch task ended unexpectedly: {0}")]
    Task(String),
}

impl From<FetchError> for FeedError {
    fn from(e: FetchError) -> Self {
        FeedError::Fetch(Arc::new(e))
    }
}

impl From<StoreError> for FeedError {
    fn from(e: StoreError) -> Self {
        FeedError::Cache(Arc::new(e))
    }
}
