use thiserror::Error;

/// Payload-level parse failure. Field-level anomalies never produce this.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("feed contained no data rows")]
    Empty,

    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("upstream service reported an error: {0}")]
    Upstream(String),
}

/// Why a single field fell back to its sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFallback {
    /// The cell was absent or blank.
    Missing,
    /// The cell had content that matched no accepted form.
    Unrecognized,
}
