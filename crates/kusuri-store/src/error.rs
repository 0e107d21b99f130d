use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache directory unavailable: {path}: {source}")]
    Dir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cache read failed for {key}: {source}")]
    Read {
        key: String,
        source: std::io::Error,
    },

    #[error("cache write failed for {key}: {source}")]
    Write {
        key: String,
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}
