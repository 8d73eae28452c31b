//! Error types for each stage of a download.
//!
//! Variants carry the URL or path they concern. Helper constructors are used
//! instead of `From` impls since the source errors lack that context.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Not a hub address and not an absolute http(s) URL.
    #[error("unrecognized address: {address:?}")]
    Unrecognized { address: String },
}

/// Failures of a repository listing request. None of these are retried.
#[derive(Debug, Error)]
pub enum ListError {
    #[error("listing {url} returned HTTP {status}")]
    NotFound { url: String, status: u16 },

    #[error("listing {url} is not a valid file tree: {source}")]
    Malformed {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("network error listing {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ListError {
    pub fn not_found(url: impl Into<String>, status: u16) -> Self {
        Self::NotFound {
            url: url.into(),
            status,
        }
    }

    pub fn malformed(url: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Malformed {
            url: url.into(),
            source,
        }
    }

    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }
}

/// Failures of one transfer attempt. The partial file is always left in place.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("HTTP {status} downloading {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("network error downloading {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("IO error on {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.into(),
            source,
        }
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Only transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("invalid index list {spec:?}: {reason}")]
    InvalidSpec { spec: String, reason: String },

    #[error("index {index} is out of range for {len} files")]
    OutOfRange { index: usize, len: usize },
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("no files selected")]
    EmptySelection,

    #[error("selected index {index} is out of range for {len} files")]
    InvalidSelection { index: usize, len: usize },

    #[error("file {position} ({path}) failed: {source}")]
    Transfer {
        /// 1-based queue position of the failed file.
        position: usize,
        path: String,
        #[source]
        source: TransferError,
    },

    #[error("file {position} ({path}) was cancelled while the batch was still running")]
    Interrupted { position: usize, path: String },
}
