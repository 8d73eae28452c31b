use serde::{Deserialize, Serialize};

/// A single file resolved from a user-supplied address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTarget {
    pub url: String,
    pub filename: String,
}

/// A directory-style location inside a hub repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryReference {
    pub owner: String,
    pub repo_name: String,
    pub branch: String,
    /// Path below the repository root; empty for the root itself.
    pub subpath: String,
}

impl RepositoryReference {
    pub fn new(
        owner: impl Into<String>,
        repo_name: impl Into<String>,
        branch: impl Into<String>,
        subpath: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo_name: repo_name.into(),
            branch: branch.into(),
            subpath: subpath.into(),
        }
    }

    /// `owner/repo` as shown to users.
    pub fn repo_id(&self) -> String {
        format!("{}/{}", self.owner, self.repo_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileEntry {
    pub relative_path: String,
    pub download_url: String,
    pub size_bytes: u64,
}

/// How an outer caller ended a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed,
    /// The destination already held the full remote content; nothing was fetched.
    AlreadyComplete,
    /// Stopped on request; the partial file is the resume point.
    Cancelled,
}

/// Snapshot passed to progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub downloaded_bytes: u64,
    /// Zero while the remote size is unknown.
    pub total_bytes: u64,
    /// Bytes per second over the last sampling window.
    pub speed: f64,
    /// `None` when the total is unknown.
    pub percentage: Option<f64>,
}

impl Progress {
    pub fn new(downloaded_bytes: u64, total_bytes: u64, speed: f64) -> Self {
        let percentage =
            (total_bytes > 0).then(|| downloaded_bytes as f64 / total_bytes as f64 * 100.0);
        Self {
            downloaded_bytes,
            total_bytes,
            speed,
            percentage,
        }
    }

    /// Final report emitted once a transfer is done.
    pub fn finished(downloaded_bytes: u64, total_bytes: u64) -> Self {
        Self {
            downloaded_bytes,
            total_bytes,
            speed: 0.0,
            percentage: Some(100.0),
        }
    }
}
