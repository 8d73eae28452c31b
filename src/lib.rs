//! Resumable downloads from Hugging Face style hubs.
//!
//! - [`classify`] turns a pasted address into a file target or a repository directory
//! - [`repo`] lists the files in a repository directory
//! - [`downloader`] transfers one file, resuming from a partial destination
//! - [`batch`] downloads a selected subset of a listing one file at a time
//! - [`selection`] holds the checked/filtered state of a listing
//! - [`format`] renders sizes and speeds for humans

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod batch;
pub mod classify;
pub mod config;
pub mod downloader;
pub mod error;
pub mod format;
pub mod models;
pub mod repo;
pub mod selection;
pub mod state;

pub use batch::{
    AdvanceOutcome, BatchHandle, BatchObserver, BatchOrchestrator, BatchSummary, NoopObserver,
    QueuePosition,
};
pub use classify::{ClassifiedTarget, Classifier, classify};
pub use config::Settings;
pub use downloader::Downloader;
pub use error::{BatchError, ClassifyError, ListError, SelectionError, TransferError};
pub use format::{format_size, format_speed};
pub use models::{DownloadTarget, Progress, RemoteFileEntry, RepositoryReference, TransferOutcome};
pub use repo::RepoLister;
pub use selection::Selection;
pub use state::TransferState;
