//! Sequential download of a selected subset of a repository listing.
//!
//! Files are fetched strictly one after another. `current_index` only moves
//! forward, so after a failure everything before it has been attempted and
//! everything from it on is untouched.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use crate::downloader::Downloader;
use crate::error::BatchError;
use crate::models::{Progress, RemoteFileEntry, TransferOutcome};
use crate::state::TransferState;

/// 1-based position of a file within the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePosition {
    pub current: usize,
    pub total: usize,
}

/// Receives batch events. Called on the transfer task; keep it quick.
pub trait BatchObserver: Send + Sync {
    fn file_started(&self, _position: QueuePosition, _entry: &RemoteFileEntry) {}
    fn progress(&self, _position: QueuePosition, _progress: &Progress) {}
    fn status(&self, _message: &str) {}
    fn file_finished(
        &self,
        _position: QueuePosition,
        _entry: &RemoteFileEntry,
        _outcome: TransferOutcome,
    ) {
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub already_complete: usize,
    /// The queue was stopped by a global cancel.
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Transferred {
        position: QueuePosition,
        outcome: TransferOutcome,
    },
    /// Every queued file has been attempted.
    Exhausted,
    /// A global cancel is in effect; nothing was attempted.
    Stopped,
}

/// Flags shared between the orchestrator and its controllers.
#[derive(Debug, Default)]
struct BatchControl {
    cancel: AtomicBool,
    pause: AtomicBool,
    current: Mutex<Option<Arc<TransferState>>>,
}

impl BatchControl {
    fn with_current(&self, apply: impl FnOnce(&TransferState)) {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = current.as_deref() {
            apply(state);
        }
    }

    fn request_pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
        self.with_current(TransferState::request_pause);
    }

    fn request_resume(&self) {
        self.pause.store(false, Ordering::SeqCst);
        self.with_current(TransferState::request_resume);
    }

    fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.with_current(TransferState::request_cancel);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// New per-file state carrying over pending pause and cancel requests.
    fn begin_file(&self) -> Arc<TransferState> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let state = if self.pause.load(Ordering::SeqCst) {
            TransferState::paused()
        } else {
            TransferState::new()
        };
        if self.is_cancelled() {
            state.request_cancel();
        }
        let state = Arc::new(state);
        *current = Some(Arc::clone(&state));
        state
    }

    fn end_file(&self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn reset(&self) {
        self.cancel.store(false, Ordering::SeqCst);
        self.pause.store(false, Ordering::SeqCst);
    }
}

/// Cloneable remote control for a running batch.
#[derive(Debug, Clone)]
pub struct BatchHandle {
    control: Arc<BatchControl>,
}

impl BatchHandle {
    pub fn request_pause(&self) {
        self.control.request_pause();
    }

    pub fn request_resume(&self) {
        self.control.request_resume();
    }

    /// Stops the current file and the rest of the queue.
    pub fn request_cancel(&self) {
        self.control.request_cancel();
    }

    pub fn is_paused(&self) -> bool {
        self.control.pause.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }
}

pub struct BatchOrchestrator {
    downloader: Downloader,
    save_dir: PathBuf,
    queue: Vec<RemoteFileEntry>,
    current_index: usize,
    summary: BatchSummary,
    control: Arc<BatchControl>,
}

impl BatchOrchestrator {
    pub fn new(downloader: Downloader, save_dir: impl Into<PathBuf>) -> Self {
        Self {
            downloader,
            save_dir: save_dir.into(),
            queue: Vec::new(),
            current_index: 0,
            summary: BatchSummary::default(),
            control: Arc::new(BatchControl::default()),
        }
    }

    /// Queues `entries[i]` for every selected `i`, in listing order.
    pub fn select_and_queue(
        &mut self,
        entries: &[RemoteFileEntry],
        selected_indices: &[usize],
    ) -> Result<(), BatchError> {
        if selected_indices.is_empty() {
            return Err(BatchError::EmptySelection);
        }
        if let Some(&index) = selected_indices.iter().find(|&&i| i >= entries.len()) {
            return Err(BatchError::InvalidSelection {
                index,
                len: entries.len(),
            });
        }

        let mut indices = selected_indices.to_vec();
        indices.sort_unstable();
        indices.dedup();

        self.queue = indices.into_iter().map(|i| entries[i].clone()).collect();
        self.restart();
        info!(files = self.queue.len(), "queued files");
        Ok(())
    }

    /// Rewinds to the first queued file and clears any cancel.
    pub fn restart(&mut self) {
        self.current_index = 0;
        self.summary = BatchSummary {
            total: self.queue.len(),
            ..BatchSummary::default()
        };
        self.control.reset();
    }

    pub fn handle(&self) -> BatchHandle {
        BatchHandle {
            control: Arc::clone(&self.control),
        }
    }

    pub fn request_pause(&self) {
        self.control.request_pause();
    }

    pub fn request_resume(&self) {
        self.control.request_resume();
    }

    pub fn request_cancel(&self) {
        self.control.request_cancel();
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn queue(&self) -> &[RemoteFileEntry] {
        &self.queue
    }

    pub fn summary(&self) -> BatchSummary {
        self.summary
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    /// Where `entry` lands under the save directory.
    pub fn destination_for(&self, entry: &RemoteFileEntry) -> PathBuf {
        // Only plain components, so a listing can never escape save_dir.
        Path::new(&entry.relative_path)
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part),
                _ => None,
            })
            .fold(self.save_dir.clone(), |path, part| path.join(part))
    }

    /// Downloads the file at `current_index`.
    pub async fn advance(
        &mut self,
        observer: &dyn BatchObserver,
    ) -> Result<AdvanceOutcome, BatchError> {
        if self.current_index >= self.queue.len() {
            return Ok(AdvanceOutcome::Exhausted);
        }
        if self.control.is_cancelled() {
            return Ok(AdvanceOutcome::Stopped);
        }

        let entry = self.queue[self.current_index].clone();
        let position = QueuePosition {
            current: self.current_index + 1,
            total: self.queue.len(),
        };
        let destination = self.destination_for(&entry);

        info!(
            position = position.current,
            total = position.total,
            path = %entry.relative_path,
            "downloading file"
        );
        observer.file_started(position, &entry);

        let state = self.control.begin_file();
        let result = self
            .downloader
            .download_with_retry(
                &entry.download_url,
                &destination,
                &state,
                |progress| observer.progress(position, progress),
                |message| observer.status(message),
            )
            .await;
        self.control.end_file();

        match result {
            Ok(outcome @ (TransferOutcome::Completed | TransferOutcome::AlreadyComplete)) => {
                if outcome == TransferOutcome::Completed {
                    self.summary.completed += 1;
                } else {
                    self.summary.already_complete += 1;
                }
                self.current_index += 1;
                observer.file_finished(position, &entry, outcome);
                Ok(AdvanceOutcome::Transferred { position, outcome })
            }
            Ok(TransferOutcome::Cancelled) if self.control.is_cancelled() => {
                self.current_index += 1;
                self.summary.cancelled = true;
                observer.file_finished(position, &entry, TransferOutcome::Cancelled);
                Ok(AdvanceOutcome::Transferred {
                    position,
                    outcome: TransferOutcome::Cancelled,
                })
            }
            Ok(TransferOutcome::Cancelled) => {
                warn!(path = %entry.relative_path, "file cancelled outside a batch cancel");
                Err(BatchError::Interrupted {
                    position: position.current,
                    path: entry.relative_path,
                })
            }
            Err(source) => Err(BatchError::Transfer {
                position: position.current,
                path: entry.relative_path,
                source,
            }),
        }
    }

    /// Runs the queue to the end, a global cancel, or the first failure.
    pub async fn run(&mut self, observer: &dyn BatchObserver) -> Result<BatchSummary, BatchError> {
        loop {
            match self.advance(observer).await? {
                AdvanceOutcome::Transferred { .. } => {}
                AdvanceOutcome::Exhausted => {
                    info!(
                        completed = self.summary.completed,
                        already_complete = self.summary.already_complete,
                        "all files downloaded"
                    );
                    return Ok(self.summary);
                }
                AdvanceOutcome::Stopped => {
                    info!(index = self.current_index, "batch cancelled");
                    self.summary.cancelled = true;
                    return Ok(self.summary);
                }
            }
        }
    }
}
