//! Resumable single-file transfer.
//!
//! The destination file doubles as the checkpoint: its size on disk is the
//! offset a later attempt resumes from, so nothing here ever deletes it.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, RANGE};
use reqwest::{Client, Response, StatusCode};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::Settings;
use crate::error::TransferError;
use crate::format::format_size;
use crate::models::{Progress, TransferOutcome};
use crate::state::TransferState;

/// Write and pause/cancel granularity.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Progress callbacks fire at most this often while streaming.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Stages of a single transfer, recorded in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Idle,
    Requesting,
    Streaming,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    probe_timeout: Duration,
    max_attempts: u32,
}

impl Downloader {
    pub fn new(settings: &Settings) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(settings.build_client()?, settings))
    }

    pub fn with_client(client: Client, settings: &Settings) -> Self {
        Self {
            client,
            probe_timeout: settings.probe_timeout,
            max_attempts: settings.max_attempts.max(1),
        }
    }

    /// Downloads `url` into `destination`, resuming from whatever is already there.
    ///
    /// `on_progress` fires every [`SAMPLE_INTERVAL`] and once more at the end,
    /// each time after the file has been synced up to the reported count;
    /// `on_status` receives human-readable status lines, including the text of
    /// any error before it is returned.
    #[instrument(skip_all, fields(url = %url, path = %destination.display()))]
    pub async fn download<P, S>(
        &self,
        url: &str,
        destination: &Path,
        state: &TransferState,
        mut on_progress: P,
        mut on_status: S,
    ) -> Result<TransferOutcome, TransferError>
    where
        P: FnMut(&Progress),
        S: FnMut(&str),
    {
        debug!(phase = ?TransferPhase::Idle, "transfer starting");
        match self
            .transfer(url, destination, state, &mut on_progress, &mut on_status)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                warn!(phase = ?TransferPhase::Failed, %error, "transfer failed");
                on_status(&format!("download failed: {error}"));
                Err(error)
            }
        }
    }

    /// [`download`](Self::download), retrying transport failures with
    /// exponential backoff. Each retry resumes from the partial file.
    pub async fn download_with_retry<P, S>(
        &self,
        url: &str,
        destination: &Path,
        state: &TransferState,
        mut on_progress: P,
        mut on_status: S,
    ) -> Result<TransferOutcome, TransferError>
    where
        P: FnMut(&Progress),
        S: FnMut(&str),
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match self
                .download(url, destination, state, &mut on_progress, &mut on_status)
                .await
            {
                Err(error) if error.is_retryable() && attempt < self.max_attempts => {
                    let delay = backoff_delay(attempt);
                    warn!(attempt, max_attempts = self.max_attempts, ?delay, %error, "retrying");
                    on_status(&format!(
                        "retry {}/{}: waiting {}s",
                        attempt,
                        self.max_attempts - 1,
                        delay.as_secs()
                    ));

                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = state.cancelled() => {
                            on_status("cancelled");
                            return Ok(TransferOutcome::Cancelled);
                        }
                    }
                }
                result => return result,
            }
        }
    }

    async fn transfer<P, S>(
        &self,
        url: &str,
        destination: &Path,
        state: &TransferState,
        on_progress: &mut P,
        on_status: &mut S,
    ) -> Result<TransferOutcome, TransferError>
    where
        P: FnMut(&Progress),
        S: FnMut(&str),
    {
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| TransferError::filesystem(parent, e))?;
        }

        let mut downloaded = match fs::metadata(destination) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(TransferError::filesystem(destination, e)),
        };

        let mut total = self.probe_size(url).await;
        state.set_total(total);
        state.set_downloaded(downloaded);

        if total == 0 {
            on_status("remote size unknown, downloading without a total");
        }

        if downloaded > 0 && downloaded == total {
            info!(bytes = total, "destination already complete");
            on_status("file already complete, nothing to download");
            on_progress(&Progress::finished(total, total));
            return Ok(TransferOutcome::AlreadyComplete);
        }

        debug!(phase = ?TransferPhase::Requesting, offset = downloaded, total, "requesting body");
        let mut response = if downloaded > 0 {
            on_status(&format!("resuming from {}", format_size(downloaded)));
            let response = self.get(url, Some(downloaded)).await?;

            if response.status() == StatusCode::PARTIAL_CONTENT {
                response
            } else {
                // Whatever came back is not a continuation of our bytes.
                debug!(status = response.status().as_u16(), "range request not honored");
                on_status("server does not support resume, restarting from the beginning");
                drop(response);
                downloaded = 0;
                state.set_downloaded(0);
                self.get(url, None).await?
            }
        } else {
            self.get(url, None).await?
        };

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::http_status(url, status.as_u16()));
        }

        if total == 0 {
            total = total_from_headers(status, response.headers(), downloaded);
            state.set_total(total);
        }

        let mut file = open_destination(destination, downloaded > 0)?;
        let mut sampler = SpeedSampler::new(downloaded);

        debug!(phase = ?TransferPhase::Streaming, offset = downloaded, total, "streaming body");
        loop {
            let next = tokio::select! {
                biased;
                () = state.cancelled() => None,
                chunk = response.chunk() => Some(chunk),
            };

            let bytes = match next {
                None => {
                    return stop_cancelled(&file, destination, downloaded, total, on_progress, on_status);
                }
                Some(Ok(Some(bytes))) => bytes,
                Some(Ok(None)) => break,
                Some(Err(e)) => {
                    let _ = file.sync_data();
                    return Err(TransferError::transport(url, e));
                }
            };

            for chunk in bytes.chunks(CHUNK_SIZE) {
                if state.is_paused() && !state.is_cancelled() {
                    debug!(phase = ?TransferPhase::Paused, bytes = downloaded, "paused");
                    on_status("paused");
                    state.wait_while_paused().await;
                    if !state.is_cancelled() {
                        debug!(phase = ?TransferPhase::Streaming, "resumed");
                        on_status("resumed");
                        sampler.restart(downloaded);
                    }
                }

                if state.is_cancelled() {
                    return stop_cancelled(&file, destination, downloaded, total, on_progress, on_status);
                }

                file.write_all(chunk)
                    .map_err(|e| TransferError::filesystem(destination, e))?;
                downloaded += chunk.len() as u64;
                state.set_downloaded(downloaded);

                if let Some(speed) = sampler.sample(downloaded) {
                    // Reported counts are always durable.
                    file.sync_data()
                        .map_err(|e| TransferError::filesystem(destination, e))?;
                    on_progress(&Progress::new(downloaded, total, speed));
                }
            }
        }

        file.sync_all()
            .map_err(|e| TransferError::filesystem(destination, e))?;

        if total > 0 && downloaded != total {
            warn!(expected = total, actual = downloaded, "size differs from advertised total");
        }
        info!(phase = ?TransferPhase::Completed, bytes = downloaded, "download complete");
        on_progress(&Progress::finished(downloaded, total));
        on_status("download complete");

        Ok(TransferOutcome::Completed)
    }

    async fn get(&self, url: &str, offset: Option<u64>) -> Result<Response, TransferError> {
        let mut request = self.client.get(url);
        if let Some(offset) = offset {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }
        request
            .send()
            .await
            .map_err(|e| TransferError::transport(url, e))
    }

    /// Remote size from a HEAD request, 0 when it cannot be determined.
    async fn probe_size(&self, url: &str) -> u64 {
        match self.client.head(url).timeout(self.probe_timeout).send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                header_u64(response.headers(), CONTENT_LENGTH.as_str()).unwrap_or(0)
            }
            Ok(response) => {
                debug!(status = response.status().as_u16(), "size probe not answered with 200");
                0
            }
            Err(error) => {
                warn!(%error, "size probe failed");
                0
            }
        }
    }
}

fn stop_cancelled<P, S>(
    file: &File,
    destination: &Path,
    downloaded: u64,
    total: u64,
    on_progress: &mut P,
    on_status: &mut S,
) -> Result<TransferOutcome, TransferError>
where
    P: FnMut(&Progress),
    S: FnMut(&str),
{
    file.sync_data()
        .map_err(|e| TransferError::filesystem(destination, e))?;
    info!(phase = ?TransferPhase::Cancelled, bytes = downloaded, "transfer cancelled");
    on_progress(&Progress::new(downloaded, total, 0.0));
    on_status("cancelled");
    Ok(TransferOutcome::Cancelled)
}

fn open_destination(path: &Path, append: bool) -> Result<File, TransferError> {
    let mut options = fs::OpenOptions::new();
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    options
        .create(true)
        .open(path)
        .map_err(|e| TransferError::filesystem(path, e))
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Full size implied by a GET response when the HEAD probe came back empty.
fn total_from_headers(status: StatusCode, headers: &HeaderMap, offset: u64) -> u64 {
    if status == StatusCode::PARTIAL_CONTENT {
        // bytes <start>-<end>/<total>
        let from_range = headers
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit('/').next())
            .and_then(|v| v.trim().parse::<u64>().ok());
        if let Some(total) = from_range {
            return total;
        }
        return header_u64(headers, CONTENT_LENGTH.as_str())
            .map(|len| offset + len)
            .unwrap_or(0);
    }
    header_u64(headers, CONTENT_LENGTH.as_str()).unwrap_or(0)
}

fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(5);
    Duration::from_millis((1000u64 << exponent).min(30_000))
}

/// Speed over fixed wall-clock windows rather than per chunk.
struct SpeedSampler {
    last_at: Instant,
    last_bytes: u64,
}

impl SpeedSampler {
    fn new(bytes: u64) -> Self {
        Self {
            last_at: Instant::now(),
            last_bytes: bytes,
        }
    }

    fn restart(&mut self, bytes: u64) {
        *self = Self::new(bytes);
    }

    fn sample(&mut self, bytes: u64) -> Option<f64> {
        let elapsed = self.last_at.elapsed();
        if elapsed < SAMPLE_INTERVAL {
            return None;
        }
        let speed = bytes.saturating_sub(self.last_bytes) as f64 / elapsed.as_secs_f64();
        self.restart(bytes);
        Some(speed)
    }
}
