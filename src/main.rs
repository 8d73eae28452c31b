use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use hf_dl::repo::total_size;
use hf_dl::selection::parse_index_spec;
use hf_dl::{
    BatchHandle, BatchObserver, BatchOrchestrator, ClassifiedTarget, Classifier, ClassifyError,
    DownloadTarget, Downloader, Progress, QueuePosition, RemoteFileEntry, RepoLister,
    RepositoryReference, Selection, Settings, TransferOutcome, TransferState, format_size,
    format_speed,
};

mod cli;

use cli::{Args, DownloadMode};

/// How many selected files are echoed before a batch starts.
const PREVIEW_LIMIT: usize = 5;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let settings = args.settings();
    let classifier = Classifier::new(&settings.endpoint);

    match classifier.classify(&args.url) {
        ClassifiedTarget::SingleFile(target) => {
            if args.mode == DownloadMode::Batch {
                bail!("single file URL detected, use --mode single or --mode auto");
            }
            download_single(&args, &settings, target).await
        }
        ClassifiedTarget::Directory(reference) => {
            if args.mode == DownloadMode::Single {
                bail!("directory URL detected, use --mode batch or --mode auto");
            }
            download_batch(&args, &settings, reference).await
        }
        ClassifiedTarget::Unrecognized => Err(ClassifyError::Unrecognized {
            address: args.url.clone(),
        })
        .context("cannot download this address, check the URL format"),
    }
}

async fn download_single(args: &Args, settings: &Settings, target: DownloadTarget) -> Result<()> {
    let filename = args
        .filename
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(target.filename);
    let destination = PathBuf::from(&args.output).join(&filename);

    println!("Resolved URL: {}", target.url);
    println!("Saving to:    {}", destination.display());
    info!(url = %target.url, path = %destination.display(), "single file download");

    let downloader = Downloader::new(settings).context("Failed to build HTTP client")?;
    let state = Arc::new(TransferState::new());

    let pb = ProgressBar::new(0);
    pb.set_style(bar_style("{prefix:.bold} [{bar:40}] {msg}")?);
    pb.set_prefix(filename);

    let controls = spawn_controls(Arc::clone(&state), pb.clone());

    let worker: JoinHandle<Result<TransferOutcome, hf_dl::TransferError>> = {
        let state = Arc::clone(&state);
        let pb = pb.clone();
        let url = target.url.clone();
        tokio::spawn(async move {
            downloader
                .download_with_retry(
                    &url,
                    &destination,
                    &state,
                    |progress| render_progress(&pb, progress),
                    |message| pb.println(format!("  {message}")),
                )
                .await
        })
    };

    let result = worker.await.context("download task failed")?;
    controls.abort();

    match result {
        Ok(TransferOutcome::Completed) | Ok(TransferOutcome::AlreadyComplete) => {
            pb.finish();
            println!("Download finished.");
            Ok(())
        }
        Ok(TransferOutcome::Cancelled) => {
            pb.abandon();
            println!(
                "Cancelled at {}. Run the same command again to resume.",
                format_size(state.downloaded_bytes())
            );
            Ok(())
        }
        Err(e) => {
            pb.abandon();
            Err(anyhow!(e).context("download did not finish, the partial file was kept"))
        }
    }
}

async fn download_batch(
    args: &Args,
    settings: &Settings,
    reference: RepositoryReference,
) -> Result<()> {
    let lister = RepoLister::new(settings).context("Failed to build HTTP client")?;
    let entries = lister
        .list_files(&reference)
        .await
        .context("Failed to fetch the file list, check that the URL is correct")?;

    if entries.is_empty() {
        bail!("no files found under {}", lister.listing_url(&reference));
    }

    // stdout carries nothing but the JSON document in --json mode.
    if args.json {
        write_listing_summary(&mut io::stderr().lock(), &reference, &entries)?;
        write_json_listing(&mut io::stdout().lock(), &entries)?;
        return Ok(());
    }
    write_listing_summary(&mut io::stdout().lock(), &reference, &entries)?;

    let mut selection = Selection::new(&entries);
    if let Some(query) = &args.filter {
        selection.filter(query);
    }
    if let Some(spec) = &args.select {
        selection.select_only(&parse_index_spec(spec, entries.len())?)?;
    }

    if args.list {
        print_listing(&entries, &selection);
        return Ok(());
    }

    let selected = selection.selected_indices();
    let summary = selection.summary();
    println!(
        "Selected {} files ({})",
        summary.count,
        format_size(summary.bytes)
    );
    for &index in selected.iter().take(PREVIEW_LIMIT) {
        let entry = &entries[index];
        println!("  - {} ({})", entry.relative_path, format_size(entry.size_bytes));
    }
    if selected.len() > PREVIEW_LIMIT {
        println!("  ... and {} more", selected.len() - PREVIEW_LIMIT);
    }

    let downloader = Downloader::new(settings).context("Failed to build HTTP client")?;
    let mut orchestrator = BatchOrchestrator::new(downloader, &args.output);
    orchestrator.select_and_queue(&entries, &selected)?;
    let queued = orchestrator.queue().len();

    let mp = MultiProgress::new();
    let overall = mp.add(ProgressBar::new(queued as u64));
    overall.set_style(bar_style("{msg} {bar:40} {pos}/{len}")?);
    overall.set_message("Overall");
    let file_pb = mp.add(ProgressBar::new(0));
    file_pb.set_style(bar_style("{prefix:.bold} [{bar:40}] {msg}")?);

    let controls = spawn_controls(orchestrator.handle(), file_pb.clone());
    let observer = CliObserver {
        overall: overall.clone(),
        file: file_pb.clone(),
    };

    let worker = tokio::spawn(async move {
        let result = orchestrator.run(&observer).await;
        (orchestrator, result)
    });
    let (orchestrator, result) = worker.await.context("batch task failed")?;
    controls.abort();
    mp.clear().ok();

    match result {
        Ok(summary) if summary.cancelled => {
            println!(
                "Cancelled after {}/{} files. Run the same command again to resume.",
                orchestrator.current_index(),
                summary.total
            );
            Ok(())
        }
        Ok(summary) => {
            println!(
                "\nDone: {} downloaded, {} already complete",
                summary.completed, summary.already_complete
            );
            Ok(())
        }
        Err(e) => Err(anyhow!(e).context(format!(
            "batch stopped with {}/{} files finished",
            orchestrator.current_index(),
            queued
        ))),
    }
}

fn write_listing_summary<W: Write>(
    out: &mut W,
    reference: &RepositoryReference,
    entries: &[RemoteFileEntry],
) -> io::Result<()> {
    writeln!(out, "Repository: {}", reference.repo_id())?;
    writeln!(out, "Branch:     {}", reference.branch)?;
    if !reference.subpath.is_empty() {
        writeln!(out, "Directory:  {}", reference.subpath)?;
    }
    writeln!(
        out,
        "Found {} files, total size {}",
        entries.len(),
        format_size(total_size(entries))
    )
}

fn write_json_listing<W: Write>(out: &mut W, entries: &[RemoteFileEntry]) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, entries)?;
    writeln!(out)?;
    Ok(())
}

fn print_listing(entries: &[RemoteFileEntry], selection: &Selection<'_>) {
    for (index, entry) in entries.iter().enumerate() {
        let mark = if selection.is_selected(index) { "x" } else { " " };
        println!(
            "[{mark}] {index:>4}  {:>12}  {}",
            format_size(entry.size_bytes),
            entry.relative_path
        );
    }
}

fn bar_style(template: &str) -> Result<ProgressStyle> {
    Ok(ProgressStyle::default_bar()
        .template(template)
        .context("invalid progress template")?
        .progress_chars("=>-"))
}

fn render_progress(pb: &ProgressBar, progress: &Progress) {
    if progress.total_bytes > 0 {
        pb.set_length(progress.total_bytes);
    }
    pb.set_position(progress.downloaded_bytes);

    let mut message = format_size(progress.downloaded_bytes);
    if progress.total_bytes > 0 {
        message.push_str(&format!(" / {}", format_size(progress.total_bytes)));
    }
    if let Some(percentage) = progress.percentage {
        message.push_str(&format!(" ({percentage:.1}%)"));
    }
    message.push_str(&format!("  {}", format_speed(progress.speed)));
    pb.set_message(message);
}

struct CliObserver {
    overall: ProgressBar,
    file: ProgressBar,
}

impl BatchObserver for CliObserver {
    fn file_started(&self, position: QueuePosition, entry: &RemoteFileEntry) {
        self.overall.set_position((position.current - 1) as u64);
        self.overall
            .set_message(format!("Overall {}/{}", position.current, position.total));
        self.file.reset();
        self.file.set_length(entry.size_bytes);
        self.file.set_prefix(entry.relative_path.clone());
        self.file.set_message("");
        self.file.println(format!(
            "[{}/{}] {}",
            position.current, position.total, entry.relative_path
        ));
    }

    fn progress(&self, _position: QueuePosition, progress: &Progress) {
        render_progress(&self.file, progress);
    }

    fn status(&self, message: &str) {
        self.file.println(format!("  {message}"));
    }

    fn file_finished(
        &self,
        position: QueuePosition,
        _entry: &RemoteFileEntry,
        _outcome: TransferOutcome,
    ) {
        self.overall.set_position(position.current as u64);
    }
}

/// Pause and cancel requests coming from the terminal.
trait Control: Send + 'static {
    /// Flips pause; returns whether the transfer is now paused.
    fn toggle_pause(&self) -> bool;
    fn cancel(&self);
}

impl Control for Arc<TransferState> {
    fn toggle_pause(&self) -> bool {
        if self.is_paused() {
            self.request_resume();
            false
        } else {
            self.request_pause();
            true
        }
    }

    fn cancel(&self) {
        self.request_cancel();
    }
}

impl Control for BatchHandle {
    fn toggle_pause(&self) -> bool {
        if self.is_paused() {
            self.request_resume();
            false
        } else {
            self.request_pause();
            true
        }
    }

    fn cancel(&self) {
        self.request_cancel();
    }
}

/// Ctrl-C cancels; on a terminal `p` toggles pause and `c` cancels.
fn spawn_controls<C: Control>(control: C, pb: ProgressBar) -> JoinHandle<()> {
    let mut commands = stdin_commands();
    let mut stdin_open = io::stdin().is_terminal();
    if stdin_open {
        pb.println("Type p + Enter to pause/resume, c + Enter to cancel.");
    }

    tokio::spawn(async move {
        loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    if signal.is_ok() {
                        pb.println("Cancelling, the partial file is kept for resume...");
                        control.cancel();
                    }
                    break;
                }
                command = commands.recv(), if stdin_open => match command.as_deref().map(str::trim) {
                    Some("p") => {
                        if control.toggle_pause() {
                            pb.println("Paused.");
                        } else {
                            pb.println("Resuming...");
                        }
                    }
                    Some("c") => {
                        pb.println("Cancelling, the partial file is kept for resume...");
                        control.cancel();
                        break;
                    }
                    Some(_) => {}
                    None => stdin_open = false,
                },
            }
        }
    })
}

/// Lines typed on an interactive stdin, read on a plain thread so a pending
/// read never holds up runtime shutdown.
fn stdin_commands() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    if io::stdin().is_terminal() {
        std::thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    }
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<RemoteFileEntry> {
        vec![
            RemoteFileEntry {
                relative_path: "config.json".to_string(),
                download_url: "https://hf-mirror.com/org/model/resolve/main/config.json".to_string(),
                size_bytes: 512,
            },
            RemoteFileEntry {
                relative_path: "onnx/model.onnx".to_string(),
                download_url: "https://hf-mirror.com/org/model/resolve/main/onnx/model.onnx"
                    .to_string(),
                size_bytes: 1024,
            },
        ]
    }

    #[test]
    fn json_listing_output_is_a_single_document() {
        let entries = entries();
        let mut out = Vec::new();
        write_json_listing(&mut out, &entries).unwrap();

        let parsed: Vec<RemoteFileEntry> = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed, entries);
        assert!(!String::from_utf8(out).unwrap().contains("Found"));
    }

    #[test]
    fn listing_summary_names_the_repository_and_totals() {
        let reference = RepositoryReference::new("org", "model", "main", "onnx");
        let mut out = Vec::new();
        write_listing_summary(&mut out, &reference, &entries()).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Repository: org/model"));
        assert!(text.contains("Directory:  onnx"));
        assert!(text.ends_with("Found 2 files, total size 1.50 KB\n"));
    }
}
