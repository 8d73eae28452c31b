//! Integration tests for queued repository downloads.

use std::sync::Mutex;

use hf_dl::{
    BatchError, BatchHandle, BatchObserver, BatchOrchestrator, Downloader, NoopObserver,
    QueuePosition, RemoteFileEntry, Settings, TransferError, TransferOutcome,
};
use tempfile::TempDir;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn downloader() -> Downloader {
    Downloader::new(&Settings::default()).expect("client should build")
}

/// Serves `content` for both the HEAD probe and the GET.
async fn serve(server: &MockServer, relative_path: &str, content: &[u8]) -> RemoteFileEntry {
    let url_path = format!("/org/model/resolve/main/{relative_path}");
    Mock::given(path(url_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(server)
        .await;
    RemoteFileEntry {
        relative_path: relative_path.to_string(),
        download_url: format!("{}{url_path}", server.uri()),
        size_bytes: content.len() as u64,
    }
}

#[derive(Default)]
struct RecordingObserver {
    started: Mutex<Vec<QueuePosition>>,
    finished: Mutex<Vec<(String, TransferOutcome)>>,
}

impl BatchObserver for RecordingObserver {
    fn file_started(&self, position: QueuePosition, _entry: &RemoteFileEntry) {
        self.started.lock().unwrap().push(position);
    }

    fn file_finished(
        &self,
        _position: QueuePosition,
        entry: &RemoteFileEntry,
        outcome: TransferOutcome,
    ) {
        self.finished
            .lock()
            .unwrap()
            .push((entry.relative_path.clone(), outcome));
    }
}

#[tokio::test]
async fn test_batch_downloads_selected_files_into_subdirectories() {
    let server = MockServer::start().await;
    let entries = vec![
        serve(&server, "config.json", b"{\"hidden_size\": 768}").await,
        serve(&server, "onnx/model.onnx", &vec![7u8; 40_000]).await,
        serve(&server, "tokenizer.json", b"{}").await,
    ];
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    let mut batch = BatchOrchestrator::new(downloader(), temp_dir.path());
    batch.select_and_queue(&entries, &[1, 0]).expect("valid selection");

    let observer = RecordingObserver::default();
    let summary = batch.run(&observer).await.expect("batch should succeed");

    assert_eq!(summary.total, 2);
    assert_eq!(summary.completed, 2);
    assert!(!summary.cancelled);
    assert_eq!(batch.current_index(), 2);

    let root = temp_dir.path();
    assert_eq!(
        std::fs::read(root.join("config.json")).unwrap(),
        b"{\"hidden_size\": 768}"
    );
    assert_eq!(std::fs::read(root.join("onnx/model.onnx")).unwrap().len(), 40_000);
    assert!(!root.join("tokenizer.json").exists(), "unselected file must not be fetched");

    let started = observer.started.lock().unwrap().clone();
    assert_eq!(
        started,
        vec![
            QueuePosition { current: 1, total: 2 },
            QueuePosition { current: 2, total: 2 },
        ]
    );
    let finished = observer.finished.lock().unwrap().clone();
    assert_eq!(finished[0], ("config.json".to_string(), TransferOutcome::Completed));
    assert_eq!(finished[1], ("onnx/model.onnx".to_string(), TransferOutcome::Completed));
}

#[tokio::test]
async fn test_rerun_skips_files_already_on_disk() {
    let server = MockServer::start().await;
    let entries = vec![
        serve(&server, "a.bin", &vec![1u8; 3_000]).await,
        serve(&server, "b.bin", &vec![2u8; 5_000]).await,
    ];
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    let mut batch = BatchOrchestrator::new(downloader(), temp_dir.path());
    batch.select_and_queue(&entries, &[0, 1]).expect("valid selection");
    batch.run(&NoopObserver).await.expect("first run should succeed");

    batch.restart();
    let summary = batch.run(&NoopObserver).await.expect("second run should succeed");
    assert_eq!(summary.completed, 0);
    assert_eq!(summary.already_complete, 2);
}

#[tokio::test]
async fn test_failure_stops_the_queue_at_the_failed_file() {
    let server = MockServer::start().await;
    let first = serve(&server, "first.bin", &vec![1u8; 2_000]).await;
    Mock::given(path("/org/model/resolve/main/second.bin"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let second = RemoteFileEntry {
        relative_path: "second.bin".to_string(),
        download_url: format!("{}/org/model/resolve/main/second.bin", server.uri()),
        size_bytes: 2_000,
    };
    let third = serve(&server, "third.bin", &vec![3u8; 2_000]).await;
    let entries = vec![first, second, third];

    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut batch = BatchOrchestrator::new(downloader(), temp_dir.path());
    batch.select_and_queue(&entries, &[0, 1, 2]).expect("valid selection");

    let result = batch.run(&NoopObserver).await;

    match result {
        Err(BatchError::Transfer {
            position,
            path,
            source: TransferError::HttpStatus { status, .. },
        }) => {
            assert_eq!(position, 2);
            assert_eq!(path, "second.bin");
            assert_eq!(status, 404);
        }
        other => panic!("Expected a transfer failure on file 2, got: {other:?}"),
    }
    assert_eq!(batch.current_index(), 1);
    assert!(temp_dir.path().join("first.bin").exists());
    assert!(!temp_dir.path().join("third.bin").exists());
}

/// Cancels the whole batch as soon as the first file starts.
struct CancelOnStart {
    handle: BatchHandle,
}

impl BatchObserver for CancelOnStart {
    fn file_started(&self, _position: QueuePosition, _entry: &RemoteFileEntry) {
        self.handle.request_cancel();
    }
}

#[tokio::test]
async fn test_global_cancel_stops_before_the_next_file() {
    let server = MockServer::start().await;
    let entries = vec![
        serve(&server, "a.bin", &vec![1u8; 50_000]).await,
        serve(&server, "b.bin", &vec![2u8; 50_000]).await,
    ];
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    let mut batch = BatchOrchestrator::new(downloader(), temp_dir.path());
    batch.select_and_queue(&entries, &[0, 1]).expect("valid selection");
    let observer = CancelOnStart {
        handle: batch.handle(),
    };

    let summary = batch.run(&observer).await.expect("cancel is not an error");

    assert!(summary.cancelled);
    assert_eq!(summary.completed, 0);
    assert_eq!(batch.current_index(), 1);
    assert!(!temp_dir.path().join("b.bin").exists());
    let partial = std::fs::metadata(temp_dir.path().join("a.bin"))
        .map(|m| m.len())
        .unwrap_or(0);
    assert!(partial < 50_000);
}
