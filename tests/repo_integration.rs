//! Integration tests for repository listing against a mock tree API.

use hf_dl::{ListError, RepoLister, RepositoryReference, Settings};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn lister_for(server: &MockServer) -> RepoLister {
    let settings = Settings::default().with_endpoint(server.uri());
    RepoLister::new(&settings).expect("client should build")
}

#[tokio::test]
async fn test_listing_keeps_files_and_builds_resolve_urls() {
    let server = MockServer::start().await;
    let body = serde_json::json!([
        {"type": "file", "path": "config.json", "size": 512, "oid": "a1"},
        {"type": "directory", "path": "onnx", "size": 0, "oid": "b2"},
        {"type": "file", "path": "README.md", "oid": "c3"},
        {"type": "file", "path": "model.safetensors", "size": 1_073_741_824u64, "oid": "d4"}
    ]);
    Mock::given(method("GET"))
        .and(path("/api/models/org/model/tree/main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&server)
        .await;

    let reference = RepositoryReference::new("org", "model", "main", "");
    let entries = lister_for(&server)
        .list_files(&reference)
        .await
        .expect("listing should succeed");

    let paths: Vec<_> = entries.iter().map(|e| e.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["config.json", "README.md", "model.safetensors"]);
    assert_eq!(
        entries[0].download_url,
        format!("{}/org/model/resolve/main/config.json", server.uri())
    );
    assert_eq!(entries[0].size_bytes, 512);
    assert_eq!(entries[1].size_bytes, 0, "missing size counts as zero");
    assert_eq!(entries[2].size_bytes, 1_073_741_824);
}

#[tokio::test]
async fn test_listing_a_subdirectory() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/models/org/model/tree/v2/onnx/fp16"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"type": "file", "path": "onnx/fp16/model.onnx", "size": 42}
        ])))
        .mount(&server)
        .await;

    let reference = RepositoryReference::new("org", "model", "v2", "onnx/fp16");
    let entries = lister_for(&server)
        .list_files(&reference)
        .await
        .expect("listing should succeed");

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].relative_path, "onnx/fp16/model.onnx");
    assert_eq!(
        entries[0].download_url,
        format!("{}/org/model/resolve/v2/onnx/fp16/model.onnx", server.uri())
    );
}

#[tokio::test]
async fn test_empty_directory_lists_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/models/org/model/tree/main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let entries = lister_for(&server)
        .list_files(&RepositoryReference::new("org", "model", "main", ""))
        .await
        .expect("listing should succeed");
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_missing_repository_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = lister_for(&server)
        .list_files(&RepositoryReference::new("org", "nope", "main", ""))
        .await;

    match result {
        Err(ListError::NotFound { status, url }) => {
            assert_eq!(status, 404);
            assert!(url.ends_with("/api/models/org/nope/tree/main"));
        }
        other => panic!("Expected NotFound, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_non_json_listing_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>rate limited</html>"))
        .mount(&server)
        .await;

    let result = lister_for(&server)
        .list_files(&RepositoryReference::new("org", "model", "main", ""))
        .await;

    assert!(matches!(result, Err(ListError::Malformed { .. })), "got {result:?}");
}

#[tokio::test]
async fn test_unreachable_endpoint_is_a_network_error() {
    let settings = Settings::default().with_endpoint("http://127.0.0.1:1");
    let lister = RepoLister::new(&settings).expect("client should build");

    let result = lister
        .list_files(&RepositoryReference::new("org", "model", "main", ""))
        .await;

    assert!(matches!(result, Err(ListError::Network { .. })), "got {result:?}");
}
