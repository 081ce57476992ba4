use onedrive_core::OneDriveClient;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn view_changes_requests_full_enumeration_without_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/drive/root:/Docs:/view.changes"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                {
                    "id": "id-a",
                    "name": "A.txt",
                    "eTag": "e1",
                    "cTag": "c1",
                    "parentReference": { "id": "root-id" },
                    "fileSystemInfo": { "lastModifiedDateTime": "2024-01-01T00:00:00Z" },
                    "file": { "hashes": { "crc32Hash": "DEADBEEF" } }
                }
            ],
            "@changes.token": "token-1",
            "@changes.hasMoreChanges": false
        })))
        .mount(&server)
        .await;

    let client = OneDriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    let page = client.view_changes("/Docs", None).await.unwrap();

    assert_eq!(page.value.len(), 1);
    assert_eq!(page.token, "token-1");
    assert!(!page.has_more);
    let item = &page.value[0];
    assert_eq!(item.id.as_deref(), Some("id-a"));
    assert!(item.file.is_some());
    assert!(item.folder.is_none());
}

#[tokio::test]
async fn view_changes_resumes_from_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/drive/root/view.changes"))
        .and(query_param("token", "cursor-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [],
            "@changes.token": "cursor-8",
            "@changes.hasMoreChanges": true
        })))
        .mount(&server)
        .await;

    let client = OneDriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    let page = client.view_changes("/", Some("cursor-7")).await.unwrap();

    assert!(page.value.is_empty());
    assert_eq!(page.token, "cursor-8");
    assert!(page.has_more);
}

#[tokio::test]
async fn download_by_id_writes_target_file() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/drive/items/id-a/content"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("nested/out.txt");
    let client = OneDriveClient::with_base_url(&server.uri(), "test-token").unwrap();

    client.download_by_id("id-a", &target).await.unwrap();

    assert_eq!(std::fs::read(&target).unwrap(), b"hello");
    assert!(!target.with_extension("txt.partial").exists());
}

#[tokio::test]
async fn download_by_id_surfaces_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/drive/items/id-a/content"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.txt");
    let client = OneDriveClient::with_base_url(&server.uri(), "test-token").unwrap();

    let err = client
        .download_by_id("id-a", &target)
        .await
        .expect_err("expected api failure");

    assert!(matches!(err, onedrive_core::OneDriveError::Api { .. }));
    assert!(!target.exists());
}

#[tokio::test]
async fn simple_upload_streams_body_and_precondition() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v1.0/drive/root:/Docs/A.txt:/content"))
        .and(header("if-match", "e1"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "id-a",
            "name": "A.txt",
            "eTag": "e2",
            "cTag": "c2",
            "parentReference": { "id": "docs-id" },
            "fileSystemInfo": { "lastModifiedDateTime": "2024-01-02T00:00:00Z" },
            "file": {}
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.txt");
    std::fs::write(&source, b"payload").unwrap();

    let client = OneDriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    let item = client
        .simple_upload(&source, "/Docs/A.txt", Some("e1"))
        .await
        .unwrap();

    assert_eq!(item.etag.as_deref(), Some("e2"));
}

#[tokio::test]
async fn update_by_id_patches_with_if_match() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/v1.0/drive/items/id-a"))
        .and(header("if-match", "e2"))
        .and(body_json(json!({
            "fileSystemInfo": { "lastModifiedDateTime": "2024-01-02T00:00:00Z" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "id-a",
            "name": "A.txt",
            "eTag": "e3",
            "cTag": "c2",
            "parentReference": { "id": "docs-id" },
            "fileSystemInfo": { "lastModifiedDateTime": "2024-01-02T00:00:00Z" },
            "file": {}
        })))
        .mount(&server)
        .await;

    let client = OneDriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    let item = client
        .update_by_id(
            "id-a",
            &json!({ "fileSystemInfo": { "lastModifiedDateTime": "2024-01-02T00:00:00Z" } }),
            "e2",
        )
        .await
        .unwrap();

    assert_eq!(item.etag.as_deref(), Some("e3"));
}

#[tokio::test]
async fn stale_precondition_is_an_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/v1.0/drive/items/id-a"))
        .and(header("if-match", "old-etag"))
        .respond_with(ResponseTemplate::new(412))
        .mount(&server)
        .await;

    let client = OneDriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    let err = client
        .delete_by_id("id-a", "old-etag")
        .await
        .expect_err("expected stale precondition");

    match err {
        onedrive_core::OneDriveError::Api { status, .. } => assert_eq!(status.as_u16(), 412),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn delete_by_id_accepts_no_content() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/v1.0/drive/items/id-a"))
        .and(header("if-match", "e1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = OneDriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    client.delete_by_id("id-a", "e1").await.unwrap();
}

#[tokio::test]
async fn create_folder_posts_folder_facet() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1.0/drive/root:/Docs:/children"))
        .and(body_json(json!({ "name": "New", "folder": {} })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "id-new",
            "name": "New",
            "eTag": "e1",
            "cTag": "c1",
            "parentReference": { "id": "docs-id" },
            "fileSystemInfo": { "lastModifiedDateTime": "2024-01-01T00:00:00Z" },
            "folder": {}
        })))
        .mount(&server)
        .await;

    let client = OneDriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    let item = client.create_folder("/Docs", "New").await.unwrap();

    assert_eq!(item.id.as_deref(), Some("id-new"));
    assert!(item.folder.is_some());
}

#[tokio::test]
async fn deleted_marker_round_trips_through_decoder() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/drive/root/view.changes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                { "id": "gone", "deleted": { "state": "deleted" } }
            ],
            "@changes.token": "t"
        })))
        .mount(&server)
        .await;

    let client = OneDriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    let page = client.view_changes("/", None).await.unwrap();

    assert!(page.value[0].deleted.is_some());
    assert!(page.value[0].name.is_none());
}
