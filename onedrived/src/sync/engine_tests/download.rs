#[tokio::test]
async fn initial_enumeration_applies_two_pages_and_persists_cursor() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/root/view.changes"))
        .and(query_param_is_missing("token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(change_page(
            vec![remote_folder("id-a", "A", "root-id", "ea1")],
            "t1",
            true,
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/root/view.changes"))
        .and(query_param("token", "t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(change_page(
            vec![remote_file("id-b", "b.txt", "id-a", "eb1", "cb1", None)],
            "t2",
            false,
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/items/id-b/content"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut engine = make_engine(&server, dir.path()).await;
    let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&seen);
    engine.on_cursor(move |token| sink.lock().unwrap().push(token.to_string()));

    engine.apply_differences().await.unwrap();

    let folder = dir.path().join("A");
    let file = folder.join("b.txt");
    assert!(folder.is_dir());
    assert_eq!(std::fs::read(&file).unwrap(), b"hello");
    assert_eq!(local_mtime_of(&file), REMOTE_MTIME);

    assert_eq!(engine.index.list_all().await.unwrap().len(), 2);
    assert_eq!(engine.index.path_of("id-b").await.unwrap(), "/A/b.txt");
    assert_eq!(engine.cursor(), Some("t2"));
    assert_eq!(
        engine.index.get_sync_cursor().await.unwrap().cursor.as_deref(),
        Some("t2")
    );
    assert_eq!(*seen.lock().unwrap(), vec!["t1".to_string(), "t2".to_string()]);
}

#[tokio::test]
async fn resumes_feed_from_persisted_cursor() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/root/view.changes"))
        .and(query_param("token", "t2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(change_page(Vec::new(), "t3", false)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut engine = make_engine(&server, dir.path()).await;
    engine.set_cursor(Some("t2".to_string()));

    engine.apply_differences().await.unwrap();

    assert_eq!(engine.cursor(), Some("t3"));
}

#[tokio::test]
async fn reapplying_an_unchanged_delta_is_idempotent() {
    let server = MockServer::start().await;

    let item = remote_file("id-b", "b.txt", "root-id", "eb1", "cb1", None);
    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/root/view.changes"))
        .and(query_param_is_missing("token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(change_page(vec![item.clone()], "t1", false)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/root/view.changes"))
        .and(query_param("token", "t1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(change_page(vec![item], "t2", false)),
        )
        .mount(&server)
        .await;
    // The content must be fetched exactly once: the second arrival finds the
    // local copy already synced.
    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/items/id-b/content"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut engine = make_engine(&server, dir.path()).await;
    engine.apply_differences().await.unwrap();
    engine.apply_differences().await.unwrap();

    assert_eq!(std::fs::read(dir.path().join("b.txt")).unwrap(), b"hello");
    assert_eq!(engine.index.list_all().await.unwrap().len(), 1);
    assert_eq!(engine.cursor(), Some("t2"));
}

#[tokio::test]
async fn content_change_is_redownloaded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/root/view.changes"))
        .and(query_param_is_missing("token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(change_page(
            vec![remote_file("id-x", "x.txt", "root-id", "e1", "c1", None)],
            "t1",
            false,
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/root/view.changes"))
        .and(query_param("token", "t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(change_page(
            vec![remote_file("id-x", "x.txt", "root-id", "e2", "c2", None)],
            "t2",
            false,
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/items/id-x/content"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"v2"))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut engine = make_engine(&server, dir.path()).await;
    engine.apply_differences().await.unwrap();
    engine.apply_differences().await.unwrap();

    let row = engine.index.get_item("id-x").await.unwrap().unwrap();
    assert_eq!(row.etag, "e2");
    assert_eq!(row.ctag, "c2");
    assert_eq!(local_mtime_of(&dir.path().join("x.txt")), REMOTE_MTIME);
}

#[tokio::test]
async fn metadata_only_change_renames_without_download() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/root/view.changes"))
        .and(query_param_is_missing("token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(change_page(
            vec![remote_file("id-x", "x.txt", "root-id", "e1", "c1", None)],
            "t1",
            false,
        )))
        .mount(&server)
        .await;
    // Same ctag, new etag, new name: a pure rename.
    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/root/view.changes"))
        .and(query_param("token", "t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(change_page(
            vec![remote_file("id-x", "y.txt", "root-id", "e2", "c1", None)],
            "t2",
            false,
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/items/id-x/content"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"once"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut engine = make_engine(&server, dir.path()).await;
    engine.apply_differences().await.unwrap();
    engine.apply_differences().await.unwrap();

    assert!(!dir.path().join("x.txt").exists());
    assert_eq!(std::fs::read(dir.path().join("y.txt")).unwrap(), b"once");
    assert_eq!(engine.index.path_of("id-x").await.unwrap(), "/y.txt");
    let row = engine.index.get_item("id-x").await.unwrap().unwrap();
    assert_eq!(row.etag, "e2");
}

#[tokio::test]
async fn remote_deletion_removes_file_and_keeps_repopulated_dir() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/root/view.changes"))
        .and(query_param_is_missing("token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(change_page(
            vec![
                remote_folder("id-d", "d", "root-id", "ed1"),
                remote_file("id-f", "f.txt", "id-d", "ef1", "cf1", None),
            ],
            "t1",
            false,
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/items/id-f/content"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"f"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/root/view.changes"))
        .and(query_param("token", "t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(change_page(
            vec![
                json!({ "id": "id-d", "deleted": { "state": "deleted" } }),
                json!({ "id": "id-f", "deleted": { "state": "deleted" } }),
            ],
            "t2",
            false,
        )))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut engine = make_engine(&server, dir.path()).await;
    engine.apply_differences().await.unwrap();

    // The user drops a new file into the folder between passes.
    std::fs::write(dir.path().join("d/new.txt"), b"user data").unwrap();

    engine.apply_differences().await.unwrap();

    assert!(!dir.path().join("d/f.txt").exists());
    assert!(dir.path().join("d").is_dir());
    assert!(dir.path().join("d/new.txt").exists());
    assert!(engine.index.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn unsupported_items_and_their_descendants_are_skipped() {
    let server = MockServer::start().await;

    // No file, folder, or deleted facet: a remote-only artifact.
    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/root/view.changes"))
        .and(query_param_is_missing("token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(change_page(
            vec![
                json!({
                    "id": "id-nb",
                    "name": "Notebook",
                    "eTag": "en1",
                    "parentReference": { "id": "root-id" },
                    "fileSystemInfo": { "lastModifiedDateTime": "2024-01-01T00:00:00Z" }
                }),
                remote_file("id-child", "page.one", "id-nb", "ep1", "cp1", None),
                remote_file("id-grand", "sub.one", "id-child", "eg1", "cg1", None),
            ],
            "t1",
            false,
        )))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut engine = make_engine(&server, dir.path()).await;
    engine.apply_differences().await.unwrap();

    assert!(engine.index.list_all().await.unwrap().is_empty());
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    assert_eq!(engine.cursor(), Some("t1"));
}

#[tokio::test]
async fn failed_download_rolls_back_the_row_and_aborts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/root/view.changes"))
        .and(query_param_is_missing("token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(change_page(
            vec![remote_file("id-x", "x.txt", "root-id", "e1", "c1", None)],
            "t1",
            false,
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/items/id-x/content"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut engine = make_engine(&server, dir.path()).await;
    let err = engine
        .apply_differences()
        .await
        .expect_err("expected transport failure");

    assert!(matches!(err, EngineError::Api(_)));
    assert!(engine.index.get_item("id-x").await.unwrap().is_none());
    // The page never finished, so the cursor must not have moved.
    assert_eq!(engine.cursor(), None);
    assert_eq!(engine.index.get_sync_cursor().await.unwrap().cursor, None);
}

#[tokio::test]
async fn occupied_path_is_renamed_aside_never_overwritten() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/root/view.changes"))
        .and(query_param_is_missing("token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(change_page(
            vec![remote_file("id-x", "x.txt", "root-id", "e1", "c1", None)],
            "t1",
            false,
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/items/id-x/content"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"remote"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("x.txt"), b"precious local data").unwrap();

    let mut engine = make_engine(&server, dir.path()).await;
    engine.apply_differences().await.unwrap();

    assert_eq!(std::fs::read(dir.path().join("x.txt")).unwrap(), b"remote");
    let aside: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains("conflict copy"))
        .collect();
    assert_eq!(aside.len(), 1);
    assert_eq!(
        std::fs::read(dir.path().join(&aside[0])).unwrap(),
        b"precious local data"
    );
}

#[tokio::test]
async fn locally_modified_copy_is_moved_aside_before_redownload() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/root/view.changes"))
        .and(query_param_is_missing("token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(change_page(
            vec![remote_file("id-x", "x.txt", "root-id", "e1", "c1", None)],
            "t1",
            false,
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/root/view.changes"))
        .and(query_param("token", "t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(change_page(
            vec![remote_file("id-x", "x.txt", "root-id", "e2", "c2", None)],
            "t2",
            false,
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(url_path("/v1.0/drive/items/id-x/content"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"remote"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut engine = make_engine(&server, dir.path()).await;
    engine.apply_differences().await.unwrap();

    // Local edit the engine cannot attribute to the indexed version.
    std::fs::write(dir.path().join("x.txt"), b"local edit").unwrap();
    filetime::set_file_mtime(
        dir.path().join("x.txt"),
        filetime::FileTime::from_unix_time(1, 0),
    )
    .unwrap();

    engine.apply_differences().await.unwrap();

    assert_eq!(std::fs::read(dir.path().join("x.txt")).unwrap(), b"remote");
    let aside: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains("conflict copy"))
        .collect();
    assert_eq!(aside.len(), 1);
    assert_eq!(
        std::fs::read(dir.path().join(&aside[0])).unwrap(),
        b"local edit"
    );
}
