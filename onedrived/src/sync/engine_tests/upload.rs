// 2023-11-14T22:13:20Z, used as the deterministic local mtime below.
const LOCAL_MTIME: i64 = 1_700_000_000;
const LOCAL_MTIME_RFC3339: &str = "2023-11-14T22:13:20Z";

fn set_local_mtime(path: &Path, secs: i64) {
    filetime::set_file_mtime(path, filetime::FileTime::from_unix_time(secs, 0)).unwrap();
}

fn seeded_row(id: &str, name: &str, item_type: ItemType, parent_id: &str) -> ItemRecord {
    ItemRecord {
        id: id.into(),
        name: name.into(),
        item_type,
        etag: format!("etag-{id}"),
        ctag: format!("ctag-{id}"),
        mtime: LOCAL_MTIME,
        parent_id: parent_id.into(),
        crc32: None,
    }
}

fn mtime_patch() -> serde_json::Value {
    json!({ "fileSystemInfo": { "lastModifiedDateTime": LOCAL_MTIME_RFC3339 } })
}

#[tokio::test]
async fn new_local_file_is_uploaded_with_mtime_push() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(url_path("/v1.0/drive/root:/a.txt:/content"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "id-a",
            "name": "a.txt",
            "eTag": "e1",
            "cTag": "c1",
            "parentReference": { "id": "root-id" },
            "fileSystemInfo": { "lastModifiedDateTime": "2024-01-01T00:00:00Z" },
            "file": {}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(url_path("/v1.0/drive/items/id-a"))
        .and(header("if-match", "e1"))
        .and(body_json(mtime_patch()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "id-a",
            "name": "a.txt",
            "eTag": "e2",
            "cTag": "c1",
            "parentReference": { "id": "root-id" },
            "fileSystemInfo": { "lastModifiedDateTime": LOCAL_MTIME_RFC3339 },
            "file": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("a.txt");
    std::fs::write(&file, b"payload").unwrap();
    set_local_mtime(&file, LOCAL_MTIME);

    let mut engine = make_engine(&server, dir.path()).await;
    engine.upload_differences(None).await.unwrap();

    let row = engine.index.get_item("id-a").await.unwrap().unwrap();
    assert_eq!(row.etag, "e2");
    assert_eq!(row.mtime, LOCAL_MTIME);
    assert_eq!(engine.index.path_of("id-a").await.unwrap(), "/a.txt");
}

#[tokio::test]
async fn unchanged_file_is_left_alone() {
    let server = MockServer::start().await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("a.txt");
    std::fs::write(&file, b"payload").unwrap();
    set_local_mtime(&file, LOCAL_MTIME);

    let mut engine = make_engine(&server, dir.path()).await;
    engine
        .index
        .upsert_item(&seeded_row("id-a", "a.txt", ItemType::File, "root-id"))
        .await
        .unwrap();

    // No mocks mounted: any remote call would fail the pass.
    engine.upload_differences(None).await.unwrap();

    let row = engine.index.get_item("id-a").await.unwrap().unwrap();
    assert_eq!(row.etag, "etag-id-a");
}

#[tokio::test]
async fn modified_file_reuploads_with_precondition_chain() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(url_path("/v1.0/drive/root:/a.txt:/content"))
        .and(header("if-match", "etag-id-a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "id-a",
            "name": "a.txt",
            "eTag": "e2",
            "cTag": "c2",
            "parentReference": { "id": "root-id" },
            "fileSystemInfo": { "lastModifiedDateTime": "2024-01-01T00:00:00Z" },
            "file": {}
        })))
        .expect(1)
        .mount(&server)
        .await;
    // The mtime push is guarded by the fresh etag from the upload response.
    Mock::given(method("PATCH"))
        .and(url_path("/v1.0/drive/items/id-a"))
        .and(header("if-match", "e2"))
        .and(body_json(mtime_patch()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "id-a",
            "name": "a.txt",
            "eTag": "e3",
            "cTag": "c2",
            "parentReference": { "id": "root-id" },
            "fileSystemInfo": { "lastModifiedDateTime": LOCAL_MTIME_RFC3339 },
            "file": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("a.txt");
    std::fs::write(&file, b"new content").unwrap();
    set_local_mtime(&file, LOCAL_MTIME);

    let mut engine = make_engine(&server, dir.path()).await;
    let mut row = seeded_row("id-a", "a.txt", ItemType::File, "root-id");
    row.mtime = 100;
    row.crc32 = Some("0BADCAFE".into());
    engine.index.upsert_item(&row).await.unwrap();

    engine.upload_differences(None).await.unwrap();

    let row = engine.index.get_item("id-a").await.unwrap().unwrap();
    assert_eq!(row.etag, "e3");
    assert_eq!(row.mtime, LOCAL_MTIME);
}

#[tokio::test]
async fn touched_file_pushes_mtime_without_content_upload() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(url_path("/v1.0/drive/items/id-a"))
        .and(header("if-match", "etag-id-a"))
        .and(body_json(mtime_patch()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "id-a",
            "name": "a.txt",
            "eTag": "e2",
            "cTag": "ctag-id-a",
            "parentReference": { "id": "root-id" },
            "fileSystemInfo": { "lastModifiedDateTime": LOCAL_MTIME_RFC3339 },
            "file": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("a.txt");
    std::fs::write(&file, b"same content").unwrap();
    set_local_mtime(&file, LOCAL_MTIME);
    let crc = probe::crc32_of(&file).await.unwrap();

    let mut engine = make_engine(&server, dir.path()).await;
    let mut row = seeded_row("id-a", "a.txt", ItemType::File, "root-id");
    row.mtime = 100;
    row.crc32 = Some(crc);
    engine.index.upsert_item(&row).await.unwrap();

    engine.upload_differences(None).await.unwrap();

    let row = engine.index.get_item("id-a").await.unwrap().unwrap();
    assert_eq!(row.etag, "e2");
}

#[tokio::test]
async fn vanished_local_subtree_is_deleted_remotely() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(url_path("/v1.0/drive/items/id-f"))
        .and(header("if-match", "etag-id-f"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(url_path("/v1.0/drive/items/id-d"))
        .and(header("if-match", "etag-id-d"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut engine = make_engine(&server, dir.path()).await;
    engine
        .index
        .upsert_item(&seeded_row("id-d", "d", ItemType::Dir, "root-id"))
        .await
        .unwrap();
    engine
        .index
        .upsert_item(&seeded_row("id-f", "f.txt", ItemType::File, "id-d"))
        .await
        .unwrap();

    engine.upload_differences(None).await.unwrap();

    assert!(engine.index.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn file_row_turned_directory_is_recreated_as_folder() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(url_path("/v1.0/drive/items/id-a"))
        .and(header("if-match", "etag-id-a"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(url_path("/v1.0/drive/root/children"))
        .and(body_json(json!({ "name": "d", "folder": {} })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(remote_folder("id-d2", "d", "root-id", "ed2")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("d")).unwrap();

    let mut engine = make_engine(&server, dir.path()).await;
    engine
        .index
        .upsert_item(&seeded_row("id-a", "d", ItemType::File, "root-id"))
        .await
        .unwrap();

    engine.upload_differences(None).await.unwrap();

    assert!(engine.index.get_item("id-a").await.unwrap().is_none());
    let row = engine.index.get_item("id-d2").await.unwrap().unwrap();
    assert_eq!(row.item_type, ItemType::Dir);
    assert_eq!(engine.index.path_of("id-d2").await.unwrap(), "/d");
}

#[tokio::test]
async fn directory_row_turned_file_is_reuploaded() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(url_path("/v1.0/drive/items/id-d"))
        .and(header("if-match", "etag-id-d"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(url_path("/v1.0/drive/root:/x:/content"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "id-x2",
            "name": "x",
            "eTag": "ex1",
            "cTag": "cx1",
            "parentReference": { "id": "root-id" },
            "fileSystemInfo": { "lastModifiedDateTime": "2024-01-01T00:00:00Z" },
            "file": {}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(url_path("/v1.0/drive/items/id-x2"))
        .and(header("if-match", "ex1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "id-x2",
            "name": "x",
            "eTag": "ex2",
            "cTag": "cx1",
            "parentReference": { "id": "root-id" },
            "fileSystemInfo": { "lastModifiedDateTime": LOCAL_MTIME_RFC3339 },
            "file": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("x");
    std::fs::write(&file, b"now a file").unwrap();
    set_local_mtime(&file, LOCAL_MTIME);

    let mut engine = make_engine(&server, dir.path()).await;
    engine
        .index
        .upsert_item(&seeded_row("id-d", "x", ItemType::Dir, "root-id"))
        .await
        .unwrap();

    engine.upload_differences(None).await.unwrap();

    assert!(engine.index.get_item("id-d").await.unwrap().is_none());
    let row = engine.index.get_item("id-x2").await.unwrap().unwrap();
    assert_eq!(row.item_type, ItemType::File);
    assert_eq!(row.etag, "ex2");
}

#[tokio::test]
async fn subtree_pass_uploads_only_new_files_in_scope() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(url_path("/v1.0/drive/root:/Docs/new.txt:/content"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "id-new",
            "name": "new.txt",
            "eTag": "en1",
            "cTag": "cn1",
            "parentReference": { "id": "id-docs" },
            "fileSystemInfo": { "lastModifiedDateTime": "2024-01-01T00:00:00Z" },
            "file": {}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(url_path("/v1.0/drive/items/id-new"))
        .and(header("if-match", "en1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "id-new",
            "name": "new.txt",
            "eTag": "en2",
            "cTag": "cn1",
            "parentReference": { "id": "id-docs" },
            "fileSystemInfo": { "lastModifiedDateTime": LOCAL_MTIME_RFC3339 },
            "file": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("Docs");
    std::fs::create_dir(&docs).unwrap();
    let old = docs.join("old.txt");
    std::fs::write(&old, b"old").unwrap();
    set_local_mtime(&old, LOCAL_MTIME);
    let new = docs.join("new.txt");
    std::fs::write(&new, b"new").unwrap();
    set_local_mtime(&new, LOCAL_MTIME);

    let mut engine = make_engine(&server, dir.path()).await;
    engine
        .index
        .upsert_item(&seeded_row("id-docs", "Docs", ItemType::Dir, "root-id"))
        .await
        .unwrap();
    engine
        .index
        .upsert_item(&seeded_row("id-old", "old.txt", ItemType::File, "id-docs"))
        .await
        .unwrap();

    engine.upload_differences(Some(&docs)).await.unwrap();

    assert_eq!(
        engine.index.path_of("id-new").await.unwrap(),
        "/Docs/new.txt"
    );
}

#[tokio::test]
async fn dir_created_creates_remote_folder_then_sweeps_contents() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(url_path("/v1.0/drive/root/children"))
        .and(body_json(json!({ "name": "Docs2", "folder": {} })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(remote_folder("id-docs2", "Docs2", "root-id", "ed1")),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(url_path("/v1.0/drive/root:/Docs2/inner.txt:/content"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "id-inner",
            "name": "inner.txt",
            "eTag": "ei1",
            "cTag": "ci1",
            "parentReference": { "id": "id-docs2" },
            "fileSystemInfo": { "lastModifiedDateTime": "2024-01-01T00:00:00Z" },
            "file": {}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(url_path("/v1.0/drive/items/id-inner"))
        .and(header("if-match", "ei1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "id-inner",
            "name": "inner.txt",
            "eTag": "ei2",
            "cTag": "ci1",
            "parentReference": { "id": "id-docs2" },
            "fileSystemInfo": { "lastModifiedDateTime": LOCAL_MTIME_RFC3339 },
            "file": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let docs2 = dir.path().join("Docs2");
    std::fs::create_dir(&docs2).unwrap();
    let inner = docs2.join("inner.txt");
    std::fs::write(&inner, b"inner").unwrap();
    set_local_mtime(&inner, LOCAL_MTIME);

    let mut engine = make_engine(&server, dir.path()).await;
    engine.dir_created("/Docs2").await.unwrap();

    assert!(engine.index.find_by_path("/Docs2").await.unwrap().is_some());
    assert_eq!(
        engine.index.path_of("id-inner").await.unwrap(),
        "/Docs2/inner.txt"
    );
}

#[tokio::test]
async fn move_item_patches_name_and_parent_path() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(url_path("/v1.0/drive/items/id-a"))
        .and(header("if-match", "etag-id-a"))
        .and(body_json(json!({
            "name": "B.txt",
            "parentReference": { "path": "/drive/root:/Docs" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "id-a",
            "name": "B.txt",
            "eTag": "e9",
            "cTag": "ctag-id-a",
            "parentReference": { "id": "id-docs" },
            "fileSystemInfo": { "lastModifiedDateTime": "2024-01-01T00:00:00Z" },
            "file": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut engine = make_engine(&server, dir.path()).await;
    engine
        .index
        .upsert_item(&seeded_row("id-a", "A.txt", ItemType::File, "root-id"))
        .await
        .unwrap();

    engine.move_item("/A.txt", "/Docs/B.txt").await.unwrap();

    let row = engine.index.get_item("id-a").await.unwrap().unwrap();
    assert_eq!(row.name, "B.txt");
    assert_eq!(row.parent_id, "id-docs");
    assert_eq!(row.etag, "e9");
}

#[tokio::test]
async fn move_and_delete_of_unknown_paths_are_logical_violations() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut engine = make_engine(&server, dir.path()).await;

    assert!(matches!(
        engine.move_item("/ghost.txt", "/y.txt").await,
        Err(EngineError::MissingItem(_))
    ));
    assert!(matches!(
        engine.delete_by_path("/ghost.txt").await,
        Err(EngineError::MissingItem(_))
    ));
}

#[tokio::test]
async fn stale_precondition_on_delete_aborts_the_pass() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(url_path("/v1.0/drive/items/id-a"))
        .respond_with(ResponseTemplate::new(412))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut engine = make_engine(&server, dir.path()).await;
    engine
        .index
        .upsert_item(&seeded_row("id-a", "a.txt", ItemType::File, "root-id"))
        .await
        .unwrap();

    let err = engine
        .upload_differences(None)
        .await
        .expect_err("expected stale precondition");

    assert!(matches!(err, EngineError::Api(_)));
    // The row survives: the next download pass will bring the fresh state.
    assert!(engine.index.get_item("id-a").await.unwrap().is_some());
}
