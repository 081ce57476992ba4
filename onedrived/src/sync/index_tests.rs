use super::*;

async fn make_store() -> IndexStore {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    let store = IndexStore::from_pool(pool);
    store.init().await.unwrap();
    store
}

fn record(id: &str, name: &str, item_type: ItemType, parent_id: &str) -> ItemRecord {
    ItemRecord {
        id: id.into(),
        name: name.into(),
        item_type,
        etag: format!("etag-{id}"),
        ctag: format!("ctag-{id}"),
        mtime: 1_700_000_000,
        parent_id: parent_id.into(),
        crc32: None,
    }
}

#[tokio::test]
async fn upsert_and_fetch_item() {
    let store = make_store().await;
    let item = record("id-a", "A.txt", ItemType::File, "root-id");

    let inserted = store.upsert_item(&item).await.unwrap();
    let fetched = store.get_item("id-a").await.unwrap();

    assert_eq!(inserted, fetched.unwrap());
    assert_eq!(inserted, item);
}

#[tokio::test]
async fn upsert_replaces_existing_row() {
    let store = make_store().await;
    let mut item = record("id-a", "A.txt", ItemType::File, "root-id");
    store.upsert_item(&item).await.unwrap();

    item.name = "B.txt".into();
    item.etag = "etag-2".into();
    item.crc32 = Some("DEADBEEF".into());
    let updated = store.upsert_item(&item).await.unwrap();

    assert_eq!(updated.name, "B.txt");
    assert_eq!(updated.etag, "etag-2");
    assert_eq!(updated.crc32.as_deref(), Some("DEADBEEF"));
    assert_eq!(store.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn delete_removes_row() {
    let store = make_store().await;
    store
        .upsert_item(&record("id-a", "A.txt", ItemType::File, "root-id"))
        .await
        .unwrap();

    store.delete_item("id-a").await.unwrap();

    assert!(store.get_item("id-a").await.unwrap().is_none());
}

#[tokio::test]
async fn path_is_derived_from_parent_chain() {
    let store = make_store().await;
    store
        .upsert_item(&record("id-docs", "Docs", ItemType::Dir, "root-id"))
        .await
        .unwrap();
    store
        .upsert_item(&record("id-sub", "Sub", ItemType::Dir, "id-docs"))
        .await
        .unwrap();
    store
        .upsert_item(&record("id-a", "A.txt", ItemType::File, "id-sub"))
        .await
        .unwrap();

    assert_eq!(store.path_of("id-a").await.unwrap(), "/Docs/Sub/A.txt");
    assert_eq!(store.path_of("id-docs").await.unwrap(), "/Docs");
}

#[tokio::test]
async fn reparenting_moves_the_whole_subtree() {
    let store = make_store().await;
    store
        .upsert_item(&record("id-docs", "Docs", ItemType::Dir, "root-id"))
        .await
        .unwrap();
    store
        .upsert_item(&record("id-arch", "Archive", ItemType::Dir, "root-id"))
        .await
        .unwrap();
    store
        .upsert_item(&record("id-a", "A.txt", ItemType::File, "id-docs"))
        .await
        .unwrap();

    let mut moved = store.get_item("id-docs").await.unwrap().unwrap();
    moved.parent_id = "id-arch".into();
    store.upsert_item(&moved).await.unwrap();

    assert_eq!(store.path_of("id-a").await.unwrap(), "/Archive/Docs/A.txt");
}

#[tokio::test]
async fn find_by_path_walks_segments_down() {
    let store = make_store().await;
    store
        .upsert_item(&record("id-docs", "Docs", ItemType::Dir, "root-id"))
        .await
        .unwrap();
    store
        .upsert_item(&record("id-a", "A.txt", ItemType::File, "id-docs"))
        .await
        .unwrap();

    let found = store.find_by_path("/Docs/A.txt").await.unwrap().unwrap();
    assert_eq!(found.id, "id-a");

    let dir = store.find_by_path("/Docs").await.unwrap().unwrap();
    assert_eq!(dir.id, "id-docs");

    assert!(store.find_by_path("/Docs/missing").await.unwrap().is_none());
    assert!(store.find_by_path("/").await.unwrap().is_none());
}

#[tokio::test]
async fn path_of_unknown_id_is_an_error() {
    let store = make_store().await;
    assert!(matches!(
        store.path_of("ghost").await,
        Err(IndexError::MissingItem(_))
    ));
}

#[tokio::test]
async fn set_and_get_sync_cursor() {
    let store = make_store().await;
    assert_eq!(store.get_sync_cursor().await.unwrap().cursor, None);

    store
        .set_sync_cursor(Some("cursor-1"), Some(42))
        .await
        .unwrap();
    let cursor = store.get_sync_cursor().await.unwrap();

    assert_eq!(cursor.cursor.as_deref(), Some("cursor-1"));
    assert_eq!(cursor.last_sync, Some(42));
}

#[tokio::test]
async fn clear_drops_rows_and_cursor() {
    let store = make_store().await;
    store
        .upsert_item(&record("id-a", "A.txt", ItemType::File, "root-id"))
        .await
        .unwrap();
    store.set_sync_cursor(Some("cursor-1"), None).await.unwrap();

    store.clear().await.unwrap();

    assert!(store.list_all().await.unwrap().is_empty());
    assert_eq!(store.get_sync_cursor().await.unwrap().cursor, None);
}
