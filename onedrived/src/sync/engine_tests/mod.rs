use super::*;
use serde_json::json;
use sqlx::SqlitePool;
use wiremock::matchers::{body_json, header, method, path as url_path, query_param,
    query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn make_engine(server: &MockServer, sync_root: &Path) -> SyncEngine {
    let client = OneDriveClient::with_base_url(&server.uri(), "test-token").unwrap();
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    let index = IndexStore::from_pool(pool);
    index.init().await.unwrap();
    SyncEngine::new(client, index, sync_root.to_path_buf(), "/")
}

fn remote_folder(id: &str, name: &str, parent: &str, etag: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "eTag": etag,
        "cTag": format!("{etag}-c"),
        "parentReference": { "id": parent },
        "fileSystemInfo": { "lastModifiedDateTime": "2024-01-01T00:00:00Z" },
        "folder": {}
    })
}

fn remote_file(
    id: &str,
    name: &str,
    parent: &str,
    etag: &str,
    ctag: &str,
    crc32: Option<&str>,
) -> serde_json::Value {
    let hashes = match crc32 {
        Some(crc) => json!({ "hashes": { "crc32Hash": crc } }),
        None => json!({}),
    };
    json!({
        "id": id,
        "name": name,
        "eTag": etag,
        "cTag": ctag,
        "parentReference": { "id": parent },
        "fileSystemInfo": { "lastModifiedDateTime": "2024-01-01T00:00:00Z" },
        "file": hashes
    })
}

fn change_page(items: Vec<serde_json::Value>, token: &str, has_more: bool) -> serde_json::Value {
    json!({
        "value": items,
        "@changes.token": token,
        "@changes.hasMoreChanges": has_more
    })
}

// 2024-01-01T00:00:00Z, the stamp used by the remote item builders above.
const REMOTE_MTIME: i64 = 1_704_067_200;

fn local_mtime_of(path: &Path) -> i64 {
    probe::local_mtime_secs(&std::fs::metadata(path).unwrap())
}

include!("download.rs");
include!("upload.rs");
