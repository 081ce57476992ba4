use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use onedrive_core::{DriveItem, OneDriveClient, OneDriveError};
use thiserror::Error;

use super::deletion::DeletionQueue;
use super::index::{IndexError, IndexStore};
use super::item::{Classification, ItemRecord, ItemType, classify, format_timestamp};
use super::local_watcher::LocalEvent;
use super::paths::{self, PathError};
use super::probe;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    #[error("api error: {0}")]
    Api(#[from] OneDriveError),
    #[error("path error: {0}")]
    Path(#[from] PathError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("item not found for path: {0}")]
    MissingItem(String),
    #[error("remote response is missing required item fields")]
    MalformedResponse,
}

type CursorSink = Box<dyn Fn(&str) + Send + Sync>;

/// The reconciliation engine. One owner, one operation at a time: every
/// method takes `&mut self` and awaits are strictly serialized, so the index
/// and the sync tree never see concurrent writers from this process.
pub struct SyncEngine {
    client: OneDriveClient,
    index: IndexStore,
    sync_root: PathBuf,
    remote_root: String,
    cursor: Option<String>,
    cursor_sink: Option<CursorSink>,
    skipped: HashSet<String>,
    deletions: DeletionQueue,
    // Paths of rows removed earlier in the current pass, so a descendant
    // arriving after its ancestor's deletion still derives the right path.
    removed_paths: HashMap<String, String>,
}

impl SyncEngine {
    pub fn new(
        client: OneDriveClient,
        index: IndexStore,
        sync_root: PathBuf,
        remote_root: impl Into<String>,
    ) -> Self {
        Self {
            client,
            index,
            sync_root,
            remote_root: remote_root.into(),
            cursor: None,
            cursor_sink: None,
            skipped: HashSet::new(),
            deletions: DeletionQueue::default(),
            removed_paths: HashMap::new(),
        }
    }

    pub fn set_cursor(&mut self, cursor: Option<String>) {
        self.cursor = cursor;
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Subscribes a callback invoked with the token after every
    /// fully-applied delta page, once it is already durable in the index.
    pub fn on_cursor(&mut self, sink: impl Fn(&str) + Send + Sync + 'static) {
        self.cursor_sink = Some(Box::new(sink));
    }

    pub fn index(&self) -> &IndexStore {
        &self.index
    }

    pub async fn ingest_local_event(&mut self, event: LocalEvent) -> Result<(), EngineError> {
        match event {
            LocalEvent::FileChanged { path } => self.upload_file(&path).await,
            LocalEvent::DirCreated { path } => self.dir_created(&path).await,
            LocalEvent::Removed { path } => self.delete_by_path(&path).await,
            LocalEvent::Moved { from, to } => self.move_item(&from, &to).await,
        }
    }

    fn remote_abs(&self, rel: &str) -> String {
        paths::join_remote(&self.remote_root, rel)
    }

    fn local_path(&self, rel: &str) -> Result<PathBuf, PathError> {
        paths::local_path_for(&self.sync_root, rel)
    }
}

include!("engine_impl_download.rs");
include!("engine_impl_upload.rs");

fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "engine_tests/mod.rs"]
mod tests;
