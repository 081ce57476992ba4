use std::{fs, path::PathBuf};

use sqlx::{Row, SqlitePool, migrate::Migrator, sqlite::SqliteConnectOptions};
use thiserror::Error;

use super::item::{ItemRecord, ItemType};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XDG data directory is unavailable")]
    MissingDataDir,
    #[error("invalid item type: {0}")]
    InvalidItemType(String),
    #[error("item not found: {0}")]
    MissingItem(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCursor {
    pub cursor: Option<String>,
    pub last_sync: Option<i64>,
}

/// Durable id-keyed mapping of synced items. Rows form a parent-pointer
/// tree; paths are always derived, never stored, so a re-parented folder
/// moves its whole subtree without touching descendant rows.
pub struct IndexStore {
    pool: SqlitePool,
}

include!("index_store_impl.rs");

fn default_db_path() -> Result<PathBuf, IndexError> {
    let mut path = dirs::data_dir().ok_or(IndexError::MissingDataDir)?;
    path.push("onedrived");
    path.push("sync");
    path.push("index.db");
    Ok(path)
}

#[cfg(test)]
#[path = "index_tests.rs"]
mod tests;
