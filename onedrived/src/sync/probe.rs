use std::io;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use tokio::io::AsyncReadExt;

use super::item::{ItemRecord, ItemType};

/// Whether the local object at `local` already matches the indexed record.
///
/// Folders only need to exist as directories. Files must match the record's
/// mtime at second precision or, failing that, its content CRC32 when the
/// record carries one; mtime is tried first to avoid rehashing.
pub async fn is_synced(record: &ItemRecord, local: &Path) -> bool {
    let Ok(meta) = tokio::fs::symlink_metadata(local).await else {
        return false;
    };
    match record.item_type {
        ItemType::Dir => meta.is_dir(),
        ItemType::File => {
            if !meta.is_file() {
                return false;
            }
            if local_mtime_secs(&meta) == record.mtime {
                return true;
            }
            match record.crc32.as_deref() {
                Some(expected) => match crc32_of(local).await {
                    Ok(actual) => actual.eq_ignore_ascii_case(expected),
                    Err(_) => false,
                },
                None => false,
            }
        }
    }
}

pub fn local_mtime_secs(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Streamed CRC32 of the file contents, rendered as the server does:
/// zero-padded uppercase hex.
pub async fn crc32_of(path: &Path) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:08X}", hasher.finalize()))
}

pub fn force_mtime(path: &Path, secs: i64) -> io::Result<()> {
    filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0))
}

/// Renames an existing local object aside so its path can be reused for a
/// different item. Nothing is ever overwritten; the occupant survives under
/// a disambiguated name. No-op when the path is vacant.
pub async fn safe_rename(path: &Path) -> io::Result<Option<PathBuf>> {
    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(_) => return Ok(None),
    };
    let aside = aside_path(path, local_mtime_secs(&meta));
    tokio::fs::rename(path, &aside).await?;
    Ok(Some(aside))
}

fn aside_path(path: &Path, stamp: i64) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let renamed = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            format!("{stem} (conflict copy {stamp}).{ext}")
        }
        _ => format!("{name} (conflict copy {stamp})"),
    };
    path.with_file_name(renamed)
}
