use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("remote path is empty")]
    Empty,
    #[error("remote path contains unsupported component")]
    UnsupportedComponent,
}

/// Maps a POSIX-like remote path ("/Docs/A.txt") to its place under the
/// local sync root.
pub fn local_path_for(sync_root: &Path, remote_path: &str) -> Result<PathBuf, PathError> {
    if remote_path.is_empty() {
        return Err(PathError::Empty);
    }

    let mut out = sync_root.to_path_buf();
    for component in Path::new(remote_path).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::RootDir => continue,
            Component::CurDir => continue,
            Component::ParentDir | Component::Prefix(_) => {
                return Err(PathError::UnsupportedComponent);
            }
        }
    }
    Ok(out)
}

/// The inverse mapping: a local path inside the sync root becomes a
/// "/"-rooted remote path. `None` when the path lies outside the root.
pub fn remote_path_of(sync_root: &Path, local: &Path) -> Option<String> {
    let relative = local.strip_prefix(sync_root).ok()?;
    let remote = PathBuf::from("/").join(relative);
    Some(remote.to_string_lossy().replace('\\', "/"))
}

pub fn parent_of(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    trimmed.rfind('/').map(|idx| {
        if idx == 0 {
            "/".to_string()
        } else {
            trimmed[..idx].to_string()
        }
    })
}

pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Joins the configured remote root with an engine-relative path.
pub fn join_remote(root: &str, rel: &str) -> String {
    let root = root.trim_end_matches('/');
    if root.is_empty() {
        return rel.to_string();
    }
    if rel == "/" {
        return root.to_string();
    }
    format!("{root}{rel}")
}
