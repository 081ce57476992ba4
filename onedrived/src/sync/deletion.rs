use std::io;
use std::path::PathBuf;

/// Local paths scheduled for removal during a download pass. Paths are
/// collected in feed order and drained in reverse, so children come off
/// before their parents and emptied directories collapse cleanly.
#[derive(Debug, Default)]
pub struct DeletionQueue {
    inner: Vec<PathBuf>,
}

impl DeletionQueue {
    pub fn push(&mut self, path: PathBuf) {
        self.inner.push(path);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Removes the queued paths. A directory that refuses rmdir (the user
    /// repopulated it since the remote deletion) is kept and logged, not an
    /// error; a file that cannot be removed aborts the pass.
    pub async fn drain(&mut self) -> io::Result<()> {
        while let Some(path) = self.inner.pop() {
            let Ok(meta) = tokio::fs::symlink_metadata(&path).await else {
                continue;
            };
            if meta.is_dir() {
                match tokio::fs::remove_dir(&path).await {
                    Ok(()) => eprintln!("[onedrived] deleted dir: {}", path.display()),
                    Err(_) => eprintln!("[onedrived] kept dir: {}", path.display()),
                }
            } else {
                tokio::fs::remove_file(&path).await?;
                eprintln!("[onedrived] deleted file: {}", path.display());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drains_children_before_parents() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("d");
        let child = parent.join("f.txt");
        std::fs::create_dir(&parent).unwrap();
        std::fs::write(&child, b"x").unwrap();

        // Feed order: parent first, child second, as the server reports them.
        let mut queue = DeletionQueue::default();
        queue.push(parent.clone());
        queue.push(child.clone());
        queue.drain().await.unwrap();

        assert!(!child.exists());
        assert!(!parent.exists());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn keeps_repopulated_directory() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("d");
        std::fs::create_dir(&parent).unwrap();
        std::fs::write(parent.join("new.txt"), b"user data").unwrap();

        let mut queue = DeletionQueue::default();
        queue.push(parent.clone());
        queue.drain().await.unwrap();

        assert!(parent.exists());
        assert!(parent.join("new.txt").exists());
    }

    #[tokio::test]
    async fn already_gone_paths_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = DeletionQueue::default();
        queue.push(dir.path().join("never-existed"));
        queue.drain().await.unwrap();
    }
}
