impl SyncEngine {
    /// The upload pass. Scoped to a local directory it reconciles only that
    /// subtree; otherwise every indexed row is diffed first and the whole
    /// tree is then scanned for entries the index has never seen.
    pub async fn upload_differences(&mut self, scope: Option<&Path>) -> Result<(), EngineError> {
        match scope {
            Some(dir) => self.upload_subtree(dir).await,
            None => self.upload_full().await,
        }
    }

    async fn upload_full(&mut self) -> Result<(), EngineError> {
        // Children first, so a vanished local subtree unwinds leaf-to-root
        // instead of tripping over its own cascaded remote deletion.
        let mut rows = Vec::new();
        for row in self.index.list_all().await? {
            let path = self.index.path_of(&row.id).await?;
            rows.push((path, row));
        }
        rows.sort_by(|a, b| b.0.cmp(&a.0));
        for (path, row) in rows {
            self.upload_diff(&row, &path).await?;
        }

        let mut pending = VecDeque::from([self.sync_root.clone()]);
        while let Some(dir) = pending.pop_front() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let local = entry.path();
                let Some(remote) = paths::remote_path_of(&self.sync_root, &local) else {
                    continue;
                };
                let meta = tokio::fs::symlink_metadata(&local).await?;
                if meta.file_type().is_symlink() {
                    continue;
                }
                if self.index.find_by_path(&remote).await?.is_none() {
                    if meta.is_dir() {
                        self.upload_create_dir(&remote).await?;
                    } else {
                        self.upload_new_file(&remote).await?;
                    }
                }
                if meta.is_dir() {
                    pending.push_back(local);
                }
            }
        }
        Ok(())
    }

    async fn upload_subtree(&mut self, root: &Path) -> Result<(), EngineError> {
        let mut pending = VecDeque::from([root.to_path_buf()]);
        while let Some(dir) = pending.pop_front() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let local = entry.path();
                let Some(remote) = paths::remote_path_of(&self.sync_root, &local) else {
                    continue;
                };
                let meta = tokio::fs::symlink_metadata(&local).await?;
                if meta.file_type().is_symlink() {
                    continue;
                }
                match self.index.find_by_path(&remote).await? {
                    Some(row) => self.upload_diff(&row, &remote).await?,
                    // New directories inside the subtree are the watcher's
                    // business (dir_created); only new files are uploaded.
                    None if meta.is_file() => self.upload_new_file(&remote).await?,
                    None => {}
                }
                if meta.is_dir() {
                    pending.push_back(local);
                }
            }
        }
        Ok(())
    }

    /// Reconciles one indexed row against the local filesystem.
    async fn upload_diff(&mut self, row: &ItemRecord, path: &str) -> Result<(), EngineError> {
        let local = self.local_path(path)?;
        let meta = match tokio::fs::symlink_metadata(&local).await {
            Ok(meta) => meta,
            Err(_) => return self.upload_delete(row).await,
        };
        match row.item_type {
            ItemType::File => {
                if meta.is_dir() {
                    // Type flip: the file became a directory.
                    self.upload_delete(row).await?;
                    self.upload_create_dir(path).await?;
                } else {
                    self.upload_item_diff(row, path, &local).await?;
                }
            }
            ItemType::Dir => {
                if !meta.is_dir() {
                    // Type flip: the directory became a file.
                    self.upload_delete(row).await?;
                    self.upload_new_file(path).await?;
                }
                // Folder metadata is not synced upward beyond existence.
            }
        }
        Ok(())
    }

    async fn upload_item_diff(
        &mut self,
        row: &ItemRecord,
        path: &str,
        local: &Path,
    ) -> Result<(), EngineError> {
        let meta = tokio::fs::metadata(local).await?;
        let local_mtime = probe::local_mtime_secs(&meta);
        if local_mtime == row.mtime {
            return Ok(());
        }

        let mut current = row.clone();
        let crc = probe::crc32_of(local).await?;
        let content_changed = match &row.crc32 {
            Some(known) => !known.eq_ignore_ascii_case(&crc),
            None => true,
        };
        if content_changed {
            let item = self
                .client
                .simple_upload(local, &self.remote_abs(path), Some(&row.etag))
                .await?;
            current = self.save_item(&item).await?;
        }
        // The remote mtime moves either way, guarded by the freshest etag.
        self.push_local_mtime(&current, local_mtime).await?;
        Ok(())
    }

    async fn upload_new_file(&mut self, path: &str) -> Result<(), EngineError> {
        let local = self.local_path(path)?;
        let meta = tokio::fs::metadata(&local).await?;
        let item = self
            .client
            .simple_upload(&local, &self.remote_abs(path), None)
            .await?;
        let row = self.save_item(&item).await?;
        self.push_local_mtime(&row, probe::local_mtime_secs(&meta))
            .await?;
        Ok(())
    }

    async fn upload_create_dir(&mut self, path: &str) -> Result<(), EngineError> {
        let parent = paths::parent_of(path).unwrap_or_else(|| "/".to_string());
        let name = paths::base_name(path);
        let item = self
            .client
            .create_folder(&self.remote_abs(&parent), name)
            .await?;
        self.save_item(&item).await?;
        Ok(())
    }

    async fn upload_delete(&mut self, row: &ItemRecord) -> Result<(), EngineError> {
        self.client.delete_by_id(&row.id, &row.etag).await?;
        self.index.delete_item(&row.id).await?;
        Ok(())
    }

    async fn push_local_mtime(&mut self, row: &ItemRecord, secs: i64) -> Result<(), EngineError> {
        let patch = serde_json::json!({
            "fileSystemInfo": { "lastModifiedDateTime": format_timestamp(secs) }
        });
        let item = self.client.update_by_id(&row.id, &patch, &row.etag).await?;
        self.save_item(&item).await?;
        Ok(())
    }

    /// Single-file entry point used by the watcher and the CLI.
    pub async fn upload_file(&mut self, path: &str) -> Result<(), EngineError> {
        match self.index.find_by_path(path).await? {
            Some(row) => self.upload_diff(&row, path).await,
            None => self.upload_new_file(path).await,
        }
    }

    /// A directory appeared locally: create it remotely, then sweep its
    /// contents as a subtree pass.
    pub async fn dir_created(&mut self, path: &str) -> Result<(), EngineError> {
        if self.index.find_by_path(path).await?.is_none() {
            self.upload_create_dir(path).await?;
        }
        let local = self.local_path(path)?;
        self.upload_subtree(&local).await
    }

    pub async fn move_item(&mut self, from: &str, to: &str) -> Result<(), EngineError> {
        let row = self
            .index
            .find_by_path(from)
            .await?
            .ok_or_else(|| EngineError::MissingItem(from.to_string()))?;
        let dir = paths::parent_of(to).unwrap_or_else(|| "/".to_string());
        let patch = serde_json::json!({
            "name": paths::base_name(to),
            "parentReference": { "path": format!("/drive/root:{}", self.remote_abs(&dir)) }
        });
        let item = self.client.update_by_id(&row.id, &patch, &row.etag).await?;
        self.save_item(&item).await?;
        Ok(())
    }

    pub async fn delete_by_path(&mut self, path: &str) -> Result<(), EngineError> {
        let row = self
            .index
            .find_by_path(path)
            .await?
            .ok_or_else(|| EngineError::MissingItem(path.to_string()))?;
        self.upload_delete(&row).await
    }

    /// Every acknowledged remote mutation funnels through here: classify,
    /// extract, insert-or-replace.
    async fn save_item(&mut self, item: &DriveItem) -> Result<ItemRecord, EngineError> {
        let record = ItemRecord::from_remote(item).ok_or(EngineError::MalformedResponse)?;
        Ok(self.index.upsert_item(&record).await?)
    }
}
