impl SyncEngine {
    /// The download pass: pulls delta pages from the current cursor, applies
    /// every item in server order, and persists the returned token after each
    /// fully-applied page so a crash never reprocesses the world. Queued
    /// local deletions drain once the feed is exhausted.
    pub async fn apply_differences(&mut self) -> Result<(), EngineError> {
        self.skipped.clear();
        self.removed_paths.clear();
        loop {
            let token = self.cursor.clone();
            let page = self
                .client
                .view_changes(&self.remote_root, token.as_deref())
                .await?;
            let has_more = page.has_more;
            for item in &page.value {
                self.apply_difference(item).await?;
            }
            self.store_cursor(page.token).await?;
            if !has_more {
                break;
            }
        }
        self.deletions.drain().await?;
        Ok(())
    }

    async fn store_cursor(&mut self, token: String) -> Result<(), EngineError> {
        self.index
            .set_sync_cursor(Some(&token), Some(now_unix()))
            .await?;
        if let Some(sink) = &self.cursor_sink {
            sink(&token);
        }
        self.cursor = Some(token);
        Ok(())
    }

    // Like `IndexStore::path_of`, but a parent chain broken by a deletion
    // earlier in this pass is completed from the remembered paths.
    async fn derived_path(&self, id: &str) -> Result<String, EngineError> {
        let mut segments = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self
            .index
            .get_item(id)
            .await?
            .ok_or_else(|| EngineError::MissingItem(id.to_string()))?;
        loop {
            if !seen.insert(current.id.clone()) {
                segments.reverse();
                return Ok(format!("/{}", segments.join("/")));
            }
            segments.push(current.name.clone());
            match self.index.get_item(&current.parent_id).await? {
                Some(parent) => current = parent,
                None => {
                    segments.reverse();
                    let tail = segments.join("/");
                    return Ok(match self.removed_paths.get(&current.parent_id) {
                        Some(prefix) => format!("{prefix}/{tail}"),
                        None => format!("/{tail}"),
                    });
                }
            }
        }
    }

    /// Converges local state and index toward one remote delta item.
    async fn apply_difference(&mut self, item: &DriveItem) -> Result<(), EngineError> {
        let Some(id) = item.id.as_deref() else {
            return Ok(());
        };

        let existing = self.index.get_item(id).await?;

        // Probe the row as it stands. A local object that cannot be proven
        // to be the indexed item is moved aside, and the row is treated as
        // not cached from here on.
        let mut cached: Option<(ItemRecord, String)> = None;
        if let Some(row) = &existing {
            let path = self.derived_path(&row.id).await?;
            let local = self.local_path(&path)?;
            if probe::is_synced(row, &local).await {
                cached = Some((row.clone(), path));
            } else if let Some(aside) = probe::safe_rename(&local).await? {
                eprintln!(
                    "[onedrived] moved unrecognized local object aside: {}",
                    aside.display()
                );
            }
        }

        match classify(item) {
            Classification::Deleted => {
                if let Some(row) = &existing {
                    let path = self.derived_path(&row.id).await?;
                    let local = self.local_path(&path)?;
                    self.deletions.push(local);
                    self.index.delete_item(&row.id).await?;
                    self.removed_paths.insert(row.id.clone(), path);
                }
                return Ok(());
            }
            Classification::Unsupported => {
                self.skipped.insert(id.to_string());
                return Ok(());
            }
            Classification::File | Classification::Folder => {}
        }

        let Some(record) = ItemRecord::from_remote(item) else {
            // A required field is missing; the item and its descendants are
            // excluded for the rest of the pass.
            self.skipped.insert(id.to_string());
            return Ok(());
        };
        if self.skipped.contains(&record.parent_id) {
            self.skipped.insert(record.id);
            return Ok(());
        }

        let fresh = self.index.upsert_item(&record).await?;
        let applied = match &cached {
            None => self.apply_new(&fresh).await,
            Some((old, old_path)) => self.apply_changed(old, old_path, &fresh).await,
        };
        if let Err(err) = applied {
            // The index must not describe state that was never applied.
            self.index.delete_item(&fresh.id).await?;
            return Err(err);
        }
        Ok(())
    }

    async fn apply_new(&mut self, record: &ItemRecord) -> Result<(), EngineError> {
        let path = self.index.path_of(&record.id).await?;
        let local = self.local_path(&path)?;

        if tokio::fs::symlink_metadata(&local).await.is_ok() {
            if probe::is_synced(record, &local).await {
                // Idempotent arrival: the object is already here.
                probe::force_mtime(&local, record.mtime)?;
                return Ok(());
            }
            if let Some(aside) = probe::safe_rename(&local).await? {
                eprintln!(
                    "[onedrived] path occupied, moved occupant aside: {}",
                    aside.display()
                );
            }
        }

        match record.item_type {
            ItemType::File => self.client.download_by_id(&record.id, &local).await?,
            ItemType::Dir => tokio::fs::create_dir_all(&local).await?,
        }
        probe::force_mtime(&local, record.mtime)?;
        Ok(())
    }

    // Type flips never reach this point: the remote assigns a new id on a
    // type change, so a changed row keeps its kind.
    async fn apply_changed(
        &mut self,
        old: &ItemRecord,
        old_path: &str,
        new: &ItemRecord,
    ) -> Result<(), EngineError> {
        if old.etag == new.etag {
            return Ok(());
        }

        let new_path = self.index.path_of(&new.id).await?;
        let local = self.local_path(&new_path)?;
        if old_path != new_path {
            if let Some(aside) = probe::safe_rename(&local).await? {
                eprintln!(
                    "[onedrived] rename target occupied, moved occupant aside: {}",
                    aside.display()
                );
            }
            if let Some(parent) = local.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::rename(self.local_path(old_path)?, &local).await?;
        }

        if new.item_type == ItemType::File && old.ctag != new.ctag {
            self.client.download_by_id(&new.id, &local).await?;
        }
        probe::force_mtime(&local, new.mtime)?;
        Ok(())
    }
}
