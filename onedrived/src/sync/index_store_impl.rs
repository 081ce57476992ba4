impl IndexStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn new_default() -> Result<Self, IndexError> {
        Self::open_at(&default_db_path()?).await
    }

    pub async fn open_at(db_path: &std::path::Path) -> Result<Self, IndexError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn init(&self) -> Result<(), IndexError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub async fn upsert_item(&self, item: &ItemRecord) -> Result<ItemRecord, IndexError> {
        sqlx::query(
            "INSERT INTO items (id, name, item_type, etag, ctag, mtime, parent_id, crc32)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                item_type = excluded.item_type,
                etag = excluded.etag,
                ctag = excluded.ctag,
                mtime = excluded.mtime,
                parent_id = excluded.parent_id,
                crc32 = excluded.crc32;",
        )
        .bind(&item.id)
        .bind(&item.name)
        .bind(item.item_type.as_str())
        .bind(&item.etag)
        .bind(&item.ctag)
        .bind(item.mtime)
        .bind(&item.parent_id)
        .bind(&item.crc32)
        .execute(&self.pool)
        .await?;

        self.get_item(&item.id)
            .await?
            .ok_or_else(|| IndexError::MissingItem(item.id.clone()))
    }

    pub async fn get_item(&self, id: &str) -> Result<Option<ItemRecord>, IndexError> {
        let row = sqlx::query(
            "SELECT id, name, item_type, etag, ctag, mtime, parent_id, crc32
             FROM items WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(item_from_row).transpose()
    }

    pub async fn delete_item(&self, id: &str) -> Result<(), IndexError> {
        sqlx::query("DELETE FROM items WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_all(&self) -> Result<Vec<ItemRecord>, IndexError> {
        let rows = sqlx::query(
            "SELECT id, name, item_type, etag, ctag, mtime, parent_id, crc32
             FROM items ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(item_from_row).collect()
    }

    async fn get_child(&self, parent_id: &str, name: &str) -> Result<Option<ItemRecord>, IndexError> {
        let row = sqlx::query(
            "SELECT id, name, item_type, etag, ctag, mtime, parent_id, crc32
             FROM items WHERE parent_id = ?1 AND name = ?2",
        )
        .bind(parent_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(item_from_row).transpose()
    }

    // A root-level row is one whose parent_id has no row of its own: the
    // sync root is never indexed.
    async fn get_root_child(&self, name: &str) -> Result<Option<ItemRecord>, IndexError> {
        let row = sqlx::query(
            "SELECT i.id, i.name, i.item_type, i.etag, i.ctag, i.mtime, i.parent_id, i.crc32
             FROM items i
             WHERE i.name = ?1
               AND NOT EXISTS (SELECT 1 FROM items p WHERE p.id = i.parent_id)",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(item_from_row).transpose()
    }

    /// Derived "/"-rooted path of a row, walking parent pointers until the
    /// chain leaves the index (the sync root).
    pub async fn path_of(&self, id: &str) -> Result<String, IndexError> {
        let mut segments = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut current = self
            .get_item(id)
            .await?
            .ok_or_else(|| IndexError::MissingItem(id.to_string()))?;
        loop {
            if !seen.insert(current.id.clone()) {
                break;
            }
            segments.push(current.name.clone());
            match self.get_item(&current.parent_id).await? {
                Some(parent) => current = parent,
                None => break,
            }
        }
        segments.reverse();
        Ok(format!("/{}", segments.join("/")))
    }

    /// Resolves a derived path back to its row by walking segments down
    /// from the root level.
    pub async fn find_by_path(&self, path: &str) -> Result<Option<ItemRecord>, IndexError> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let Some(first) = segments.next() else {
            return Ok(None);
        };
        let Some(mut current) = self.get_root_child(first).await? else {
            return Ok(None);
        };
        for segment in segments {
            match self.get_child(&current.id, segment).await? {
                Some(child) => current = child,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    pub async fn set_sync_cursor(
        &self,
        cursor: Option<&str>,
        last_sync: Option<i64>,
    ) -> Result<(), IndexError> {
        sqlx::query(
            "INSERT INTO sync_cursor (id, cursor, last_sync)
             VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                cursor = excluded.cursor,
                last_sync = excluded.last_sync;",
        )
        .bind(cursor)
        .bind(last_sync)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_sync_cursor(&self) -> Result<SyncCursor, IndexError> {
        let row = sqlx::query("SELECT cursor, last_sync FROM sync_cursor WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            Ok(SyncCursor {
                cursor: row.try_get("cursor")?,
                last_sync: row.try_get("last_sync")?,
            })
        } else {
            Ok(SyncCursor {
                cursor: None,
                last_sync: None,
            })
        }
    }

    /// Full resynchronization support: drops every row and the cursor so the
    /// next pass re-enumerates the world.
    pub async fn clear(&self) -> Result<(), IndexError> {
        sqlx::query("DELETE FROM items").execute(&self.pool).await?;
        sqlx::query("DELETE FROM sync_cursor")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn item_from_row(row: sqlx::sqlite::SqliteRow) -> Result<ItemRecord, IndexError> {
    let item_type: String = row.try_get("item_type")?;
    Ok(ItemRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        item_type: ItemType::parse(&item_type).ok_or(IndexError::InvalidItemType(item_type))?,
        etag: row.try_get("etag")?,
        ctag: row.try_get("ctag")?,
        mtime: row.try_get("mtime")?,
        parent_id: row.try_get("parent_id")?,
        crc32: row.try_get("crc32")?,
    })
}
