use onedrive_core::DriveItem;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemType {
    File,
    Dir,
}

impl ItemType {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            ItemType::File => "file",
            ItemType::Dir => "dir",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "file" => Some(ItemType::File),
            "dir" => Some(ItemType::Dir),
            _ => None,
        }
    }
}

/// An index row. `path` is never stored; it is derived by walking
/// `parent_id` up to the sync root, which itself has no row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRecord {
    pub id: String,
    pub name: String,
    pub item_type: ItemType,
    pub etag: String,
    pub ctag: String,
    pub mtime: i64,
    pub parent_id: String,
    pub crc32: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Deleted,
    File,
    Folder,
    Unsupported,
}

/// Deletion wins over type; anything without a recognized facet (remote-only
/// artifacts such as notebooks) is unsupported.
pub fn classify(item: &DriveItem) -> Classification {
    if item.deleted.is_some() {
        Classification::Deleted
    } else if item.file.is_some() {
        Classification::File
    } else if item.folder.is_some() {
        Classification::Folder
    } else {
        Classification::Unsupported
    }
}

impl ItemRecord {
    /// Extracts the canonical fields from a remote item. `None` when a
    /// required field is absent or the timestamp is malformed; callers treat
    /// that item as unsupported. A missing content hash is fine.
    pub fn from_remote(item: &DriveItem) -> Option<Self> {
        let item_type = match classify(item) {
            Classification::File => ItemType::File,
            Classification::Folder => ItemType::Dir,
            Classification::Deleted | Classification::Unsupported => return None,
        };
        let id = item.id.clone()?;
        let name = item.name.clone()?;
        let etag = item.etag.clone()?;
        let ctag = item.ctag.clone().unwrap_or_default();
        let parent_id = item.parent_reference.as_ref()?.id.clone()?;
        let stamp = item.file_system_info.as_ref()?.last_modified.as_deref()?;
        let mtime = parse_timestamp(stamp).ok()?;
        let crc32 = match item_type {
            ItemType::File => item
                .file
                .as_ref()
                .and_then(|facet| facet.hashes.as_ref())
                .and_then(|hashes| hashes.crc32.clone()),
            ItemType::Dir => None,
        };

        Some(Self {
            id,
            name,
            item_type,
            etag,
            ctag,
            mtime,
            parent_id,
            crc32,
        })
    }
}

/// Whole seconds since the epoch; the sub-second fraction is dropped so both
/// sides of every comparison carry the same precision.
pub fn parse_timestamp(value: &str) -> Result<i64, time::error::Parse> {
    Ok(OffsetDateTime::parse(value, &Rfc3339)?.unix_timestamp())
}

pub fn format_timestamp(secs: i64) -> String {
    OffsetDateTime::from_unix_timestamp(secs)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
        .format(&Rfc3339)
        .unwrap_or_default()
}
