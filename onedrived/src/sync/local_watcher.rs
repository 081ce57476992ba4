use std::path::Path;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::paths::remote_path_of;

/// A local filesystem change, expressed in "/"-rooted remote paths so the
/// engine can consume it directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalEvent {
    FileChanged { path: String },
    DirCreated { path: String },
    Removed { path: String },
    Moved { from: String, to: String },
}

pub fn start_notify_watcher(
    root: &Path,
) -> notify::Result<(RecommendedWatcher, mpsc::UnboundedReceiver<LocalEvent>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let root = root.to_path_buf();
    let watch_root = root.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = res {
            for local in map_event(&watch_root, event) {
                let _ = tx.send(local);
            }
        }
    })?;
    watcher.watch(root.as_path(), RecursiveMode::Recursive)?;
    Ok((watcher, rx))
}

fn map_event(root: &Path, event: Event) -> Vec<LocalEvent> {
    match event.kind {
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => {
            if event.paths.len() >= 2
                && let (Some(from), Some(to)) = (
                    remote_path_of(root, &event.paths[0]),
                    remote_path_of(root, &event.paths[1]),
                )
            {
                return vec![LocalEvent::Moved { from, to }];
            }
            Vec::new()
        }
        EventKind::Create(_) => event
            .paths
            .iter()
            .filter_map(|path| map_created_path(root, path))
            .collect(),
        EventKind::Modify(_) => event
            .paths
            .iter()
            .filter_map(|path| map_written_path(root, path))
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .filter_map(|path| remote_path_of(root, path))
            .map(|path| LocalEvent::Removed { path })
            .collect(),
        _ => Vec::new(),
    }
}

fn map_created_path(root: &Path, path: &Path) -> Option<LocalEvent> {
    let remote = remote_path_of(root, path)?;
    let meta = std::fs::symlink_metadata(path).ok()?;
    if meta.file_type().is_symlink() {
        return None;
    }
    if meta.is_dir() {
        Some(LocalEvent::DirCreated { path: remote })
    } else {
        Some(LocalEvent::FileChanged { path: remote })
    }
}

fn map_written_path(root: &Path, path: &Path) -> Option<LocalEvent> {
    let remote = remote_path_of(root, path)?;
    let meta = std::fs::symlink_metadata(path).ok()?;
    if meta.file_type().is_symlink() || meta.is_dir() {
        return None;
    }
    Some(LocalEvent::FileChanged { path: remote })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn maps_write_event_to_file_change() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        let file = root.join("Docs/A.txt");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, b"x").unwrap();
        let event = Event {
            kind: EventKind::Modify(notify::event::ModifyKind::Data(
                notify::event::DataChange::Any,
            )),
            paths: vec![file],
            attrs: Default::default(),
        };
        let mapped = map_event(root, event);
        assert_eq!(
            mapped,
            vec![LocalEvent::FileChanged {
                path: "/Docs/A.txt".into()
            }]
        );
    }

    #[test]
    fn maps_create_dir_event() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        let dir = root.join("Docs");
        std::fs::create_dir_all(&dir).unwrap();
        let event = Event {
            kind: EventKind::Create(notify::event::CreateKind::Folder),
            paths: vec![dir],
            attrs: Default::default(),
        };
        let mapped = map_event(root, event);
        assert_eq!(
            mapped,
            vec![LocalEvent::DirCreated {
                path: "/Docs".into()
            }]
        );
    }

    #[test]
    fn maps_rename_event_to_move() {
        let root = Path::new("/tmp/root");
        let event = Event {
            kind: EventKind::Modify(notify::event::ModifyKind::Name(
                notify::event::RenameMode::Both,
            )),
            paths: vec![
                PathBuf::from("/tmp/root/Docs/A.txt"),
                PathBuf::from("/tmp/root/Docs/B.txt"),
            ],
            attrs: Default::default(),
        };
        let mapped = map_event(root, event);
        assert_eq!(
            mapped,
            vec![LocalEvent::Moved {
                from: "/Docs/A.txt".into(),
                to: "/Docs/B.txt".into()
            }]
        );
    }

    #[test]
    fn ignores_paths_outside_the_root() {
        let event = Event {
            kind: EventKind::Remove(notify::event::RemoveKind::Any),
            paths: vec![PathBuf::from("/elsewhere/x")],
            attrs: Default::default(),
        };
        assert!(map_event(Path::new("/tmp/root"), event).is_empty());
    }
}
