//! Raw Events
//!
//! Translation of `notify` events into the handful of changes the settle
//! detector cares about.

use std::path::{Path, PathBuf};

use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};

use crate::common::paths::is_package_file;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Moved { from: PathBuf, to: PathBuf },
    Deleted(PathBuf),
    /// Periodic no-op, drives the delete drain
    Tick,
}

fn is_candidate(path: &Path) -> bool {
    is_package_file(path) && !path.is_dir()
}

fn each<F>(event: &Event, f: F) -> Vec<RawEvent>
where
    F: Fn(PathBuf) -> RawEvent,
{
    event
        .paths
        .iter()
        .filter(|p| is_candidate(p))
        .cloned()
        .map(f)
        .collect()
}

/// Raw events for one `notify` event; non-package paths are dropped
pub fn translate(event: &Event) -> Vec<RawEvent> {
    match &event.kind {
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) => each(event, RawEvent::Created),

        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => each(event, RawEvent::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => each(event, RawEvent::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => {
            let from = &event.paths[0];
            let to = &event.paths[1];
            match (is_package_file(from), is_candidate(to)) {
                (true, true) => vec![RawEvent::Moved {
                    from: from.clone(),
                    to: to.clone(),
                }],
                (true, false) => vec![RawEvent::Deleted(from.clone())],
                (false, true) => vec![RawEvent::Created(to.clone())],
                (false, false) => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .filter(|p| is_package_file(p))
            .map(|p| {
                if p.is_file() {
                    RawEvent::Created(p.clone())
                } else {
                    RawEvent::Deleted(p.clone())
                }
            })
            .collect(),
        EventKind::Modify(_) => each(event, RawEvent::Modified),

        EventKind::Access(AccessKind::Close(AccessMode::Write)) => each(event, RawEvent::Modified),

        EventKind::Remove(RemoveKind::Folder) => Vec::new(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .filter(|p| is_package_file(p))
            .map(|p| RawEvent::Deleted(p.clone()))
            .collect(),

        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::DataChange;

    fn event(kind: EventKind, paths: &[&Path]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(path.to_path_buf()))
    }

    #[test]
    fn test_create_and_modify() {
        let p = Path::new("/drop/a.zip");
        assert_eq!(
            translate(&event(EventKind::Create(CreateKind::File), &[p])),
            vec![RawEvent::Created(p.to_path_buf())]
        );
        assert_eq!(
            translate(&event(EventKind::Modify(ModifyKind::Data(DataChange::Content)), &[p])),
            vec![RawEvent::Modified(p.to_path_buf())]
        );
        assert_eq!(
            translate(&event(EventKind::Access(AccessKind::Close(AccessMode::Write)), &[p])),
            vec![RawEvent::Modified(p.to_path_buf())]
        );
    }

    #[test]
    fn test_non_packages_and_folders_ignored() {
        let txt = Path::new("/drop/notes.txt");
        let dir = Path::new("/drop/sub.zip");
        assert!(translate(&event(EventKind::Create(CreateKind::File), &[txt])).is_empty());
        assert!(translate(&event(EventKind::Create(CreateKind::Folder), &[dir])).is_empty());
        assert!(translate(&event(EventKind::Remove(RemoveKind::Folder), &[dir])).is_empty());
        assert!(translate(&event(EventKind::Access(AccessKind::Read), &[Path::new("/drop/a.zip")])).is_empty());
    }

    #[test]
    fn test_rename_halves() {
        let p = Path::new("/drop/a.zip");
        assert_eq!(
            translate(&event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &[p])),
            vec![RawEvent::Deleted(p.to_path_buf())]
        );
        assert_eq!(
            translate(&event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &[p])),
            vec![RawEvent::Created(p.to_path_buf())]
        );
    }

    #[test]
    fn test_rename_both() {
        let a = Path::new("/drop/a.zip");
        let b = Path::new("/drop/b.zip");
        let part = Path::new("/drop/b.zip.part");
        let kind = || EventKind::Modify(ModifyKind::Name(RenameMode::Both));

        assert_eq!(
            translate(&event(kind(), &[a, b])),
            vec![RawEvent::Moved {
                from: a.to_path_buf(),
                to: b.to_path_buf()
            }]
        );
        assert_eq!(translate(&event(kind(), &[part, b])), vec![RawEvent::Created(b.to_path_buf())]);
        assert_eq!(translate(&event(kind(), &[a, part])), vec![RawEvent::Deleted(a.to_path_buf())]);
    }

    #[test]
    fn test_ambiguous_rename_checks_existence() {
        let dir = tempfile::tempdir().unwrap();
        let here = dir.path().join("here.zip");
        let gone = dir.path().join("gone.zip");
        std::fs::write(&here, b"pkg").unwrap();

        let kind = EventKind::Modify(ModifyKind::Name(RenameMode::Any));
        assert_eq!(
            translate(&event(kind, &[&here, &gone])),
            vec![RawEvent::Created(here.clone()), RawEvent::Deleted(gone.clone())]
        );
    }

    #[test]
    fn test_remove() {
        let p = Path::new("/drop/A.ZIP");
        assert_eq!(
            translate(&event(EventKind::Remove(RemoveKind::File), &[p])),
            vec![RawEvent::Deleted(p.to_path_buf())]
        );
    }
}
