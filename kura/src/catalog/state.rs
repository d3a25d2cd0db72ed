//! Catalog State
//!
//! Live entries, tombstones and the merge algorithm. Only reachable through
//! [`super::Catalog::access`], which holds the catalog lock for the duration.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

use kura_protocol::{Content, ContentSource, Platform, Tombstone};

/// One live catalog entry
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    /// Canonical package file
    pub path: PathBuf,
    /// Staging location the package came through
    pub original_path: PathBuf,
    pub content: Content,
}

impl CatalogEntry {
    /// File name of the package inside the content directory
    pub fn package_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn owns(&self, path: &Path) -> bool {
        self.path == path || self.original_path == path
    }
}

/// Result of [`CatalogState::changes_since`]
#[derive(Debug)]
pub struct Changes<'a> {
    pub updated: Vec<&'a CatalogEntry>,
    pub removed: Vec<&'a Tombstone>,
}

#[derive(Debug, Default)]
pub struct CatalogState {
    entries: Vec<CatalogEntry>,
    tombstones: Vec<Tombstone>,
}

impl CatalogState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Merge one content source, returning package files that are now obsolete
    pub fn merge(&mut self, source: ContentSource) -> Vec<PathBuf> {
        self.merge_at(source, Utc::now())
    }

    /// [`merge`](Self::merge) with an explicit removal time for tombstones
    pub fn merge_at(&mut self, source: ContentSource, now: DateTime<Utc>) -> Vec<PathBuf> {
        let mut obsolete = match (source.path, source.content) {
            (Some(path), Some(content)) => self.merge_update(
                CatalogEntry {
                    path,
                    original_path: source.original_path,
                    content,
                },
                now,
            ),
            (path, _) => self.merge_removal(path, source.original_path, now),
        };

        // Nothing that is still being served may be deleted
        obsolete.retain(|p| !self.entries.iter().any(|e| &e.path == p));
        obsolete
    }

    fn merge_update(&mut self, incoming: CatalogEntry, now: DateTime<Utc>) -> Vec<PathBuf> {
        let mut obsolete = Vec::new();
        let mut handled = false;
        let mut live = false;

        // Newest first: the most recently added match is the authoritative slot
        let mut i = self.entries.len();
        while i > 0 {
            i -= 1;
            if self.entries[i].content.name != incoming.content.name {
                continue;
            }

            if !handled {
                handled = true;
                if self.entries[i].content.last_modified <= incoming.content.last_modified {
                    let replaced = std::mem::replace(&mut self.entries[i], incoming.clone());
                    live = true;
                    if replaced.path != incoming.path {
                        push_unique(&mut obsolete, replaced.path);
                    }
                } else {
                    debug!(
                        "Ignoring stale update for '{}' ({} < {})",
                        incoming.content.name,
                        incoming.content.last_modified,
                        self.entries[i].content.last_modified
                    );
                    if self.entries[i].path != incoming.path {
                        push_unique(&mut obsolete, incoming.path.clone());
                    }
                }
            } else {
                let duplicate = self.entries.remove(i);
                debug!("Dropping duplicate entry {:?} for '{}'", duplicate.path, incoming.content.name);
                if duplicate.path != incoming.path {
                    push_unique(&mut obsolete, duplicate.path);
                }
            }
        }

        if !handled {
            self.entries.push(incoming.clone());
            live = true;
        }
        if !live {
            return obsolete;
        }

        // The package at this location was re-authored under another name
        let mut i = self.entries.len();
        while i > 0 {
            i -= 1;
            let entry = &self.entries[i];
            if entry.original_path == incoming.original_path && entry.content.name != incoming.content.name {
                let renamed = self.entries.remove(i);
                debug!(
                    "'{}' replaced by '{}' at {:?}",
                    renamed.content.name, incoming.content.name, incoming.original_path
                );
                self.add_tombstone(&renamed.content.id, now);
                push_unique(&mut obsolete, renamed.path);
            }
        }

        let id = incoming.content.id;
        self.tombstones.retain(|t| t.id != id);

        obsolete
    }

    fn merge_removal(&mut self, path: Option<PathBuf>, original_path: PathBuf, now: DateTime<Utc>) -> Vec<PathBuf> {
        let mut obsolete = Vec::new();

        let mut i = self.entries.len();
        while i > 0 {
            i -= 1;
            let entry = &self.entries[i];
            let matched = entry.owns(&original_path) || path.as_deref().map(|p| entry.owns(p)).unwrap_or(false);
            if !matched {
                continue;
            }

            let removed = self.entries.remove(i);
            debug!("Removed '{}' ({})", removed.content.name, removed.content.id);
            self.add_tombstone(&removed.content.id, now);

            // Only a pure "location is gone" signal releases the backing file
            if path.is_none() {
                push_unique(&mut obsolete, removed.path);
            }
        }

        if let Some(own) = &path {
            obsolete.retain(|p| p != own);
        }
        obsolete
    }

    fn add_tombstone(&mut self, id: &str, now: DateTime<Utc>) {
        if self.entries.iter().any(|e| e.content.id == id) {
            return;
        }
        if !self.tombstones.iter().any(|t| t.id == id) {
            self.tombstones.push(Tombstone {
                id: id.to_string(),
                removed_at: now,
            });
        }
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn tombstones(&self) -> &[Tombstone] {
        &self.tombstones
    }

    /// Every live entry, optionally limited to one platform
    pub fn list_all(&self, platform: Option<Platform>) -> Vec<&CatalogEntry> {
        self.entries
            .iter()
            .filter(|e| platform.map(|p| e.content.supports(p)).unwrap_or(true))
            .collect()
    }

    pub fn get_by_id(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.content.id == id)
    }

    /// Entries modified strictly after `since`
    pub fn modified_since(&self, since: DateTime<Utc>, platform: Option<Platform>) -> Vec<&CatalogEntry> {
        self.list_all(platform)
            .into_iter()
            .filter(|e| e.content.last_modified > since)
            .collect()
    }

    /// Tombstones recorded strictly after `since`
    pub fn tombstones_since(&self, since: DateTime<Utc>) -> Vec<&Tombstone> {
        self.tombstones.iter().filter(|t| t.removed_at > since).collect()
    }

    pub fn changes_since(&self, since: DateTime<Utc>, platform: Option<Platform>) -> Changes<'_> {
        Changes {
            updated: self.modified_since(since, platform),
            removed: self.tombstones_since(since),
        }
    }

    #[cfg(test)]
    pub(crate) fn push_raw(&mut self, entry: CatalogEntry) {
        self.entries.push(entry);
    }
}

fn push_unique(paths: &mut Vec<PathBuf>, path: PathBuf) {
    if !paths.contains(&path) {
        paths.push(path);
    }
}
