//! Catalog Link
//!
//! Catalog side of the sync channel. Pending updates are pulled lazily every
//! time the catalog is accessed: the batch is merged and the files it left
//! obsolete are sent back as delete notices, all under the same lock scope.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use kura_protocol::{CatalogEndpoint, CatalogUpdate, ContentSource, IngestNotice};

use crate::catalog::{Catalog, CatalogState};

pub struct CatalogLink {
    catalog: Arc<Catalog>,
    endpoint: Option<CatalogEndpoint>,
    peer_lost: AtomicBool,
}

impl CatalogLink {
    pub fn new(catalog: Arc<Catalog>, endpoint: CatalogEndpoint) -> Self {
        Self {
            catalog,
            endpoint: Some(endpoint),
            peer_lost: AtomicBool::new(false),
        }
    }

    /// A link with no ingestion side attached
    pub fn detached(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            endpoint: None,
            peer_lost: AtomicBool::new(true),
        }
    }

    /// Scoped catalog access after applying everything the ingestion side sent
    pub async fn access<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut CatalogState) -> R,
    {
        self.catalog
            .access(|state| {
                self.pump(state);
                f(state)
            })
            .await
    }

    /// Merge pending updates; returns how many were applied
    fn pump(&self, state: &mut CatalogState) -> usize {
        let Some(endpoint) = &self.endpoint else {
            return 0;
        };
        if self.peer_lost.load(Ordering::SeqCst) {
            return 0;
        }

        let updates = endpoint.drain();
        let applied = updates.len();

        for path in merge_batch(state, updates) {
            debug!("Requesting deletion of {:?}", path);
            if endpoint.send(IngestNotice::DeletePath { path }).is_err() {
                break;
            }
        }

        if !endpoint.is_alive() && !self.peer_lost.swap(true, Ordering::SeqCst) {
            warn!("Ingestion side disconnected; serving the catalog as it stands");
        }

        applied
    }
}

/// Merge a batch of updates and return the files it made obsolete.
///
/// A later update in the batch can bring a path back to life, so the result
/// is checked against the entries live once the whole batch is in.
fn merge_batch(state: &mut CatalogState, updates: Vec<CatalogUpdate>) -> Vec<PathBuf> {
    let mut obsolete: Vec<PathBuf> = Vec::new();
    for update in updates {
        for path in state.merge(ContentSource::from(update)) {
            if !obsolete.contains(&path) {
                obsolete.push(path);
            }
        }
    }
    obsolete.retain(|path| !state.entries().iter().any(|e| &e.path == path));
    obsolete
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kura_protocol::{pair, Action, ActionSpec, Content, ContentKind};
    use std::time::Duration;

    fn upsert(name: &str, file: &str, secs: i64) -> CatalogUpdate {
        CatalogUpdate::ContentUpsert {
            path: PathBuf::from(format!("/c/{}", file)),
            original_path: PathBuf::from(format!("/c/.staging-{}", file)),
            content: Content {
                id: format!("id-{}", name),
                author: None,
                name: name.to_string(),
                display_name: None,
                short_description: None,
                description: None,
                thumbnail: None,
                content_type: ContentKind::Native,
                supported_platforms: vec![],
                action: ActionSpec::Single(Action {
                    path: "run".to_string(),
                }),
                last_modified: chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now),
            },
        }
    }

    async fn wait_for_len(link: &CatalogLink, want: usize) -> usize {
        let mut len = 0;
        for _ in 0..200 {
            len = link.access(|state| state.len()).await;
            if len == want {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        len
    }

    #[tokio::test]
    async fn test_access_pulls_pending_updates() {
        let (ingest, catalog_end) = pair();
        let link = CatalogLink::new(Arc::new(Catalog::new()), catalog_end);

        ingest.send(upsert("x", "x-1.zip", 1)).unwrap();
        assert_eq!(wait_for_len(&link, 1).await, 1);
    }

    #[tokio::test]
    async fn test_superseded_file_is_sent_back() {
        let (ingest, catalog_end) = pair();
        let link = CatalogLink::new(Arc::new(Catalog::new()), catalog_end);

        ingest.send(upsert("x", "x-1.zip", 1)).unwrap();
        ingest.send(upsert("x", "x-2.zip", 2)).unwrap();

        let mut notices = Vec::new();
        for _ in 0..200 {
            link.access(|_| ()).await;
            notices.extend(ingest.drain());
            if !notices.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(
            notices,
            vec![IngestNotice::DeletePath {
                path: PathBuf::from("/c/x-1.zip")
            }]
        );
        assert_eq!(link.access(|state| state.len()).await, 1);
    }

    #[tokio::test]
    async fn test_lost_peer_leaves_catalog_usable() {
        let (ingest, catalog_end) = pair();
        let link = CatalogLink::new(Arc::new(Catalog::new()), catalog_end);

        ingest.send(upsert("x", "x-1.zip", 1)).unwrap();
        assert_eq!(wait_for_len(&link, 1).await, 1);
        drop(ingest);

        for _ in 0..200 {
            link.access(|_| ()).await;
            if link.peer_lost.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(link.peer_lost.load(Ordering::SeqCst));
        assert_eq!(link.access(|state| state.len()).await, 1);
    }

    #[test]
    fn test_path_revived_within_batch_is_not_deleted() {
        let mut state = CatalogState::default();
        state.merge(upsert("x", "x-1.zip", 1).into());

        // The package went away and came back before the catalog looked
        let gone = CatalogUpdate::ContentRemoval {
            path: None,
            original_path: PathBuf::from("/c/.staging-x-1.zip"),
        };
        let back = upsert("x", "x-1.zip", 1);

        assert!(merge_batch(&mut state, vec![gone, back]).is_empty());
        assert_eq!(state.len(), 1);
        assert_eq!(state.entries()[0].path, PathBuf::from("/c/x-1.zip"));
    }

    #[test]
    fn test_batch_reports_each_obsolete_path_once() {
        let mut state = CatalogState::default();
        let obsolete = merge_batch(
            &mut state,
            vec![
                upsert("x", "x-1.zip", 1),
                upsert("x", "x-2.zip", 2),
                upsert("x", "x-3.zip", 3),
            ],
        );
        assert_eq!(obsolete, vec![PathBuf::from("/c/x-1.zip"), PathBuf::from("/c/x-2.zip")]);
    }

    #[tokio::test]
    async fn test_detached_link_is_plain_access() {
        let link = CatalogLink::detached(Arc::new(Catalog::new()));
        assert_eq!(link.access(|state| state.len()).await, 0);
    }
}
