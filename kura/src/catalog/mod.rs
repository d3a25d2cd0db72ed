//! Catalog
//!
//! The shared collection of live content entries and removal tombstones.
//! All reads and writes go through [`Catalog::access`], which runs a closure
//! while holding the catalog lock and releases it on every exit path.

mod state;

pub use state::{CatalogEntry, CatalogState, Changes};

use tokio::sync::Mutex;

pub struct Catalog {
    state: Mutex<CatalogState>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CatalogState::new()),
        }
    }

    /// Run `f` with exclusive access to the catalog.
    ///
    /// The closure is synchronous, so the lock can never be held across an
    /// await point or re-acquired from inside.
    pub async fn access<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut CatalogState) -> R,
    {
        let mut guard = self.state.lock().await;
        f(&mut guard)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kura_protocol::{Action, ActionSpec, Content, ContentKind, ContentSource};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn source(name: &str, n: usize) -> ContentSource {
        ContentSource::upsert(
            PathBuf::from(format!("/c/{}-{}.zip", name, n)),
            PathBuf::from(format!("/c/.staging-{}-{}.zip", name, n)),
            Content {
                id: format!("id-{}", name),
                author: None,
                name: name.to_string(),
                display_name: None,
                short_description: None,
                description: None,
                thumbnail: None,
                content_type: ContentKind::Media,
                supported_platforms: vec![],
                action: ActionSpec::Single(Action {
                    path: "index.html".to_string(),
                }),
                last_modified: Utc::now(),
            },
        )
    }

    #[tokio::test]
    async fn test_access_returns_closure_result() {
        let catalog = Catalog::new();
        let obsolete = catalog.access(|state| state.merge(source("x", 0))).await;
        assert!(obsolete.is_empty());
        assert_eq!(catalog.access(|state| state.len()).await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_merges_keep_one_entry_per_name() {
        let catalog = Arc::new(Catalog::new());

        let mut handles = Vec::new();
        for n in 0..16 {
            let catalog = Arc::clone(&catalog);
            handles.push(tokio::spawn(async move {
                catalog.access(|state| state.merge(source("same", n))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(catalog.access(|state| state.len()).await, 1);
    }
}
