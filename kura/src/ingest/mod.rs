//! Package Ingestor
//!
//! Turns settled filesystem changes into catalog updates: stages the package
//! in the content directory, validates its manifest, resolves its identity,
//! moves it to its canonical name and sends the result to the catalog side.
//! Delete notices coming back from the catalog are applied here as well.

pub mod manifest;
pub mod package;

pub use manifest::Manifest;
pub use package::{read_asset, read_manifest};

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use kura_protocol::{CatalogUpdate, ContentSource, IngestEndpoint, IngestNotice};

use crate::common::paths::{
    canonical_path, is_canonical_for, is_direct_child, is_staging_file, staging_path,
};
use crate::registry::IdentifierRegistry;
use crate::settle::{SettleHandler, SettledChange};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Package has no manifest.json")]
    MissingManifest,

    #[error("Manifest too large ({0} bytes, max 1MB)")]
    ManifestTooLarge(u64),

    #[error("Failed to parse manifest: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),
}

pub struct Ingestor {
    content_dir: PathBuf,
    registry: Arc<IdentifierRegistry>,
    endpoint: IngestEndpoint,
    /// Serializes staging, identity resolution and sends
    lock: Mutex<()>,
    peer_lost: AtomicBool,
}

impl Ingestor {
    pub fn new(content_dir: PathBuf, registry: Arc<IdentifierRegistry>, endpoint: IngestEndpoint) -> Self {
        Self {
            content_dir,
            registry,
            endpoint,
            lock: Mutex::new(()),
            peer_lost: AtomicBool::new(false),
        }
    }

    /// Process one settled change and return the sources sent to the catalog
    pub fn ingest(&self, change: &SettledChange) -> Vec<ContentSource> {
        let _guard = match self.lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut sent = Vec::new();

        if let Some(current) = &change.current {
            match self.stage(current, change.settled_at) {
                Ok(source) => {
                    self.send(source.clone());
                    sent.push(source);
                }
                Err(e) => warn!("Skipping {:?}: {}", current, e),
            }
        }

        if let Some(previous) = &change.previous {
            if change.current.as_ref() != Some(previous) {
                let source = ContentSource::removal(staging_path(&self.content_dir, previous));
                debug!("Signalling removal of {:?}", previous);
                self.send(source.clone());
                sent.push(source);
            }
        }

        self.drain_deletes_locked();
        sent
    }

    /// Apply delete notices the catalog has sent back so far
    pub fn drain_deletes(&self) -> usize {
        let _guard = match self.lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.drain_deletes_locked()
    }

    fn drain_deletes_locked(&self) -> usize {
        let mut deleted = 0;

        for notice in self.endpoint.drain() {
            let IngestNotice::DeletePath { path } = notice;

            if !is_direct_child(&self.content_dir, &path) {
                warn!("Refusing to delete {:?}: outside {:?}", path, self.content_dir);
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => {
                    info!("Deleted superseded package {:?}", path);
                    deleted += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("Superseded package already gone: {:?}", path);
                }
                Err(e) => warn!("Failed to delete {:?}: {}", path, e),
            }
        }

        self.note_peer_state();
        deleted
    }

    /// Copy into staging, validate, resolve identity, canonicalize
    fn stage(&self, source: &Path, settled_at: DateTime<Utc>) -> Result<ContentSource, IngestError> {
        let staging = staging_path(&self.content_dir, source);
        fs::copy(source, &staging)?;

        let manifest = match read_manifest(&staging) {
            Ok(manifest) => manifest,
            Err(e) => {
                discard(&staging);
                return Err(e);
            }
        };

        let id = self.registry.resolve(&manifest.name);
        let canonical = canonical_path(&self.content_dir, &id, settled_at);
        if let Err(e) = fs::rename(&staging, &canonical) {
            discard(&staging);
            return Err(e.into());
        }

        info!("Ingested '{}' from {:?} as {:?}", manifest.name, source, canonical);
        let content = manifest.into_content(id, settled_at);
        Ok(ContentSource::upsert(canonical, staging, content))
    }

    fn send(&self, source: ContentSource) {
        if self.endpoint.send(CatalogUpdate::from(source)).is_err() {
            self.note_peer_state();
        }
    }

    fn note_peer_state(&self) {
        if !self.endpoint.is_alive() && !self.peer_lost.swap(true, Ordering::SeqCst) {
            warn!("Catalog side disconnected; updates are no longer delivered");
        }
    }
}

impl SettleHandler for Ingestor {
    fn settled(&self, change: SettledChange) {
        self.ingest(&change);
    }

    fn drain(&self) {
        self.drain_deletes();
    }
}

/// Remove what a previous run left in `content_dir`: staging copies and the
/// canonical packages of registered identifiers. The catalog starts empty and
/// the startup scan re-ingests every package under a fresh name, so none of
/// them can be live. Files kura does not recognise are left alone.
pub fn sweep_stale(content_dir: &Path, registry: &IdentifierRegistry) -> usize {
    let entries = match fs::read_dir(content_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot sweep {:?}: {}", content_dir, e);
            return 0;
        }
    };

    let ids = registry.ids();
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let stale = is_staging_file(&path) || ids.iter().any(|id| is_canonical_for(&path, id));
        if !stale {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Swept {:?}", path);
                removed += 1;
            }
            Err(e) => warn!("Failed to sweep {:?}: {}", path, e),
        }
    }

    if removed > 0 {
        info!("Swept {} files left by a previous run", removed);
    }
    removed
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            warn!("Failed to remove staging copy {:?}: {}", path, e);
        }
    }
}
