//! Identifier Registry
//!
//! Durable name → identifier table. Identifiers are minted once per logical
//! package name and persisted as pretty JSON next to a backup copy.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::common::paths::{ID_MAP_BACKUP_FILE, ID_MAP_FILE};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

type IdMap = BTreeMap<String, String>;

pub struct IdentifierRegistry {
    primary: PathBuf,
    backup: PathBuf,
    /// Loaded on first use
    ids: Mutex<Option<IdMap>>,
}

impl IdentifierRegistry {
    /// Registry persisted inside `content_dir`
    pub fn new(content_dir: &Path) -> Self {
        Self::with_paths(content_dir.join(ID_MAP_FILE), content_dir.join(ID_MAP_BACKUP_FILE))
    }

    pub fn with_paths(primary: PathBuf, backup: PathBuf) -> Self {
        Self {
            primary,
            backup,
            ids: Mutex::new(None),
        }
    }

    /// Identifier for `name`, minting and persisting one if it is new
    pub fn resolve(&self, name: &str) -> String {
        let mut guard = self.lock();
        let ids = guard.get_or_insert_with(|| self.load());

        if let Some(id) = ids.get(name) {
            return id.clone();
        }

        let id = loop {
            let candidate = Uuid::new_v4().to_string();
            if !ids.values().any(|existing| existing == &candidate) {
                break candidate;
            }
        };
        ids.insert(name.to_string(), id.clone());
        info!("Assigned identifier {} to '{}'", id, name);

        if let Err(e) = self.persist(ids) {
            warn!(
                "Failed to persist identifier map {:?}, keeping it in memory: {}",
                self.primary, e
            );
        }

        id
    }

    /// Identifier for `name` without minting
    pub fn lookup(&self, name: &str) -> Option<String> {
        let mut guard = self.lock();
        guard.get_or_insert_with(|| self.load()).get(name).cloned()
    }

    /// Every identifier minted so far
    pub fn ids(&self) -> Vec<String> {
        let mut guard = self.lock();
        guard.get_or_insert_with(|| self.load()).values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let mut guard = self.lock();
        guard.get_or_insert_with(|| self.load()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<IdMap>> {
        // The map is only ever replaced wholesale, so a poisoned guard still holds a valid map
        match self.ids.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn load(&self) -> IdMap {
        match read_map(&self.primary) {
            Ok(ids) => {
                debug!("Loaded {} identifiers from {:?}", ids.len(), self.primary);
                return ids;
            }
            Err(e) => debug!("Primary identifier map unavailable ({:?}): {}", self.primary, e),
        }

        match read_map(&self.backup) {
            Ok(ids) => {
                warn!(
                    "Recovered {} identifiers from backup {:?}",
                    ids.len(),
                    self.backup
                );
                ids
            }
            Err(e) => {
                debug!("Backup identifier map unavailable ({:?}): {}", self.backup, e);
                info!("Starting with an empty identifier map");
                IdMap::new()
            }
        }
    }

    fn persist(&self, ids: &IdMap) -> Result<(), RegistryError> {
        if self.primary.exists() {
            if let Err(e) = fs::copy(&self.primary, &self.backup) {
                warn!("Failed to back up identifier map to {:?}: {}", self.backup, e);
            }
        }

        let json = serde_json::to_string_pretty(ids)?;
        fs::write(&self.primary, json)?;
        Ok(())
    }
}

fn read_map(path: &Path) -> Result<IdMap, RegistryError> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}
