//! Path Utilities
//!
//! Naming rules for files kura owns inside the content directory.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Identifier map file name
pub const ID_MAP_FILE: &str = ".ids.json";

/// Backup copy of the identifier map
pub const ID_MAP_BACKUP_FILE: &str = ".ids.json.bak";

const STAGING_PREFIX: &str = ".staging-";

/// Hex characters of the per-ingestion tag in canonical names
const CANONICAL_TAG_LEN: usize = 12;

/// Default content directory (`<data dir>/kura/contents`)
pub fn default_content_dir() -> Result<PathBuf, String> {
    let data = dirs::data_local_dir().ok_or("Could not determine local data directory")?;
    Ok(data.join("kura").join("contents"))
}

/// True for files ending in `.zip`, any case
pub fn is_package_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

/// Where a source package is copied before it is validated.
///
/// Also the key removal signals use for that source, so it depends only on
/// the source file name.
pub fn staging_path(content_dir: &Path, source: &Path) -> PathBuf {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    content_dir.join(format!("{}{}", STAGING_PREFIX, name))
}

/// Final location of one ingestion of package `id`, settled at `settled_at`.
///
/// Every call yields a fresh name, so a delete notice for one ingestion can
/// never name another, even for identical bytes settled at the same time.
pub fn canonical_path(content_dir: &Path, id: &str, settled_at: DateTime<Utc>) -> PathBuf {
    let tag = Uuid::new_v4().simple().to_string();
    content_dir.join(format!(
        "{}-{}-{}.zip",
        id,
        settled_at.timestamp_millis(),
        &tag[..CANONICAL_TAG_LEN]
    ))
}

/// True for leftover staging copies
pub fn is_staging_file(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with(STAGING_PREFIX))
        .unwrap_or(false)
}

/// True when `path` is a canonical package of identifier `id`
pub fn is_canonical_for(path: &Path, id: &str) -> bool {
    if !is_package_file(path) {
        return false;
    }
    path.file_name()
        .map(|n| {
            let name = n.to_string_lossy();
            name.len() > id.len() + 1 && name.starts_with(id) && name[id.len()..].starts_with('-')
        })
        .unwrap_or(false)
}

/// True when `path` sits directly inside `dir`
pub fn is_direct_child(dir: &Path, path: &Path) -> bool {
    path.parent().map(|parent| parent == dir).unwrap_or(false)
}
