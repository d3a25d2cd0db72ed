//! Package Reader
//!
//! Opens zip packages, extracts and validates the manifest, and reads
//! individual assets on demand.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

use super::manifest::{Manifest, MANIFEST_ENTRY, MAX_MANIFEST_BYTES};
use super::IngestError;

/// Read and validate the manifest of the package at `path`
pub fn read_manifest(path: &Path) -> Result<Manifest, IngestError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;

    let entry = match archive.by_name(MANIFEST_ENTRY) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Err(IngestError::MissingManifest),
        Err(e) => return Err(e.into()),
    };

    if entry.size() > MAX_MANIFEST_BYTES {
        return Err(IngestError::ManifestTooLarge(entry.size()));
    }

    let mut raw = Vec::with_capacity(entry.size() as usize);
    entry.take(MAX_MANIFEST_BYTES + 1).read_to_end(&mut raw)?;
    if raw.len() as u64 > MAX_MANIFEST_BYTES {
        return Err(IngestError::ManifestTooLarge(raw.len() as u64));
    }

    let manifest: Manifest = serde_json::from_slice(&raw)?;
    manifest.validate().map_err(IngestError::InvalidManifest)?;

    debug!("Read manifest '{}' from {:?}", manifest.name, path);
    Ok(manifest)
}

/// Read one entry (e.g. the thumbnail) out of a package.
///
/// Returns `Ok(None)` when the package has no such entry.
pub fn read_asset(path: &Path, entry_name: &str) -> Result<Option<Vec<u8>>, IngestError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;

    let name = entry_name.trim_start_matches("./").trim_start_matches('/');
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut data = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut data)?;
    Ok(Some(data))
}
