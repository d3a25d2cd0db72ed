//! Sync Messages
//!
//! Typed messages exchanged between the ingestion side and the catalog side.
//! Each message is one JSON object per line with a `type` tag.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::content::{Content, ContentSource};

/// Ingestion → catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CatalogUpdate {
    ContentUpsert {
        path: PathBuf,
        original_path: PathBuf,
        content: Content,
    },
    ContentRemoval {
        #[serde(default)]
        path: Option<PathBuf>,
        original_path: PathBuf,
    },
}

/// Catalog → ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestNotice {
    DeletePath { path: PathBuf },
}

impl From<CatalogUpdate> for ContentSource {
    fn from(update: CatalogUpdate) -> Self {
        match update {
            CatalogUpdate::ContentUpsert {
                path,
                original_path,
                content,
            } => ContentSource::upsert(path, original_path, content),
            CatalogUpdate::ContentRemoval {
                path,
                original_path,
            } => ContentSource {
                path,
                original_path,
                content: None,
            },
        }
    }
}

impl From<ContentSource> for CatalogUpdate {
    fn from(source: ContentSource) -> Self {
        match (source.path, source.content) {
            (Some(path), Some(content)) => CatalogUpdate::ContentUpsert {
                path,
                original_path: source.original_path,
                content,
            },
            // A record without a canonical path cannot be served, so it only
            // ever travels as a removal of whatever sits at original_path.
            (path, _) => CatalogUpdate::ContentRemoval {
                path,
                original_path: source.original_path,
            },
        }
    }
}
