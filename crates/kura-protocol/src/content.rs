//! Content Types
//!
//! Catalog records shared by the ingestion side and the catalog side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Platforms a package can declare support for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Macos,
    Linux,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Macos => "macos",
            Platform::Linux => "linux",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of thing a package delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Installable application
    Native,
    /// Online content opened in a browser
    #[serde(alias = "web")]
    Webapp,
    /// Media, artwork, music, video
    Media,
}

/// A single launch action: a URL or a path relative to the package root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub path: String,
}

/// Either one action for every platform or one per platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionSpec {
    Single(Action),
    PerPlatform(BTreeMap<Platform, Action>),
}

/// Catalog record for one logical package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub id: String,
    #[serde(default)]
    pub author: Option<String>,
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Entry name of the thumbnail inside the package
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub content_type: ContentKind,
    /// Empty means every platform
    #[serde(default)]
    pub supported_platforms: Vec<Platform>,
    pub action: ActionSpec,
    pub last_modified: DateTime<Utc>,
}

impl Content {
    pub fn supports(&self, platform: Platform) -> bool {
        self.supported_platforms.is_empty() || self.supported_platforms.contains(&platform)
    }
}

/// A content record together with where it lives on disk.
///
/// `path` is the canonical package file, `original_path` the staging location
/// the package was copied to before canonicalization. A source without
/// `content` is a removal signal for whatever entry owns those paths.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentSource {
    pub path: Option<PathBuf>,
    pub original_path: PathBuf,
    pub content: Option<Content>,
}

impl ContentSource {
    pub fn upsert(path: PathBuf, original_path: PathBuf, content: Content) -> Self {
        Self {
            path: Some(path),
            original_path,
            content: Some(content),
        }
    }

    pub fn removal(original_path: PathBuf) -> Self {
        Self {
            path: None,
            original_path,
            content: None,
        }
    }
}

/// Marks an identifier as removed from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub id: String,
    pub removed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_action_parses() {
        let action: ActionSpec = serde_json::from_value(json!({"path": "bin/run.exe"})).unwrap();
        assert_eq!(
            action,
            ActionSpec::Single(Action {
                path: "bin/run.exe".to_string()
            })
        );
    }

    #[test]
    fn test_per_platform_action_parses() {
        let action: ActionSpec = serde_json::from_value(json!({
            "windows": {"path": "win/app.exe"},
            "macos": {"path": "mac/App.app"}
        }))
        .unwrap();

        match &action {
            ActionSpec::PerPlatform(map) => {
                assert_eq!(map.len(), 2);
                assert_eq!(map[&Platform::Windows].path, "win/app.exe");
                assert!(!map.contains_key(&Platform::Linux));
            }
            other => panic!("expected per-platform action, got {:?}", other),
        }
    }

    #[test]
    fn test_content_kind_accepts_web_alias() {
        let kind: ContentKind = serde_json::from_value(json!("web")).unwrap();
        assert_eq!(kind, ContentKind::Webapp);
        assert_eq!(serde_json::to_value(kind).unwrap(), json!("webapp"));
    }

    #[test]
    fn test_platform_display_matches_wire_name() {
        assert_eq!(Platform::Macos.to_string(), "macos");
        assert_eq!(serde_json::to_value(Platform::Macos).unwrap(), json!("macos"));
    }
}
