//! Package Manifest
//!
//! The `manifest.json` document at the root of every package.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kura_protocol::{ActionSpec, Content, ContentKind, Platform};

/// Entry name of the manifest inside a package
pub const MANIFEST_ENTRY: &str = "manifest.json";

/// Largest manifest accepted (1MB)
pub const MAX_MANIFEST_BYTES: u64 = 1_000_000;

/// Package manifest as authored. Any `id` or `last_modified` the author put
/// in is ignored: identity comes from the registry, time from the settle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub author: Option<String>,
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub content_type: ContentKind,
    pub supported_platforms: Vec<Platform>,
    pub action: ActionSpec,
}

impl Manifest {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Manifest name cannot be empty".to_string());
        }

        if let ActionSpec::PerPlatform(actions) = &self.action {
            if actions.is_empty() {
                return Err("Per-platform action map cannot be empty".to_string());
            }
            for platform in &self.supported_platforms {
                if !actions.contains_key(platform) {
                    return Err(format!("Missing action for supported platform: {}", platform));
                }
            }
        }

        Ok(())
    }

    /// Catalog record for this manifest under `id`, settled at `last_modified`
    pub fn into_content(self, id: String, last_modified: DateTime<Utc>) -> Content {
        Content {
            id,
            author: self.author,
            name: self.name,
            display_name: self.display_name,
            short_description: self.short_description,
            description: self.description,
            thumbnail: self.thumbnail,
            content_type: self.content_type,
            supported_platforms: self.supported_platforms,
            action: self.action,
            last_modified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_manifest_ignores_authored_identity() {
        let manifest: Manifest = serde_json::from_value(json!({
            "id": "author-chosen",
            "name": "x",
            "content_type": "native",
            "supported_platforms": [],
            "action": {"path": "run.exe"},
            "last_modified": "1999-01-01T00:00:00Z"
        }))
        .unwrap();
        manifest.validate().unwrap();

        let at = Utc::now();
        let content = manifest.into_content("real-id".to_string(), at);
        assert_eq!(content.id, "real-id");
        assert_eq!(content.last_modified, at);
    }

    #[test]
    fn test_blank_name_rejected() {
        let manifest: Manifest = serde_json::from_value(json!({
            "name": "  ",
            "content_type": "media",
            "supported_platforms": [],
            "action": {"path": "a.mp4"}
        }))
        .unwrap();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_per_platform_action_must_cover_supported_platforms() {
        let manifest: Manifest = serde_json::from_value(json!({
            "name": "tool",
            "content_type": "native",
            "supported_platforms": ["windows", "linux"],
            "action": {"windows": {"path": "tool.exe"}}
        }))
        .unwrap();
        let err = manifest.validate().unwrap_err();
        assert!(err.contains("linux"));
    }

    #[test]
    fn test_missing_required_field_fails_to_parse() {
        let parsed = serde_json::from_value::<Manifest>(json!({
            "name": "x",
            "supported_platforms": [],
            "action": {"path": "run"}
        }));
        assert!(parsed.is_err());
    }
}
