// ─── Version Catalog ───
// Resolves game version ids to manifest URLs from the cached catalog document.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};

pub const VERSION_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

/// A single entry in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionEntry {
    pub id: String,
    pub url: String,
    #[serde(rename = "type", default)]
    pub version_type: Option<String>,
    #[serde(rename = "releaseTime", default)]
    pub release_time: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
}

// The cached file is either the upstream `{versions: [...]}` document or a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogDocument {
    Wrapped { versions: Vec<VersionEntry> },
    Bare(Vec<VersionEntry>),
}

#[derive(Debug, Clone, Default)]
pub struct VersionCatalog {
    pub versions: Vec<VersionEntry>,
}

impl VersionCatalog {
    pub fn parse(raw: &str) -> LauncherResult<Self> {
        let versions = match serde_json::from_str::<CatalogDocument>(raw)? {
            CatalogDocument::Wrapped { versions } | CatalogDocument::Bare(versions) => versions,
        };
        Ok(Self { versions })
    }

    /// Read the cached catalog. `Ok(None)` when no cache exists yet.
    pub async fn load(path: &Path) -> LauncherResult<Option<Self>> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Ok(Some(Self::parse(&raw)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(LauncherError::from(err).at_path(path)),
        }
    }

    /// Use the cached catalog, fetching and caching the upstream one when absent.
    pub async fn load_or_fetch(path: &Path, downloader: &Downloader) -> LauncherResult<Self> {
        if let Some(cached) = Self::load(path).await? {
            debug!("Using cached version catalog ({} entries)", cached.versions.len());
            return Ok(cached);
        }

        info!("Fetching version catalog...");
        let raw = downloader.get_text(VERSION_MANIFEST_URL).await?;
        let catalog = Self::parse(&raw)?;

        if let Some(parent) = path.parent() {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                warn!("Could not create catalog cache dir {:?}: {}", parent, err);
            }
        }
        if let Err(err) = tokio::fs::write(path, raw).await {
            warn!("Could not cache version catalog at {:?}: {}", path, err);
        }

        info!("Loaded {} versions from catalog", catalog.versions.len());
        Ok(catalog)
    }

    /// Find a specific version entry by id (e.g. "1.20.4").
    pub fn find(&self, id: &str) -> Option<&VersionEntry> {
        self.versions.iter().find(|v| v.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_upstream_document() {
        let raw = r#"{
            "latest": {"release": "1.20.4", "snapshot": "24w14a"},
            "versions": [
                {"id": "1.20.4", "type": "release", "releaseTime": "2023-12-07T08:00:00+00:00",
                 "url": "https://example.com/1.20.4.json", "sha1": "abc123"},
                {"id": "24w14a", "type": "snapshot", "url": "https://example.com/24w14a.json"}
            ]
        }"#;
        let catalog = VersionCatalog::parse(raw).unwrap();
        let entry = catalog.find("1.20.4").unwrap();
        assert_eq!(entry.url, "https://example.com/1.20.4.json");
        assert_eq!(entry.release_time.as_deref(), Some("2023-12-07T08:00:00+00:00"));
    }

    #[test]
    fn parses_bare_array() {
        let raw = r#"[{"id": "1.16.5", "url": "https://example.com/1.16.5.json"}]"#;
        let catalog = VersionCatalog::parse(raw).unwrap();
        assert_eq!(catalog.find("1.16.5").unwrap().version_type, None);
        assert!(catalog.find("1.20.1").is_none());
    }

    #[tokio::test]
    async fn missing_cache_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = VersionCatalog::load(&dir.path().join("version_manifest.json"))
            .await
            .unwrap();
        assert!(loaded.is_none());
    }
}
