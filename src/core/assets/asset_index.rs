use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::core::downloader::{DownloadEntry, Downloader};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::version_file::AssetIndexInfo;
use crate::core::version::{is_zero_byte_file, GameDir};

const RESOURCES_URL: &str = "https://resources.download.minecraft.net";

/// Top-level asset index JSON structure.
#[derive(Debug, Deserialize)]
pub struct AssetIndex {
    pub objects: HashMap<String, AssetObject>,
}

#[derive(Debug, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,
}

impl AssetIndex {
    pub fn parse(raw: &str) -> LauncherResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Objects not yet present under `{assets}/objects/{hh}/{hash}`.
    pub fn missing_objects(&self, assets_dir: &Path) -> Vec<DownloadEntry> {
        let objects_dir = assets_dir.join("objects");
        let mut entries: Vec<DownloadEntry> = self
            .objects
            .values()
            .filter(|obj| obj.hash.len() > 2)
            .filter_map(|obj| {
                let prefix = &obj.hash[..2];
                let dest = objects_dir.join(prefix).join(&obj.hash);
                if dest.exists() && !is_zero_byte_file(&dest) {
                    return None;
                }
                Some(DownloadEntry {
                    url: format!("{}/{}/{}", RESOURCES_URL, prefix, obj.hash),
                    dest,
                    sha1: Some(obj.hash.clone()),
                })
            })
            .collect();
        // several names can share one object
        entries.sort_by(|a, b| a.dest.cmp(&b.dest));
        entries.dedup_by(|a, b| a.dest == b.dest);
        entries
    }
}

/// Load the cached index for `info`, fetching it first when absent.
pub async fn load_or_fetch_index(
    info: &AssetIndexInfo,
    game: &GameDir,
    downloader: &Downloader,
) -> LauncherResult<AssetIndex> {
    let index_path = game.asset_index(&info.id);
    if !index_path.exists() {
        info!("Downloading asset index {}", info.id);
        downloader
            .download_file(&info.url, &index_path, info.sha1.as_deref())
            .await?;
    }

    let raw = tokio::fs::read_to_string(&index_path)
        .await
        .map_err(|e| LauncherError::from(e).at_path(&index_path))?;
    AssetIndex::parse(&raw)
}

/// Fetch the index and every missing object. Returns how many objects were downloaded.
pub async fn ensure_assets<F>(
    info: &AssetIndexInfo,
    game: &GameDir,
    downloader: &Downloader,
    on_progress: F,
) -> LauncherResult<usize>
where
    F: Fn(usize, usize) + Sync,
{
    let index = load_or_fetch_index(info, game, downloader).await?;
    let entries = index.missing_objects(&game.assets_dir());
    let wanted = entries.len();
    info!(
        "Downloading {} asset objects ({} already cached)",
        wanted,
        index.objects.len().saturating_sub(wanted)
    );
    if wanted == 0 {
        return Ok(0);
    }

    let failures = downloader.download_batch(entries, on_progress).await;
    for (entry, err) in &failures {
        debug!("Asset {} failed: {}", entry.url, err);
    }
    if let Some((_, err)) = failures.into_iter().next() {
        warn!("Asset download incomplete for index {}", info.id);
        return Err(err);
    }
    Ok(wanted)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"{"objects": {
        "minecraft/sounds/a.ogg": {"hash": "aa11223344556677889900aabbccddeeff001122", "size": 3},
        "minecraft/sounds/b.ogg": {"hash": "bb11223344556677889900aabbccddeeff001122", "size": 4},
        "minecraft/sounds/c.ogg": {"hash": "bb11223344556677889900aabbccddeeff001122", "size": 4}
    }}"#;

    #[test]
    fn cached_objects_are_skipped_and_shared_hashes_fetched_once() {
        let dir = tempfile::tempdir().unwrap();
        let cached = dir
            .path()
            .join("objects/aa/aa11223344556677889900aabbccddeeff001122");
        std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
        std::fs::write(&cached, b"abc").unwrap();

        let index = AssetIndex::parse(INDEX).unwrap();
        let missing = index.missing_objects(dir.path());

        assert_eq!(missing.len(), 1);
        assert_eq!(
            missing[0].url,
            "https://resources.download.minecraft.net/bb/bb11223344556677889900aabbccddeeff001122"
        );
    }

    #[test]
    fn truncated_index_is_a_json_error() {
        let err = AssetIndex::parse(r#"{"objects": {"#).unwrap_err();
        assert!(matches!(err, LauncherError::Json(_)));
    }

    #[tokio::test]
    async fn cached_index_is_read_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let game = GameDir::new(dir.path());
        let path = game.asset_index("17");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, INDEX).unwrap();

        let info = AssetIndexInfo {
            id: "17".into(),
            url: "http://127.0.0.1:9/17.json".into(),
            sha1: None,
        };
        let downloader = Downloader::new(reqwest::Client::new());
        let index = load_or_fetch_index(&info, &game, &downloader).await.unwrap();
        assert_eq!(index.objects.len(), 3);
    }
}
