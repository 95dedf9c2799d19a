use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};

use super::layout::GameDir;
use super::manifest::VersionCatalog;
use super::version_file::VersionJson;

/// Makes sure the base game manifest (and optionally its client jar) is on disk.
#[derive(Debug, Clone)]
pub struct VersionBootstrapper {
    downloader: Downloader,
}

impl VersionBootstrapper {
    pub fn new(downloader: Downloader) -> Self {
        Self { downloader }
    }

    /// Idempotent. Failures are logged and swallowed; a still-missing manifest
    /// is dealt with by whoever reads it next.
    #[instrument(skip(self, game))]
    pub async fn ensure_base(&self, version_id: &str, game: &GameDir, fetch_client: bool) {
        if let Err(err) = self.try_ensure_base(version_id, game, fetch_client).await {
            warn!("Could not bootstrap base version {}: {}", version_id, err);
        }
    }

    async fn try_ensure_base(
        &self,
        version_id: &str,
        game: &GameDir,
        fetch_client: bool,
    ) -> LauncherResult<()> {
        let manifest_path = game.version_json(version_id);
        if manifest_path.exists() {
            debug!("Base manifest {} already present", version_id);
            return Ok(());
        }

        let catalog = VersionCatalog::load_or_fetch(&game.catalog_path(), &self.downloader).await?;
        let entry = catalog.find(version_id).ok_or_else(|| {
            LauncherError::Other(format!("Version {version_id} is not in the version catalog"))
        })?;

        info!("Downloading manifest for {}", version_id);
        let raw = self.downloader.get_text(&entry.url).await?;
        let document: Value = serde_json::from_str(&raw)?;

        let version_dir = game.version_dir(version_id);
        tokio::fs::create_dir_all(&version_dir)
            .await
            .map_err(|e| LauncherError::from(e).at_path(&version_dir))?;
        tokio::fs::write(&manifest_path, &raw)
            .await
            .map_err(|e| LauncherError::from(e).at_path(&manifest_path))?;

        if !fetch_client {
            return Ok(());
        }

        let manifest = VersionJson::from_value(document)?;
        match manifest.downloads.and_then(|d| d.client) {
            Some(client) => {
                self.downloader
                    .download_file(
                        &client.url,
                        &game.version_jar(version_id),
                        client.sha1.as_deref(),
                    )
                    .await?;
                info!("Downloaded client jar for {}", version_id);
            }
            None => warn!("Manifest {} declares no client download", version_id),
        }

        Ok(())
    }
}
