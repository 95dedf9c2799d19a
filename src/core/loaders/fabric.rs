// ─── Lightweight loaders ───
// Fabric and Quilt publish ready-made version profiles through a metadata
// service; preparing them is fetch + reconcile.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument};

use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::{GameDir, MergeFlavor, VersionBootstrapper};

use super::context::{LoaderServices, PrepareContext};
use super::handler::{purge_corrupt_profile, reconcile_or_warn, LoaderHandler};

const FABRIC_META_BASE: &str = "https://meta.fabricmc.net/v2";
const QUILT_META_BASE: &str = "https://meta.quiltmc.org/v3";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightweightFlavor {
    Fabric,
    Quilt,
}

impl LightweightFlavor {
    pub fn name(self) -> &'static str {
        match self {
            LightweightFlavor::Fabric => "fabric",
            LightweightFlavor::Quilt => "quilt",
        }
    }

    fn meta_base(self) -> &'static str {
        match self {
            LightweightFlavor::Fabric => FABRIC_META_BASE,
            LightweightFlavor::Quilt => QUILT_META_BASE,
        }
    }

    /// Prefix of the composite profile id, as the loader's own installer writes it.
    fn id_prefix(self) -> &'static str {
        match self {
            LightweightFlavor::Fabric => "fabric-loader",
            LightweightFlavor::Quilt => "quilt-loader",
        }
    }

    /// `{prefix}-{loaderVersion}-{gameVersion}`, e.g. `fabric-loader-0.15.7-1.20.1`.
    pub fn profile_id(self, loader_version: &str, game_version: &str) -> String {
        format!("{}-{}-{}", self.id_prefix(), loader_version, game_version)
    }

    fn builds_url(self, game_version: &str) -> String {
        format!("{}/versions/loader/{}", self.meta_base(), game_version)
    }

    fn profile_url(self, game_version: &str, loader_version: &str) -> String {
        format!(
            "{}/versions/loader/{}/{}/profile/json",
            self.meta_base(),
            game_version,
            loader_version
        )
    }
}

/// One entry of `/versions/loader/{gameVersion}`, newest first.
#[derive(Debug, Deserialize)]
struct LoaderBuild {
    loader: LoaderInfo,
}

#[derive(Debug, Deserialize)]
struct LoaderInfo {
    version: String,
}

pub struct LightweightHandler {
    flavor: LightweightFlavor,
    downloader: Downloader,
    bootstrapper: VersionBootstrapper,
}

impl LightweightHandler {
    pub fn new(flavor: LightweightFlavor, services: LoaderServices) -> Self {
        Self {
            flavor,
            downloader: services.downloader,
            bootstrapper: services.bootstrapper,
        }
    }

    pub fn flavor(&self) -> LightweightFlavor {
        self.flavor
    }

    async fn resolve_loader_version(
        &self,
        game_version: &str,
        requested: Option<&str>,
    ) -> LauncherResult<String> {
        if let Some(version) = requested {
            return Ok(version.trim().to_string());
        }

        let url = self.flavor.builds_url(game_version);
        let builds: Vec<LoaderBuild> = self.downloader.get_json(&url).await.map_err(|e| {
            LauncherError::LoaderApi(format!("{} metadata request failed: {}", self.flavor.name(), e))
        })?;
        latest_build(builds).ok_or_else(|| LauncherError::LoaderVersionUnavailable {
            loader: self.flavor.name().into(),
            game_version: game_version.into(),
        })
    }

    async fn fetch_profile(
        &self,
        game: &GameDir,
        id: &str,
        game_version: &str,
        loader_version: &str,
    ) -> LauncherResult<()> {
        let url = self.flavor.profile_url(game_version, loader_version);
        let raw = self.downloader.get_text(&url).await.map_err(|e| {
            LauncherError::LoaderApi(format!("{} profile request failed: {}", self.flavor.name(), e))
        })?;
        let document: Value = serde_json::from_str(&raw)?;
        if document.get("mainClass").and_then(Value::as_str).is_none() {
            return Err(LauncherError::LoaderApi(format!(
                "{} profile {} has no mainClass",
                self.flavor.name(),
                id
            )));
        }

        let dir = game.version_dir(id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| LauncherError::from(e).at_path(&dir))?;
        let path = game.version_json(id);
        tokio::fs::write(&path, raw)
            .await
            .map_err(|e| LauncherError::from(e).at_path(&path))?;
        info!("Stored {} profile {}", self.flavor.name(), id);
        Ok(())
    }
}

fn latest_build(builds: Vec<LoaderBuild>) -> Option<String> {
    builds.into_iter().next().map(|build| build.loader.version)
}

#[async_trait]
impl LoaderHandler for LightweightHandler {
    fn name(&self) -> &'static str {
        self.flavor.name()
    }

    #[instrument(skip_all, fields(loader = self.flavor.name()))]
    async fn prepare(&self, ctx: PrepareContext<'_>) -> LauncherResult<()> {
        let PrepareContext {
            options,
            config,
            events,
        } = ctx;
        let game = config.game.clone();
        let game_version = config.version.number.clone();

        let loader_version = self
            .resolve_loader_version(&game_version, options.loader_version.as_deref())
            .await?;
        events.info(format!(
            "Using {} {} for {}",
            self.flavor.name(),
            loader_version,
            game_version
        ));

        self.bootstrapper.ensure_base(&game_version, &game, false).await;

        let id = self.flavor.profile_id(&loader_version, &game_version);
        purge_corrupt_profile(&game, &id, false, events).await;

        if !game.version_json(&id).exists() {
            self.fetch_profile(&game, &id, &game_version, &loader_version)
                .await?;
        }

        reconcile_or_warn(&game, &id, &game_version, MergeFlavor::Lightweight, events).await;

        config.version.custom = Some(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::LaunchIdentity;
    use crate::core::launch::{
        EventSink, GameVersion, LaunchConfig, LaunchOptions, LoaderKind, MemoryBounds,
    };
    use serde_json::json;
    use tokio::sync::mpsc;

    #[test]
    fn composite_ids_follow_each_ecosystem() {
        assert_eq!(
            LightweightFlavor::Fabric.profile_id("0.15.7", "1.20.1"),
            "fabric-loader-0.15.7-1.20.1"
        );
        assert_eq!(
            LightweightFlavor::Quilt.profile_id("0.21.0", "1.20.1"),
            "quilt-loader-0.21.0-1.20.1"
        );
    }

    #[test]
    fn metadata_urls() {
        assert_eq!(
            LightweightFlavor::Fabric.builds_url("1.20.1"),
            "https://meta.fabricmc.net/v2/versions/loader/1.20.1"
        );
        assert_eq!(
            LightweightFlavor::Quilt.profile_url("1.20.1", "0.21.0"),
            "https://meta.quiltmc.org/v3/versions/loader/1.20.1/0.21.0/profile/json"
        );
    }

    #[test]
    fn newest_build_comes_first() {
        let builds: Vec<LoaderBuild> = serde_json::from_value(json!([
            {"loader": {"version": "0.15.7", "stable": true}, "intermediary": {}},
            {"loader": {"version": "0.15.6", "stable": true}, "intermediary": {}}
        ]))
        .unwrap();
        assert_eq!(latest_build(builds).as_deref(), Some("0.15.7"));
        assert_eq!(latest_build(Vec::new()), None);
    }

    fn write_json(path: &std::path::Path, value: &Value) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn prepare_reconciles_cached_profile_once() {
        let dir = tempfile::tempdir().unwrap();
        let game = GameDir::new(dir.path());
        write_json(
            &game.version_json("1.20.1"),
            &json!({
                "id": "1.20.1",
                "mainClass": "net.minecraft.client.main.Main",
                "downloads": {"client": {"url": "https://example.invalid/client.jar", "sha1": "aa"}},
                "assetIndex": {"id": "5", "url": "https://example.invalid/5.json"},
                "assets": "5",
                "libraries": [{"name": "com.mojang:brigadier:1.1.8"}, {"name": "com.mojang:datafixerupper:6.0.8"}],
                "arguments": {"game": ["--username", "${auth_player_name}"], "jvm": ["-cp", "${classpath}"]}
            }),
        );
        let id = "fabric-loader-0.15.7-1.20.1";
        write_json(
            &game.version_json(id),
            &json!({
                "id": id,
                "inheritsFrom": "1.20.1",
                "mainClass": "net.fabricmc.loader.impl.launch.knot.KnotClient",
                "libraries": [{"name": "net.fabricmc:fabric-loader:0.15.7", "url": "https://maven.fabricmc.net/"}],
                "arguments": {"game": [], "jvm": ["-DFabricMcEmu= net.minecraft.client.main.Main "]}
            }),
        );

        let handler = LightweightHandler::new(
            LightweightFlavor::Fabric,
            LoaderServices::new(Downloader::new(reqwest::Client::new())),
        );
        let mut options = LaunchOptions::new("1.20.1");
        options.loader = LoaderKind::Fabric;
        options.loader_version = Some("0.15.7".into());
        let mut config = LaunchConfig {
            game: game.clone(),
            identity: LaunchIdentity::default(),
            version: GameVersion {
                number: "1.20.1".into(),
                custom: None,
            },
            memory: MemoryBounds::default(),
            java_path: "java".into(),
            java_major: 17,
            jvm_args: Vec::new(),
            game_args: Vec::new(),
            window: None,
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let events = EventSink::new(tx);

        for _ in 0..2 {
            handler
                .prepare(PrepareContext {
                    options: &options,
                    config: &mut config,
                    events: &events,
                })
                .await
                .unwrap();
        }

        assert_eq!(config.version.custom.as_deref(), Some(id));
        let patched: Value =
            serde_json::from_str(&std::fs::read_to_string(game.version_json(id)).unwrap()).unwrap();
        assert_eq!(patched["libraries"].as_array().unwrap().len(), 3);
        assert_eq!(patched["assetIndex"]["id"], "5");
        assert_eq!(
            patched["downloads"]["client"]["url"],
            "https://example.invalid/client.jar"
        );
        assert_eq!(patched["arguments"]["game"], json!(["--username", "${auth_player_name}"]));
    }
}
