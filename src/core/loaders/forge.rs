// ─── Heavyweight loader: Forge ───
// Forge profiles are produced by the official installer, run as a subprocess
// against the game root. The generated profile is then reconciled and the
// JVM flags Forge needs are injected into the launch config.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::launch::args::{
    ensure_jvm_arg_pair_present, merge_unique, modern_forge_jvm_arg_pairs,
    set_jvm_system_property, Placeholders,
};
use crate::core::launch::classpath::{get_classpath_separator, safe_path_str};
use crate::core::launch::EventSink;
use crate::core::maven::{MavenArtifact, FORGE_MAVEN};
use crate::core::version::{is_zero_byte_file, GameDir, MergeFlavor, VersionBootstrapper};

use super::context::{LoaderServices, PrepareContext};
use super::handler::{purge_corrupt_profile, reconcile_or_warn, LoaderHandler};

const PROMOTIONS_URL: &str =
    "https://files.minecraftforge.net/net/minecraftforge/forge/promotions_slim.json";

const LAUNCHER_PROFILES_STUB: &[u8] = br#"{"profiles":{},"selectedProfile":null}"#;

/// First Java major that understands `--add-opens`.
const MODULE_SYSTEM_JAVA: u32 = 9;

#[derive(Debug, Deserialize)]
struct Promotions {
    #[serde(default)]
    promos: HashMap<String, String>,
}

/// `{gameVersion}-forge-{loaderVersion}`, e.g. `1.20.1-forge-47.4.10`.
pub fn profile_id(game_version: &str, loader_version: &str) -> String {
    format!("{}-forge-{}", game_version, loader_version)
}

/// Recommended build first, latest otherwise.
fn pick_promoted(promos: &HashMap<String, String>, game_version: &str) -> Option<String> {
    ["recommended", "latest"]
        .iter()
        .find_map(|channel| promos.get(&format!("{game_version}-{channel}")))
        .cloned()
}

fn installer_artifact(game_version: &str, loader_version: &str) -> LauncherResult<MavenArtifact> {
    MavenArtifact::parse(&format!(
        "net.minecraftforge:forge:{}-{}:installer",
        game_version, loader_version
    ))
}

/// Installs Forge by downloading and executing the official installer JAR.
pub struct ForgeHandler {
    downloader: Downloader,
    bootstrapper: VersionBootstrapper,
}

impl ForgeHandler {
    pub fn new(services: LoaderServices) -> Self {
        Self {
            downloader: services.downloader,
            bootstrapper: services.bootstrapper,
        }
    }

    async fn resolve_loader_version(
        &self,
        game_version: &str,
        requested: Option<&str>,
    ) -> LauncherResult<String> {
        if let Some(version) = requested {
            return Ok(version.trim().to_string());
        }

        let promotions: Promotions = self
            .downloader
            .get_json(PROMOTIONS_URL)
            .await
            .map_err(|e| LauncherError::LoaderApi(format!("Forge promotions request failed: {e}")))?;
        pick_promoted(&promotions.promos, game_version).ok_or_else(|| {
            LauncherError::LoaderVersionUnavailable {
                loader: "forge".into(),
                game_version: game_version.into(),
            }
        })
    }

    /// Cached under `cache/installers/`; re-fetched when missing or empty.
    async fn ensure_installer(
        &self,
        game: &GameDir,
        game_version: &str,
        loader_version: &str,
    ) -> LauncherResult<PathBuf> {
        let artifact = installer_artifact(game_version, loader_version)?;
        let path = game.installers_dir().join(artifact.filename());
        if path.exists() && !is_zero_byte_file(&path) {
            debug!("Reusing cached installer {:?}", path);
            return Ok(path);
        }

        let url = artifact.url(FORGE_MAVEN);
        info!("Downloading Forge installer {}", url);
        self.downloader.download_file(&url, &path, None).await?;
        Ok(path)
    }

    async fn install(
        &self,
        config_java: &Path,
        game: &GameDir,
        game_version: &str,
        loader_version: &str,
        events: &EventSink,
    ) -> LauncherResult<()> {
        events.info(format!("Installing Forge {loader_version} for {game_version}"));
        let installer = self
            .ensure_installer(game, game_version, loader_version)
            .await?;
        ensure_launcher_profiles(game).await?;
        run_installer(config_java, &installer, game.root(), events).await
    }
}

/// The installer refuses to run without a launcher profile store in the root.
async fn ensure_launcher_profiles(game: &GameDir) -> LauncherResult<()> {
    let path = game.launcher_profiles();
    if path.exists() {
        return Ok(());
    }
    tokio::fs::create_dir_all(game.root())
        .await
        .map_err(|e| LauncherError::from(e).at_path(game.root()))?;
    tokio::fs::write(&path, LAUNCHER_PROFILES_STUB)
        .await
        .map_err(|e| LauncherError::from(e).at_path(&path))
}

/// `java -jar installer --installClient root`, awaited to completion.
/// Output is drained into debug events; only the exit code matters.
async fn run_installer(
    java: &Path,
    installer: &Path,
    root: &Path,
    events: &EventSink,
) -> LauncherResult<()> {
    let mut child = Command::new(java)
        .arg("-jar")
        .arg(installer)
        .arg("--installClient")
        .arg(root)
        .current_dir(root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            LauncherError::JavaExecution(format!("could not start installer with {java:?}: {e}"))
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (status, _, _) = tokio::join!(
        child.wait(),
        drain_lines(stdout, events),
        drain_lines(stderr, events)
    );
    let status = status.map_err(|e| LauncherError::JavaExecution(e.to_string()))?;

    if status.success() {
        info!("Forge installer finished");
        Ok(())
    } else {
        Err(LauncherError::InstallerFailed {
            code: status.code(),
        })
    }
}

async fn drain_lines<R: AsyncRead + Unpin>(reader: Option<R>, events: &EventSink) {
    let Some(reader) = reader else {
        return;
    };
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        events.debug(format!("[installer] {line}"));
    }
}

/// Resolve the tokens the launch step leaves alone in injected JVM arguments.
/// System properties that still hold an unknown token are dropped on their own.
fn resolve_profile_jvm_args(raw: &[String], game: &GameDir, id: &str) -> Vec<String> {
    let mut placeholders = Placeholders::new();
    placeholders
        .set("library_directory", safe_path_str(&game.libraries_dir()))
        .set("classpath_separator", get_classpath_separator())
        .set("version_name", id);
    raw.iter()
        .map(|arg| placeholders.resolve(arg))
        .filter(|arg| !arg.contains("${"))
        .collect()
}

#[async_trait]
impl LoaderHandler for ForgeHandler {
    fn name(&self) -> &'static str {
        "forge"
    }

    #[instrument(skip_all, fields(loader = "forge"))]
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
        events.info(format!("Using Forge {loader_version} for {game_version}"));

        self.bootstrapper.ensure_base(&game_version, &game, true).await;

        let id = profile_id(&game_version, &loader_version);
        purge_corrupt_profile(&game, &id, true, events).await;

        if !game.version_json(&id).exists() {
            self.install(&config.java_path, &game, &game_version, &loader_version, events)
                .await?;
            if !game.version_json(&id).exists() {
                return Err(LauncherError::Loader(format!(
                    "installer finished but {} was not created",
                    safe_path_str(&game.version_json(&id))
                )));
            }
        }

        let reconciled =
            reconcile_or_warn(&game, &id, &game_version, MergeFlavor::Heavyweight, events).await;

        if config.java_major >= MODULE_SYSTEM_JAVA {
            for (flag, value) in modern_forge_jvm_arg_pairs() {
                ensure_jvm_arg_pair_present(&mut config.jvm_args, flag, value);
            }
        }
        set_jvm_system_property(
            &mut config.jvm_args,
            "libraryDirectory",
            &safe_path_str(&game.libraries_dir()),
        );

        if let Some(profile) = reconciled.as_ref().and_then(|p| p.typed().ok()) {
            let resolved = resolve_profile_jvm_args(&profile.jvm_arguments(), &game, &id);
            merge_unique(&mut config.jvm_args, &resolved);
        }

        config.version.custom = Some(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::LaunchIdentity;
    use crate::core::launch::{GameVersion, LaunchConfig, LaunchOptions, LoaderKind, MemoryBounds};
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    fn sink() -> EventSink {
        let (tx, _rx) = mpsc::unbounded_channel();
        EventSink::new(tx)
    }

    #[test]
    fn composite_id_puts_game_version_first() {
        assert_eq!(profile_id("1.20.1", "47.4.10"), "1.20.1-forge-47.4.10");
    }

    #[test]
    fn installer_url_follows_maven_layout() {
        let artifact = installer_artifact("1.20.1", "47.4.10").unwrap();
        assert_eq!(
            artifact.url(FORGE_MAVEN),
            "https://maven.minecraftforge.net/net/minecraftforge/forge/1.20.1-47.4.10/forge-1.20.1-47.4.10-installer.jar"
        );
    }

    #[test]
    fn recommended_promotion_wins_over_latest() {
        let promotions: Promotions = serde_json::from_value(json!({
            "homepage": "https://files.minecraftforge.net/",
            "promos": {
                "1.20.1-latest": "47.4.10",
                "1.20.1-recommended": "47.4.0",
                "1.21-latest": "51.0.33"
            }
        }))
        .unwrap();

        assert_eq!(pick_promoted(&promotions.promos, "1.20.1").as_deref(), Some("47.4.0"));
        assert_eq!(pick_promoted(&promotions.promos, "1.21").as_deref(), Some("51.0.33"));
        assert_eq!(pick_promoted(&promotions.promos, "1.7.2"), None);
    }

    #[test]
    fn profile_jvm_tokens_are_resolved() {
        let game = GameDir::new("/games/mc");
        let resolved = resolve_profile_jvm_args(
            &[
                "-DignoreList=client-extra,${version_name}.jar".to_string(),
                "-DlibraryDirectory=${library_directory}".to_string(),
                "-Dunknown=${not_a_token}".to_string(),
            ],
            &game,
            "1.20.1-forge-47.4.10",
        );

        assert_eq!(
            resolved,
            vec![
                "-DignoreList=client-extra,1.20.1-forge-47.4.10.jar".to_string(),
                format!("-DlibraryDirectory={}", safe_path_str(&game.libraries_dir())),
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_installer_reports_its_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_installer(
            Path::new("false"),
            &dir.path().join("installer.jar"),
            dir.path(),
            &sink(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, LauncherError::InstallerFailed { code: Some(1) }));
    }

    #[tokio::test]
    async fn missing_java_is_an_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_installer(
            &dir.path().join("no-such-java"),
            &dir.path().join("installer.jar"),
            dir.path(),
            &sink(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, LauncherError::JavaExecution(_)));
    }

    #[tokio::test]
    async fn launcher_profiles_stub_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let game = GameDir::new(dir.path().join("root"));

        ensure_launcher_profiles(&game).await.unwrap();
        std::fs::write(game.launcher_profiles(), b"{\"profiles\":{\"x\":{}}}").unwrap();
        ensure_launcher_profiles(&game).await.unwrap();

        assert_eq!(
            std::fs::read(game.launcher_profiles()).unwrap(),
            b"{\"profiles\":{\"x\":{}}}"
        );
    }

    fn write_json(path: &Path, value: &Value) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn prepare_patches_installed_profile_and_jvm_flags() {
        let dir = tempfile::tempdir().unwrap();
        let game = GameDir::new(dir.path());
        write_json(
            &game.version_json("1.20.1"),
            &json!({
                "id": "1.20.1",
                "mainClass": "net.minecraft.client.main.Main",
                "downloads": {"client": {"url": "https://example.invalid/client.jar"}},
                "assetIndex": {"id": "5", "url": "https://example.invalid/5.json"},
                "libraries": [{"name": "com.mojang:brigadier:1.1.8"}],
                "arguments": {
                    "game": ["--username", "${auth_player_name}", "--version", "${version_name}"],
                    "jvm": ["-cp", "${classpath}"]
                }
            }),
        );
        let id = "1.20.1-forge-47.4.10";
        write_json(
            &game.version_json(id),
            &json!({
                "id": id,
                "inheritsFrom": "1.20.1",
                "mainClass": "cpw.mods.bootstraplauncher.BootstrapLauncher",
                "libraries": [{"name": "net.minecraftforge:fmlloader:1.20.1-47.4.10"}],
                "arguments": {
                    "game": ["--launchTarget", "forgeclient", "--version", "forge"],
                    "jvm": [
                        "-DignoreList=client-extra,${version_name}.jar",
                        "-DlibraryDirectory=${library_directory}"
                    ]
                }
            }),
        );

        let handler = ForgeHandler::new(LoaderServices::new(Downloader::new(
            reqwest::Client::new(),
        )));
        let mut options = LaunchOptions::new("1.20.1");
        options.loader = LoaderKind::Forge;
        options.loader_version = Some("47.4.10".into());
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
        let events = sink();

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

        let library_property = format!(
            "-DlibraryDirectory={}",
            safe_path_str(&game.libraries_dir())
        );
        assert_eq!(
            config.jvm_args.iter().filter(|a| **a == library_property).count(),
            1
        );
        assert!(config
            .jvm_args
            .windows(2)
            .any(|w| w[0] == "--add-opens" && w[1] == "java.base/java.lang=ALL-UNNAMED"));
        assert!(config
            .jvm_args
            .contains(&format!("-DignoreList=client-extra,{id}.jar")));
        assert_eq!(
            config.jvm_args.iter().filter(|a| *a == "--add-modules").count(),
            1
        );

        let patched: Value =
            serde_json::from_str(&std::fs::read_to_string(game.version_json(id)).unwrap()).unwrap();
        let game_args: Vec<&str> = patched["arguments"]["game"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(game_args.iter().filter(|a| **a == "--version").count(), 1);
        let version_at = game_args.iter().position(|a| *a == "--version").unwrap();
        assert_eq!(game_args[version_at + 1], "forge");
        for flag in ["--gameDir", "--accessToken", "--username", "--uuid"] {
            assert!(game_args.contains(&flag), "missing {flag}");
        }
    }

    #[tokio::test]
    async fn java_8_gets_no_module_flags() {
        let dir = tempfile::tempdir().unwrap();
        let game = GameDir::new(dir.path());
        write_json(&game.version_json("1.12.2"), &json!({"id": "1.12.2", "mainClass": "net.minecraft.client.main.Main"}));
        let id = profile_id("1.12.2", "14.23.5.2860");
        write_json(
            &game.version_json(&id),
            &json!({"id": id, "inheritsFrom": "1.12.2", "mainClass": "net.minecraft.launchwrapper.Launch"}),
        );

        let handler = ForgeHandler::new(LoaderServices::new(Downloader::new(
            reqwest::Client::new(),
        )));
        let mut options = LaunchOptions::new("1.12.2");
        options.loader = LoaderKind::Forge;
        options.loader_version = Some("14.23.5.2860".into());
        let mut config = LaunchConfig {
            game: game.clone(),
            identity: LaunchIdentity::default(),
            version: GameVersion {
                number: "1.12.2".into(),
                custom: None,
            },
            memory: MemoryBounds::default(),
            java_path: "java".into(),
            java_major: 8,
            jvm_args: Vec::new(),
            game_args: Vec::new(),
            window: None,
        };
        let events = sink();

        handler
            .prepare(PrepareContext {
                options: &options,
                config: &mut config,
                events: &events,
            })
            .await
            .unwrap();

        assert!(!config.jvm_args.iter().any(|a| a.starts_with("--add-")));
        assert!(config.jvm_args.iter().any(|a| a.starts_with("-DlibraryDirectory=")));
    }
}
