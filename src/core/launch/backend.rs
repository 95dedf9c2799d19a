// ─── Launch Backend ───
// Takes a fully prepared LaunchConfig and starts the game.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, instrument};

use crate::core::assets::ensure_assets;
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::{
    is_zero_byte_file, resolve_with_inheritance, VersionBootstrapper, VersionJson,
};

use super::args::{
    append_env_path, format_command_for_logs, merge_unique, sanitize_numeric_window_args,
    strip_classpath_switches, substitute_args, Placeholders,
};
use super::classpath::{build_classpath, extract_natives, get_classpath_separator, safe_path_str, LibraryPlan};
use super::options::LaunchConfig;
use super::process::GameProcess;

const LAUNCHER_NAME: &str = "blocklaunch";

/// Raw output of a backend, normalized by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Diagnostic text; scanned for known failure signatures.
    Debug(String),
    /// Game stdout.
    Data(String),
    Progress {
        task: String,
        total: u64,
        percent: f64,
    },
}

/// Whatever turns a resolved configuration into a running game.
///
/// `Ok(None)` means the backend finished without producing a process.
#[async_trait]
pub trait LaunchBackend: Send + Sync {
    async fn launch(
        &self,
        config: &LaunchConfig,
        events: UnboundedSender<BackendEvent>,
    ) -> LauncherResult<Option<GameProcess>>;
}

/// Downloads what the profile needs and spawns Java directly.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    downloader: Downloader,
    bootstrapper: VersionBootstrapper,
}

impl ProcessBackend {
    pub fn new(downloader: Downloader) -> Self {
        Self {
            bootstrapper: VersionBootstrapper::new(downloader.clone()),
            downloader,
        }
    }
}

#[async_trait]
impl LaunchBackend for ProcessBackend {
    #[instrument(skip_all, fields(version = %config.version.profile_id()))]
    async fn launch(
        &self,
        config: &LaunchConfig,
        events: UnboundedSender<BackendEvent>,
    ) -> LauncherResult<Option<GameProcess>> {
        let game = &config.game;
        let profile_id = config.version.profile_id().to_string();
        self.bootstrapper
            .ensure_base(&config.version.number, game, false)
            .await;
        let document = resolve_with_inheritance(game, &profile_id).await?;
        let version = VersionJson::from_value(document)?;
        if version.main_class.trim().is_empty() {
            return Err(LauncherError::Other(format!(
                "Version {profile_id} declares no mainClass"
            )));
        }

        // ── Client jar ──
        let jar_id = version
            .jar
            .clone()
            .unwrap_or_else(|| config.version.number.clone());
        let client_jar = game.version_jar(&jar_id);
        if !client_jar.exists() || is_zero_byte_file(&client_jar) {
            let client = version
                .downloads
                .as_ref()
                .and_then(|d| d.client.as_ref())
                .ok_or_else(|| {
                    LauncherError::Other(format!("No client jar for {jar_id} and no download declared"))
                })?;
            send(&events, BackendEvent::Debug(format!("Downloading client jar {jar_id}")));
            self.downloader
                .download_file(&client.url, &client_jar, client.sha1.as_deref())
                .await?;
        }

        // ── Libraries ──
        let libraries_dir = game.libraries_dir();
        let plan = LibraryPlan::for_version(&version, &libraries_dir);
        if !plan.downloads.is_empty() {
            let total = plan.downloads.len() as u64;
            let progress_tx = events.clone();
            let failures = self
                .downloader
                .download_batch(plan.downloads, |done, total| {
                    send(
                        &progress_tx,
                        BackendEvent::Progress {
                            task: "libraries".into(),
                            total: total as u64,
                            percent: done as f64 * 100.0 / total.max(1) as f64,
                        },
                    );
                })
                .await;
            for (entry, err) in &failures {
                send(&events, BackendEvent::Debug(format!("Library {} failed: {}", entry.url, err)));
            }
            if let Some((_, err)) = failures.into_iter().next() {
                return Err(err);
            }
            info!("Fetched {} libraries", total);
        }

        // ── Assets ──
        if let Some(index) = &version.asset_index {
            let progress_tx = events.clone();
            ensure_assets(index, game, &self.downloader, |done, total| {
                send(
                    &progress_tx,
                    BackendEvent::Progress {
                        task: "assets".into(),
                        total: total as u64,
                        percent: done as f64 * 100.0 / total.max(1) as f64,
                    },
                );
            })
            .await?;
        }

        // ── Natives & classpath ──
        let natives_dir = game.natives_dir(&profile_id);
        extract_natives(&plan.natives, &natives_dir).await?;
        let classpath = build_classpath(&plan.classpath, &client_jar);

        let placeholders = placeholders_for(config, &version, &profile_id, &classpath);
        let command_args = assemble_arguments(config, &version, &placeholders, &classpath);

        let java = config.java_path.to_string_lossy().to_string();
        info!("Launching {} with Java {}", profile_id, java);
        send(
            &events,
            BackendEvent::Debug(format!(
                "Command: {}",
                format_command_for_logs(&java, &command_args)
            )),
        );

        let native_path = safe_path_str(&natives_dir);
        let mut command = tokio::process::Command::new(&config.java_path);
        command
            .args(&command_args)
            .current_dir(game.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if cfg!(target_os = "windows") {
            command.env("PATH", append_env_path("PATH", &native_path));
        } else if cfg!(target_os = "macos") {
            command.env("DYLD_LIBRARY_PATH", append_env_path("DYLD_LIBRARY_PATH", &native_path));
        } else {
            command.env("LD_LIBRARY_PATH", append_env_path("LD_LIBRARY_PATH", &native_path));
        }

        let mut child = command
            .spawn()
            .map_err(|e| LauncherError::JavaExecution(format!("{}: {}", java, e)))?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, events.clone(), BackendEvent::Data));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, events.clone(), BackendEvent::Debug));
        }

        Ok(Some(GameProcess::spawned(child)))
    }
}

fn send(events: &UnboundedSender<BackendEvent>, event: BackendEvent) {
    if let BackendEvent::Debug(line) = &event {
        debug!("{}", line);
    }
    let _ = events.send(event);
}

async fn forward_lines<R>(
    reader: R,
    events: UnboundedSender<BackendEvent>,
    wrap: fn(String) -> BackendEvent,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if events.send(wrap(line)).is_err() {
            break;
        }
    }
}

fn placeholders_for(
    config: &LaunchConfig,
    version: &VersionJson,
    profile_id: &str,
    classpath: &str,
) -> Placeholders {
    let game = &config.game;
    let identity = &config.identity;
    let assets_dir = safe_path_str(&game.assets_dir());
    let asset_index_name = version
        .asset_index
        .as_ref()
        .map(|index| index.id.clone())
        .or_else(|| version.assets.clone())
        .unwrap_or_else(|| "legacy".into());

    let mut placeholders = Placeholders::new();
    placeholders
        .set("auth_player_name", identity.username.as_str())
        .set("auth_uuid", identity.uuid.as_str())
        .set("auth_access_token", identity.access_token.as_str())
        .set("auth_session", identity.access_token.as_str())
        .set("user_type", identity.user_type.as_str())
        .set("user_properties", "{}")
        .set("version_name", profile_id)
        .set(
            "version_type",
            version.version_type.clone().unwrap_or_else(|| "release".into()),
        )
        .set("game_directory", safe_path_str(game.root()))
        .set("assets_root", assets_dir.as_str())
        .set("game_assets", assets_dir.as_str())
        .set("assets_index_name", asset_index_name)
        .set("natives_directory", safe_path_str(&game.natives_dir(profile_id)))
        .set("library_directory", safe_path_str(&game.libraries_dir()))
        .set("classpath", classpath)
        .set("classpath_separator", get_classpath_separator())
        .set("launcher_name", LAUNCHER_NAME)
        .set("launcher_version", env!("CARGO_PKG_VERSION"));
    if let Some(window) = config.window {
        placeholders
            .set("resolution_width", window.width.to_string())
            .set("resolution_height", window.height.to_string());
    }
    placeholders
}

/// Everything after the Java executable: JVM flags, `-cp`, main class, game arguments.
fn assemble_arguments(
    config: &LaunchConfig,
    version: &VersionJson,
    placeholders: &Placeholders,
    classpath: &str,
) -> Vec<String> {
    let mut jvm = vec![
        format!("-Xms{}M", config.memory.min_mb),
        format!("-Xmx{}M", config.memory.max_mb),
    ];
    let profile_jvm = strip_classpath_switches(substitute_args(&version.jvm_arguments(), placeholders));
    if !profile_jvm.iter().any(|arg| arg.starts_with("-Djava.library.path=")) {
        jvm.push(format!(
            "-Djava.library.path={}",
            placeholders.resolve("${natives_directory}")
        ));
    }
    merge_unique(&mut jvm, &profile_jvm);
    let custom_jvm = strip_classpath_switches(substitute_args(&config.jvm_args, placeholders));
    merge_unique(&mut jvm, &custom_jvm);
    jvm.push(format!("-Dminecraft.launcher.brand={LAUNCHER_NAME}"));
    jvm.push(format!("-Dminecraft.launcher.version={}", env!("CARGO_PKG_VERSION")));

    let mut game_args = substitute_args(&version.game_arguments(), placeholders);
    game_args.extend(substitute_args(&config.game_args, placeholders));
    if let Some(window) = config.window {
        if !game_args.iter().any(|arg| arg == "--width") {
            game_args.push("--width".into());
            game_args.push(window.width.to_string());
            game_args.push("--height".into());
            game_args.push(window.height.to_string());
        }
    }
    let game_args = sanitize_numeric_window_args(game_args);

    let mut all = jvm;
    all.push("-cp".into());
    all.push(classpath.to_string());
    all.push(version.main_class.clone());
    all.extend(game_args);
    all
}
