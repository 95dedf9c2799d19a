// ─── Launch Orchestrator ───
// One launch attempt: options → config → loader preparation → backend,
// with backend output normalized into LaunchEvents.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::FutureExt;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::java::{required_java_for_minecraft_version, RuntimeLocator};
use crate::core::loaders::{Handler, LoaderHandler, LoaderServices, PrepareContext};
use crate::core::version::{is_zero_byte_file, GameDir, VersionJson};

use super::backend::{BackendEvent, LaunchBackend};
use super::classify::{classify, classify_error, Diagnosis, ErrorKind};
use super::event::{EventSink, LaunchEvent, LogLevel, CANCELLED_EXIT_CODE, FAILED_TO_START_EXIT_CODE};
use super::options::{GameVersion, LaunchConfig, LaunchOptions, LoaderKind, ServerAddress};
use super::process::{kill_tree, GameProcess};

/// Long-lived collaborators shared by every launch attempt.
pub struct LaunchServices<B> {
    pub downloader: Downloader,
    pub locator: Arc<RuntimeLocator>,
    pub backend: Arc<B>,
}

impl<B> Clone for LaunchServices<B> {
    fn clone(&self) -> Self {
        Self {
            downloader: self.downloader.clone(),
            locator: Arc::clone(&self.locator),
            backend: Arc::clone(&self.backend),
        }
    }
}

struct Attempt<B> {
    services: LaunchServices<B>,
    events: EventSink,
    started: AtomicBool,
    cancelled: AtomicBool,
    diagnosis: Mutex<Option<ErrorKind>>,
    pid: Mutex<Option<u32>>,
}

/// Drives a single launch attempt. Create a new one per launch.
pub struct LaunchOrchestrator<B> {
    inner: Arc<Attempt<B>>,
}

impl<B: LaunchBackend + 'static> LaunchOrchestrator<B> {
    pub fn new(services: LaunchServices<B>) -> (Self, UnboundedReceiver<LaunchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Attempt {
            services,
            events: EventSink::new(tx),
            started: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            diagnosis: Mutex::new(None),
            pid: Mutex::new(None),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    /// Start the attempt in the background. Results arrive as events only.
    pub fn launch(&self, options: LaunchOptions) -> JoinHandle<()> {
        let attempt = Arc::clone(&self.inner);
        if attempt.started.swap(true, Ordering::SeqCst) {
            warn!("Launch requested twice on the same orchestrator; ignoring");
            return tokio::spawn(async {});
        }
        *lock(&attempt.diagnosis) = None;
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(Arc::clone(&attempt).run(options))
                .catch_unwind()
                .await;
            if outcome.is_err() {
                error!("Launch attempt panicked");
                attempt.events.exit(FAILED_TO_START_EXIT_CODE);
            }
        })
    }

    /// Stop the game (and everything it spawned), or mark a still-preparing attempt as cancelled.
    pub async fn kill(&self) {
        let attempt = &self.inner;
        attempt.cancelled.store(true, Ordering::SeqCst);

        let pid = *lock(&attempt.pid);
        match pid {
            Some(pid) => {
                attempt.events.info(format!("Stopping game process {pid}"));
                stop_tree(pid).await;
            }
            None => attempt
                .events
                .info("Launch cancelled; pending preparation will be ignored"),
        }
        attempt.events.exit(CANCELLED_EXIT_CODE);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }
}

impl<B: LaunchBackend + 'static> Attempt<B> {
    #[instrument(skip_all, fields(version = %options.version, loader = %options.loader))]
    async fn run(self: Arc<Self>, options: LaunchOptions) {
        let config = match self.prepare(&options).await {
            Ok(Some(config)) => config,
            Ok(None) => {
                debug!("Attempt cancelled during preparation");
                return;
            }
            Err(err) => {
                self.fail(&err);
                return;
            }
        };
        self.start(config).await;
    }

    async fn prepare(&self, options: &LaunchOptions) -> LauncherResult<Option<LaunchConfig>> {
        options.validate()?;

        let game = options.game_dir();
        tokio::fs::create_dir_all(game.root())
            .await
            .map_err(|e| LauncherError::from(e).at_path(game.root()))?;
        self.events.info(format!(
            "Preparing {} ({}) in {:?}",
            options.version,
            options.loader,
            game.root()
        ));

        let base_manifest = read_manifest(&game, &options.version).await;
        let required_major = base_manifest
            .as_ref()
            .and_then(VersionJson::required_java_major)
            .unwrap_or_else(|| required_java_for_minecraft_version(&options.version));
        let (java_path, java_major) = self.select_java(options, required_major).await;

        let mut jvm_args = options.jvm_args.clone();
        jvm_args.extend(platform_jvm_args());
        let mut game_args = options.game_args.clone();
        if let Some(server) = &options.server {
            game_args.extend(quick_join_args(&options.version, server));
        }

        let mut config = LaunchConfig {
            game,
            identity: options.identity.clone().sanitized(),
            version: GameVersion {
                number: options.version.clone(),
                custom: None,
            },
            memory: options.memory,
            java_path,
            java_major,
            jvm_args,
            game_args,
            window: options.window,
        };

        self.purge_corrupt_base_files(&config.game, &options.version, base_manifest.as_ref())
            .await;

        if self.is_cancelled() {
            return Ok(None);
        }

        let loader_services = LoaderServices::new(self.services.downloader.clone());
        if let Some(handler) = Handler::for_loader(options.loader, loader_services) {
            self.events
                .info(format!("Preparing {} profile", handler.name()));
            handler
                .prepare(PrepareContext {
                    options,
                    config: &mut config,
                    events: &self.events,
                })
                .await?;
        } else {
            debug_assert_eq!(options.loader, LoaderKind::Vanilla);
        }

        if self.is_cancelled() {
            return Ok(None);
        }
        Ok(Some(config))
    }

    /// Executable and major to launch with. Runtimes the scan did not find
    /// are assumed to satisfy `java_major`.
    async fn select_java(
        &self,
        options: &LaunchOptions,
        java_major: u32,
    ) -> (std::path::PathBuf, u32) {
        if let Some(path) = &options.java_path {
            if !path.exists() {
                self.events
                    .warn(format!("Configured Java {:?} does not exist", path));
            }
            return (path.clone(), java_major);
        }

        let locator = Arc::clone(&self.services.locator);
        let found = tokio::task::spawn_blocking(move || locator.find_compatible(java_major))
            .await
            .unwrap_or_else(|err| {
                warn!("Runtime scan panicked: {}", err);
                None
            });
        match found {
            Some(runtime) => {
                self.events.info(format!(
                    "Using Java {} ({}) at {:?}",
                    runtime.major, runtime.name, runtime.path
                ));
                (runtime.path, runtime.major)
            }
            None => {
                self.events.warn(format!(
                    "No Java {java_major} runtime found; falling back to `java` on PATH"
                ));
                (std::path::PathBuf::from("java"), java_major)
            }
        }
    }

    /// Zero-byte asset indexes and base jars are leftovers of interrupted downloads.
    async fn purge_corrupt_base_files(
        &self,
        game: &GameDir,
        version: &str,
        manifest: Option<&VersionJson>,
    ) {
        let mut candidates = vec![game.asset_index(version), game.version_jar(version)];
        if let Some(index) = manifest.and_then(|m| m.asset_index.as_ref()) {
            candidates.push(game.asset_index(&index.id));
        }

        for path in candidates {
            if !is_zero_byte_file(&path) {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => self
                    .events
                    .warn(format!("Removed empty cached file {:?}", path)),
                Err(err) => warn!("Could not remove {:?}: {}", path, err),
            }
        }
    }

    async fn start(self: &Arc<Self>, config: LaunchConfig) {
        let (tx, mut rx) = mpsc::unbounded_channel::<BackendEvent>();
        let forwarder = {
            let attempt = Arc::clone(self);
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    attempt.forward(event);
                }
            })
        };

        let outcome = self.services.backend.launch(&config, tx).await;

        let process = match outcome {
            Ok(Some(process)) => process,
            Ok(None) => {
                let _ = forwarder.await;
                if self.is_cancelled() {
                    return;
                }
                self.report(ErrorKind::FailedToStart);
                self.events.exit(FAILED_TO_START_EXIT_CODE);
                return;
            }
            Err(err) => {
                let _ = forwarder.await;
                self.fail(&err);
                return;
            }
        };

        if self.is_cancelled() {
            debug!("Attempt was cancelled while the backend was running");
            if let Some(pid) = process.pid() {
                stop_tree(pid).await;
            }
            return;
        }

        *lock(&self.pid) = process.pid();
        self.events.process_started(process.pid());
        // a kill() racing the pid store above saw no pid
        if self.is_cancelled() {
            if let Some(pid) = process.pid() {
                stop_tree(pid).await;
            }
        }

        let code = wait_exit(process).await;
        let _ = forwarder.await;
        *lock(&self.pid) = None;

        if self.is_cancelled() {
            return;
        }
        if code != 0 {
            self.report(ErrorKind::Crash);
        }
        self.events.exit(code);
    }

    fn forward(&self, event: BackendEvent) {
        match event {
            BackendEvent::Debug(line) => {
                if let Some(kind) = classify(&line) {
                    self.report(kind);
                }
                self.events.log(LogLevel::Debug, line);
            }
            BackendEvent::Data(line) => self.events.log(LogLevel::Info, line),
            BackendEvent::Progress {
                task,
                total,
                percent,
            } => self.events.progress(task, total, percent),
        }
    }

    fn fail(&self, err: &LauncherError) {
        if self.is_cancelled() {
            debug!("Ignoring failure of a cancelled attempt: {}", err);
            return;
        }
        self.events
            .debug(format!("Launch preparation failed: {err}"));
        self.report(classify_error(err));
        self.events.exit(FAILED_TO_START_EXIT_CODE);
    }

    /// Emit a diagnosis unless one was already reported for this attempt.
    fn report(&self, kind: ErrorKind) -> bool {
        let mut diagnosis = lock(&self.diagnosis);
        if diagnosis.is_some() {
            return false;
        }
        *diagnosis = Some(kind);
        drop(diagnosis);

        let Diagnosis { summary, advice } = kind.diagnosis();
        self.events.launch_error(summary, advice);
        true
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn wait_exit(process: GameProcess) -> i32 {
    // killed by a signal
    process.wait().await.unwrap_or(1)
}

async fn stop_tree(pid: u32) {
    match tokio::task::spawn_blocking(move || kill_tree(pid)).await {
        Ok(Ok(())) => debug!("Process tree {} stopped", pid),
        Ok(Err(err)) => warn!("Could not stop process tree {}: {}", pid, err),
        Err(err) => warn!("Kill task for {} failed: {}", pid, err),
    }
}

async fn read_manifest(game: &GameDir, version: &str) -> Option<VersionJson> {
    let path = game.version_json(version);
    if !path.exists() {
        return None;
    }
    match VersionJson::read_document(&path).await {
        Ok(document) => VersionJson::from_value(document).ok(),
        Err(err) => {
            debug!("Unreadable base manifest {:?}: {}", path, err);
            None
        }
    }
}

fn platform_jvm_args() -> Vec<String> {
    if cfg!(target_os = "macos") {
        vec!["-XstartOnFirstThread".into()]
    } else if cfg!(target_os = "windows") {
        vec![
            "-XX:HeapDumpPath=MojangTricksIntelDriversForPerformance_javaw.exe_minecraft.exe.heapdump"
                .into(),
        ]
    } else {
        Vec::new()
    }
}

/// `--quickPlayMultiplayer` from 1.20 on, `--server/--port` before.
pub fn quick_join_args(version: &str, server: &ServerAddress) -> Vec<String> {
    if supports_quick_play(version) {
        vec![
            "--quickPlayMultiplayer".into(),
            format!("{}:{}", server.host, server.port),
        ]
    } else {
        vec![
            "--server".into(),
            server.host.clone(),
            "--port".into(),
            server.port.to_string(),
        ]
    }
}

fn supports_quick_play(version: &str) -> bool {
    let mut parts = version.split('.');
    match (parts.next(), parts.next()) {
        (Some("1"), Some(minor)) => {
            let digits: String = minor.chars().take_while(char::is_ascii_digit).collect();
            digits.parse::<u32>().is_ok_and(|minor| minor >= 20)
        }
        // snapshots such as 23w31a
        _ => !version.starts_with("1."),
    }
}
