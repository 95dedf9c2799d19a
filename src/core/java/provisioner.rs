use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures_util::StreamExt;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};

use super::locator::RuntimeLocator;

const ADOPTIUM_BINARY_BASE: &str = "https://api.adoptium.net/v3/binary/latest";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Downloading,
    Paused,
    Stopped,
    Error,
    Done,
}

impl SessionState {
    fn is_active(self) -> bool {
        matches!(self, SessionState::Downloading | SessionState::Paused)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DownloadControl {
    Running,
    Paused,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadProgress {
    pub major: u32,
    pub downloaded: u64,
    pub total: Option<u64>,
    pub percent: f64,
}

/// Public view of the provisioner's single session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub major: Option<u32>,
    pub state: SessionState,
    pub downloaded: u64,
    pub total: Option<u64>,
}

#[derive(Debug)]
struct DownloadSession {
    generation: u64,
    major: Option<u32>,
    state: SessionState,
    downloaded: u64,
    total: Option<u64>,
    archive: Option<PathBuf>,
    control: Option<watch::Sender<DownloadControl>>,
}

impl Default for DownloadSession {
    fn default() -> Self {
        Self {
            generation: 0,
            major: None,
            state: SessionState::Idle,
            downloaded: 0,
            total: None,
            archive: None,
            control: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
}

impl ArchiveKind {
    pub fn for_platform() -> Self {
        if cfg!(windows) {
            ArchiveKind::Zip
        } else {
            ArchiveKind::TarGz
        }
    }

    fn extension(self) -> &'static str {
        match self {
            ArchiveKind::Zip => "zip",
            ArchiveKind::TarGz => "tar.gz",
        }
    }
}

/// Where a runtime archive comes from.
#[derive(Debug, Clone)]
pub struct RuntimeArchive {
    pub major: u32,
    pub url: String,
    pub kind: ArchiveKind,
    pub sha256: Option<String>,
}

impl RuntimeArchive {
    /// Latest GA JRE build for this platform from Adoptium.
    pub fn adoptium(major: u32) -> Self {
        let url = format!(
            "{}/{}/ga/{}/{}/jre/hotspot/normal/eclipse",
            ADOPTIUM_BINARY_BASE,
            major,
            adoptium_os(),
            adoptium_arch()
        );
        Self {
            major,
            url,
            kind: ArchiveKind::for_platform(),
            sha256: None,
        }
    }
}

fn adoptium_os() -> &'static str {
    match std::env::consts::OS {
        "windows" => "windows",
        "macos" => "mac",
        _ => "linux",
    }
}

fn adoptium_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "aarch64",
        "x86" => "x86",
        other => other,
    }
}

/// Downloads and unpacks runtimes into the managed root. One session at a time.
#[derive(Debug)]
pub struct RuntimeProvisioner {
    downloader: Downloader,
    locator: RuntimeLocator,
    session: Mutex<DownloadSession>,
}

impl RuntimeProvisioner {
    pub fn new(downloader: Downloader, locator: RuntimeLocator) -> Self {
        Self {
            downloader,
            locator,
            session: Mutex::new(DownloadSession::default()),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let session = self.lock_session();
        SessionSnapshot {
            major: session.major,
            state: session.state,
            downloaded: session.downloaded,
            total: session.total,
        }
    }

    /// Download, extract and verify the runtime for `major`. Returns the
    /// path of the new `java` executable.
    pub async fn download<F>(&self, major: u32, on_progress: F) -> LauncherResult<PathBuf>
    where
        F: Fn(DownloadProgress) + Send + Sync,
    {
        self.download_from(RuntimeArchive::adoptium(major), on_progress)
            .await
    }

    #[instrument(skip(self, on_progress), fields(major = archive.major))]
    pub async fn download_from<F>(
        &self,
        archive: RuntimeArchive,
        on_progress: F,
    ) -> LauncherResult<PathBuf>
    where
        F: Fn(DownloadProgress) + Send + Sync,
    {
        let major = archive.major;
        let (generation, mut control) = self.begin_session(major)?;

        let result = self
            .run_session(generation, &archive, &mut control, &on_progress)
            .await;

        self.finish_session(generation, major, result)
    }

    /// `true` when an active download was paused.
    pub fn pause(&self) -> bool {
        self.transition(SessionState::Downloading, SessionState::Paused, DownloadControl::Paused)
    }

    /// `true` when a paused download was resumed.
    pub fn resume(&self) -> bool {
        self.transition(SessionState::Paused, SessionState::Downloading, DownloadControl::Running)
    }

    /// Stop the active download. Partial files are removed on a best-effort basis.
    pub fn cancel(&self) -> bool {
        let archive = {
            let mut session = self.lock_session();
            if !session.state.is_active() {
                return false;
            }
            session.state = SessionState::Stopped;
            if let Some(control) = session.control.take() {
                let _ = control.send(DownloadControl::Cancelled);
            }
            session.archive.take()
        };

        if let Some(archive) = archive {
            if let Err(err) = std::fs::remove_file(&archive) {
                debug!("Partial runtime archive {:?} not removed: {}", archive, err);
            }
        }
        info!("Runtime download cancelled");
        true
    }

    fn transition(&self, from: SessionState, to: SessionState, signal: DownloadControl) -> bool {
        let mut session = self.lock_session();
        if session.state != from {
            return false;
        }
        session.state = to;
        if let Some(control) = &session.control {
            let _ = control.send(signal);
        }
        true
    }

    fn begin_session(
        &self,
        major: u32,
    ) -> LauncherResult<(u64, watch::Receiver<DownloadControl>)> {
        let mut session = self.lock_session();
        if session.state.is_active() {
            return Err(LauncherError::DownloadInProgress(
                session.major.unwrap_or(major),
            ));
        }

        let (tx, rx) = watch::channel(DownloadControl::Running);
        let generation = session.generation + 1;
        *session = DownloadSession {
            generation,
            major: Some(major),
            state: SessionState::Downloading,
            control: Some(tx),
            ..DownloadSession::default()
        };
        Ok((generation, rx))
    }

    /// Record the outcome of session `generation`. A session that was
    /// cancelled (or replaced) in the meantime never reports success.
    fn finish_session(
        &self,
        generation: u64,
        major: u32,
        result: LauncherResult<PathBuf>,
    ) -> LauncherResult<PathBuf> {
        let mut session = self.lock_session();
        if session.generation != generation || session.state == SessionState::Stopped {
            if session.generation == generation {
                session.control = None;
                session.archive = None;
            }
            return match result {
                Ok(_) => Err(LauncherError::DownloadCancelled(major)),
                Err(err) => Err(err),
            };
        }
        session.control = None;
        session.archive = None;
        session.state = match &result {
            Ok(_) => SessionState::Done,
            Err(LauncherError::DownloadCancelled(_)) => SessionState::Stopped,
            Err(_) => SessionState::Error,
        };
        result
    }

    fn record_progress(&self, generation: u64, downloaded: u64, total: Option<u64>) {
        let mut session = self.lock_session();
        if session.generation == generation {
            session.downloaded = downloaded;
            session.total = total;
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, DownloadSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_session<F>(
        &self,
        generation: u64,
        archive: &RuntimeArchive,
        control: &mut watch::Receiver<DownloadControl>,
        on_progress: &F,
    ) -> LauncherResult<PathBuf>
    where
        F: Fn(DownloadProgress) + Send + Sync,
    {
        let major = archive.major;
        let target_dir = self.locator.managed_root().join(format!("java{major}"));
        tokio::fs::create_dir_all(&target_dir)
            .await
            .map_err(|e| LauncherError::from(e).at_path(&target_dir))?;

        let archive_path = target_dir.join(format!("java{major}.{}", archive.kind.extension()));
        self.lock_session().archive = Some(archive_path.clone());

        info!("Downloading Java {} runtime from {}", major, archive.url);
        if let Err(err) = self
            .fetch_archive(generation, archive, &archive_path, control, on_progress)
            .await
        {
            let _ = tokio::fs::remove_file(&archive_path).await;
            return Err(err);
        }

        self.install_archive(major, &archive_path, archive.kind).await
    }

    async fn fetch_archive<F>(
        &self,
        generation: u64,
        archive: &RuntimeArchive,
        dest: &Path,
        control: &mut watch::Receiver<DownloadControl>,
        on_progress: &F,
    ) -> LauncherResult<()>
    where
        F: Fn(DownloadProgress) + Send + Sync,
    {
        let major = archive.major;
        let response = self.downloader.client().get(&archive.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: archive.url.clone(),
                status: status.as_u16(),
            });
        }

        let total = response.content_length();
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| LauncherError::from(e).at_path(dest))?;
        let mut hasher = Sha256::new();
        let mut downloaded = 0_u64;
        let mut stream = response.bytes_stream();

        loop {
            wait_for_running(control, major).await?;

            let next = tokio::select! {
                chunk = stream.next() => chunk,
                _ = control.wait_for(|state| *state == DownloadControl::Cancelled) => {
                    return Err(LauncherError::DownloadCancelled(major));
                }
            };
            let Some(chunk) = next else {
                break;
            };

            let chunk = chunk?;
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| LauncherError::from(e).at_path(dest))?;

            downloaded += chunk.len() as u64;
            self.record_progress(generation, downloaded, total);
            on_progress(DownloadProgress {
                major,
                downloaded,
                total,
                percent: percent_of(downloaded, total),
            });
        }

        file.flush()
            .await
            .map_err(|e| LauncherError::from(e).at_path(dest))?;
        drop(file);

        let actual = hex::encode(hasher.finalize());
        match &archive.sha256 {
            Some(expected) if !actual.eq_ignore_ascii_case(expected) => {
                Err(LauncherError::Sha256Mismatch {
                    path: dest.to_path_buf(),
                    expected: expected.clone(),
                    actual,
                })
            }
            _ => {
                debug!("Runtime archive sha256={}", actual);
                Ok(())
            }
        }
    }

    /// Extract `archive_path` next to itself, delete it, then confirm the
    /// locator sees a runtime of `major` under the managed root.
    async fn install_archive(
        &self,
        major: u32,
        archive_path: &Path,
        kind: ArchiveKind,
    ) -> LauncherResult<PathBuf> {
        let target_dir = archive_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.locator.managed_root().to_path_buf());

        let source = archive_path.to_path_buf();
        let destination = target_dir.clone();
        tokio::task::spawn_blocking(move || extract_archive(&source, &destination, kind))
            .await
            .map_err(|e| LauncherError::Other(format!("Task join error: {e}")))??;

        if let Err(err) = tokio::fs::remove_file(archive_path).await {
            warn!("Could not delete runtime archive {:?}: {}", archive_path, err);
        }

        let installed = self.locator.find_managed(major);
        match installed.into_iter().next() {
            Some(runtime) => {
                info!("Java {} runtime ready at {:?}", major, runtime.path);
                Ok(runtime.path)
            }
            None => Err(LauncherError::RuntimeLayout {
                major,
                root: target_dir,
            }),
        }
    }
}

async fn wait_for_running(
    control: &mut watch::Receiver<DownloadControl>,
    major: u32,
) -> LauncherResult<()> {
    loop {
        let state = *control.borrow();
        match state {
            DownloadControl::Running => return Ok(()),
            DownloadControl::Paused => {
                control
                    .changed()
                    .await
                    .map_err(|_| LauncherError::DownloadCancelled(major))?;
            }
            DownloadControl::Cancelled => return Err(LauncherError::DownloadCancelled(major)),
        }
    }
}

fn percent_of(downloaded: u64, total: Option<u64>) -> f64 {
    match total {
        Some(total) if total > 0 => ((downloaded as f64 / total as f64) * 100.0).min(100.0),
        _ => 0.0,
    }
}

fn extract_archive(archive_path: &Path, target_dir: &Path, kind: ArchiveKind) -> LauncherResult<()> {
    let file = std::fs::File::open(archive_path)
        .map_err(|e| LauncherError::from(e).at_path(archive_path))?;

    match kind {
        ArchiveKind::TarGz => {
            let decoder = flate2::read::GzDecoder::new(file);
            tar::Archive::new(decoder)
                .unpack(target_dir)
                .map_err(|e| LauncherError::from(e).at_path(target_dir))
        }
        ArchiveKind::Zip => extract_zip(file, target_dir),
    }
}

fn extract_zip(file: std::fs::File, target_dir: &Path) -> LauncherResult<()> {
    let mut archive = zip::ZipArchive::new(file)?;

    for index in 0..archive.len() {
        let mut zipped = archive.by_index(index)?;
        let Some(enclosed) = zipped.enclosed_name() else {
            warn!("Skipping unsafe archive entry {}", zipped.name());
            continue;
        };

        let rel_path: PathBuf = enclosed
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part),
                _ => None,
            })
            .collect();
        if rel_path.as_os_str().is_empty() {
            continue;
        }

        let out_path = target_dir.join(rel_path);
        if zipped.is_dir() {
            std::fs::create_dir_all(&out_path)
                .map_err(|e| LauncherError::from(e).at_path(&out_path))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::from(e).at_path(parent))?;
        }

        let mut out = std::fs::File::create(&out_path)
            .map_err(|e| LauncherError::from(e).at_path(&out_path))?;
        std::io::copy(&mut zipped, &mut out)
            .map_err(|e| LauncherError::from(e).at_path(&out_path))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = zipped.unix_mode() {
                let _ = std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
            }
        }
    }

    Ok(())
}
