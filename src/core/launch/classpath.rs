// ─── Classpath Builder ───
// Turns a resolved version document into library downloads, a classpath
// string and an extracted natives directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::core::downloader::DownloadEntry;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::{MavenArtifact, MOJANG_LIBRARIES};
use crate::core::version::{is_zero_byte_file, LibraryEntry, VersionJson};

/// What a version needs from `{root}/libraries`.
#[derive(Debug, Default)]
pub struct LibraryPlan {
    /// Jars for `-cp`, in declaration order.
    pub classpath: Vec<PathBuf>,
    /// Jars whose shared libraries are unpacked into the natives directory.
    pub natives: Vec<PathBuf>,
    /// Files missing on disk.
    pub downloads: Vec<DownloadEntry>,
}

impl LibraryPlan {
    pub fn for_version(version: &VersionJson, libraries_dir: &Path) -> Self {
        let mut plan = LibraryPlan::default();
        let mut queued = HashSet::new();

        for library in &version.libraries {
            if !library.is_allowed_for_current_os() {
                debug!("Skipping {} (rules exclude this OS)", library.name);
                continue;
            }

            if let Some((path, download)) = main_artifact(library, libraries_dir) {
                let is_native_jar = library
                    .artifact()
                    .and_then(|a| a.classifier)
                    .is_some_and(|c| c.starts_with("natives-"));
                if is_native_jar {
                    plan.natives.push(path.clone());
                }
                plan.classpath.push(path.clone());
                plan.queue(&mut queued, path, download);
            }

            if let Some((path, download)) = native_artifact(library, libraries_dir) {
                plan.natives.push(path.clone());
                plan.queue(&mut queued, path, download);
            }
        }

        plan
    }

    fn queue(&mut self, queued: &mut HashSet<PathBuf>, path: PathBuf, download: Option<Remote>) {
        let Some(remote) = download else {
            return;
        };
        if path.exists() && !is_zero_byte_file(&path) {
            return;
        }
        if !queued.insert(path.clone()) {
            return;
        }
        self.downloads.push(DownloadEntry {
            url: remote.url,
            dest: path,
            sha1: remote.sha1,
        });
    }
}

struct Remote {
    url: String,
    sha1: Option<String>,
}

fn main_artifact(library: &LibraryEntry, libraries_dir: &Path) -> Option<(PathBuf, Option<Remote>)> {
    if let Some(artifact) = library.downloads.as_ref().and_then(|d| d.artifact.as_ref()) {
        let path = match artifact.path.as_deref() {
            Some(relative) => libraries_dir.join(relative),
            None => libraries_dir.join(library.artifact()?.local_path()),
        };
        let remote = (!artifact.url.trim().is_empty()).then(|| Remote {
            url: artifact.url.clone(),
            sha1: artifact.sha1.clone(),
        });
        return Some((path, remote));
    }

    // legacy natives-only entries carry classifiers and no main jar
    let has_downloads = library.downloads.is_some();
    if has_downloads && library.natives.is_some() {
        return None;
    }

    let coordinate = library.artifact()?;
    let base = library.url.as_deref().unwrap_or(MOJANG_LIBRARIES);
    let remote = Remote {
        url: coordinate.url(base),
        sha1: None,
    };
    Some((libraries_dir.join(coordinate.local_path()), Some(remote)))
}

fn native_artifact(library: &LibraryEntry, libraries_dir: &Path) -> Option<(PathBuf, Option<Remote>)> {
    let classifier = library.native_classifier_for_current_os()?;

    let declared = library
        .downloads
        .as_ref()
        .and_then(|d| d.classifiers.as_ref())
        .and_then(|c| c.get(&classifier));
    if let Some(entry) = declared {
        let url = entry.get("url").and_then(Value::as_str).unwrap_or_default();
        let sha1 = entry.get("sha1").and_then(Value::as_str).map(String::from);
        let path = match entry.get("path").and_then(Value::as_str) {
            Some(relative) => libraries_dir.join(relative),
            None => libraries_dir.join(with_classifier(library, &classifier)?.local_path()),
        };
        let remote = (!url.is_empty()).then(|| Remote {
            url: url.to_string(),
            sha1,
        });
        return Some((path, remote));
    }

    let coordinate = with_classifier(library, &classifier)?;
    let base = library.url.as_deref().unwrap_or(MOJANG_LIBRARIES);
    let remote = Remote {
        url: coordinate.url(base),
        sha1: None,
    };
    Some((libraries_dir.join(coordinate.local_path()), Some(remote)))
}

fn with_classifier(library: &LibraryEntry, classifier: &str) -> Option<MavenArtifact> {
    let mut artifact = library.artifact()?;
    artifact.classifier = Some(classifier.to_string());
    Some(artifact)
}

/// Join `libraries` and the client jar into a `-cp` value, client jar last.
pub fn build_classpath(libraries: &[PathBuf], client_jar: &Path) -> String {
    let mut entries: Vec<String> = libraries
        .iter()
        .filter(|path| path.exists())
        .map(|path| safe_path_str(path))
        .collect();
    entries.push(safe_path_str(client_jar));
    dedup_preserving_order(&mut entries);
    entries.join(get_classpath_separator())
}

pub fn get_classpath_separator() -> &'static str {
    if cfg!(target_os = "windows") {
        ";"
    } else {
        ":"
    }
}

fn dedup_preserving_order(entries: &mut Vec<String>) {
    let mut seen = HashSet::new();
    entries.retain(|entry| {
        let key = if cfg!(target_os = "windows") {
            entry.to_lowercase()
        } else {
            entry.clone()
        };
        seen.insert(key)
    });
}

/// Unpack `.dll`/`.so`/`.dylib`/`.jnilib` files from `jars` into a fresh `natives_dir`.
pub async fn extract_natives(jars: &[PathBuf], natives_dir: &Path) -> LauncherResult<()> {
    if natives_dir.exists() {
        let _ = tokio::fs::remove_dir_all(natives_dir).await;
    }
    tokio::fs::create_dir_all(natives_dir)
        .await
        .map_err(|e| LauncherError::from(e).at_path(natives_dir))?;

    for jar in jars {
        if !jar.exists() {
            warn!("Native jar missing: {:?}", jar);
            continue;
        }
        let jar_path = jar.clone();
        let dest_dir = natives_dir.to_path_buf();
        tokio::task::spawn_blocking(move || unpack_native_jar(&jar_path, &dest_dir))
            .await
            .map_err(|e| LauncherError::Other(format!("Task join error: {}", e)))??;
    }

    Ok(())
}

fn unpack_native_jar(jar: &Path, dest_dir: &Path) -> LauncherResult<()> {
    let file = std::fs::File::open(jar).map_err(|e| LauncherError::from(e).at_path(jar))?;
    let mut archive = match zip::ZipArchive::new(file) {
        Ok(a) => a,
        Err(e) => {
            warn!("Cannot open native JAR {:?}: {}", jar, e);
            return Ok(());
        }
    };

    for i in 0..archive.len() {
        let Ok(mut entry) = archive.by_index(i) else {
            continue;
        };
        let name = entry.name().to_string();
        if name.contains("META-INF") || name.contains('/') || name.contains('\\') {
            continue;
        }
        let is_native = name.ends_with(".dll")
            || name.ends_with(".so")
            || name.ends_with(".dylib")
            || name.ends_with(".jnilib");
        if !is_native {
            continue;
        }

        let dest = dest_dir.join(&name);
        let mut out = match std::fs::File::create(&dest) {
            Ok(file) => file,
            Err(_) => continue,
        };
        std::io::copy(&mut entry, &mut out).map_err(|e| LauncherError::from(e).at_path(&dest))?;
        debug!("Extracted native: {}", name);
    }
    Ok(())
}

/// Convert a path for the JVM command line, dropping the `\\?\` prefix on Windows.
pub fn safe_path_str(path: &Path) -> String {
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let text = resolved.to_string_lossy().to_string();

    #[cfg(target_os = "windows")]
    {
        // Java rejects extended-length paths on the classpath
        if let Some(stripped) = text.strip_prefix(r"\\?\") {
            return stripped.to_string();
        }
    }

    text
}
