use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::stream::{self, StreamExt};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};

/// A single file to download with optional SHA-1 for validation.
#[derive(Debug, Clone)]
pub struct DownloadEntry {
    pub url: String,
    pub dest: PathBuf,
    pub sha1: Option<String>,
}

/// HTTP primitives shared by the loaders, the bootstrapper and the launch backend.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    /// Maximum number of parallel downloads.
    concurrency: usize,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            concurrency: 8,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    // ── Documents ───────────────────────────────────────

    async fn get_ok(&self, url: &str) -> LauncherResult<Response> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    /// GET `url` and deserialize the body, failing on non-2xx statuses.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> LauncherResult<T> {
        Ok(self.get_ok(url).await?.json::<T>().await?)
    }

    /// GET `url` and return the raw body text, so documents can be stored byte-for-byte.
    pub async fn get_text(&self, url: &str) -> LauncherResult<String> {
        Ok(self.get_ok(url).await?.text().await?)
    }

    // ── Single file download ────────────────────────────

    /// Stream `url` into `dest`, optionally validating SHA-1.
    ///
    /// Bytes land in a sibling `.part` file that is renamed into place only
    /// after the transfer (and hash check) succeeds, so an interrupted
    /// download never leaves a truncated file under the final name.
    pub async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        sha1_expected: Option<&str>,
    ) -> LauncherResult<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::from(e).at_path(parent))?;
        }

        let response = self.get_ok(url).await?;
        let part_path = part_path_for(dest);
        let actual = match stream_to_file(response, &part_path).await {
            Ok(digest) => digest,
            Err(err) => {
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(err);
            }
        };

        if let Some(expected) = sha1_expected {
            if !actual.eq_ignore_ascii_case(expected) {
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(LauncherError::Sha1Mismatch {
                    path: dest.to_path_buf(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        tokio::fs::rename(&part_path, dest)
            .await
            .map_err(|e| LauncherError::from(e).at_path(dest))?;

        debug!("Downloaded: {} -> {:?}", url, dest);
        Ok(())
    }

    // ── Batch concurrent downloads ──────────────────────

    /// Download many files concurrently using `buffer_unordered`.
    ///
    /// `on_progress(done, total)` fires after each finished entry.
    /// Returns the list of files that failed (if any).
    pub async fn download_batch<F>(
        &self,
        entries: Vec<DownloadEntry>,
        on_progress: F,
    ) -> Vec<(DownloadEntry, LauncherError)>
    where
        F: Fn(usize, usize) + Sync,
    {
        let total = entries.len();
        info!(
            "Starting batch download: {} files, concurrency={}",
            total, self.concurrency
        );

        let done = AtomicUsize::new(0);
        let results: Vec<_> = stream::iter(entries)
            .map(|entry| {
                let downloader = &self;
                let done = &done;
                let on_progress = &on_progress;
                async move {
                    let result = downloader
                        .download_file(&entry.url, &entry.dest, entry.sha1.as_deref())
                        .await;
                    let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                    on_progress(finished, total);
                    (entry, result)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        results
            .into_iter()
            .filter_map(|(entry, result)| match result {
                Ok(()) => None,
                Err(e) => Some((entry, e)),
            })
            .collect()
    }
}

/// Write the body to `path`, returning the hex SHA-1 of what was written.
async fn stream_to_file(response: Response, path: &Path) -> LauncherResult<String> {
    let io_err = |e: std::io::Error| LauncherError::from(e).at_path(path);
    let mut hasher = Sha1::new();
    // closed on return, before the caller renames it (required on Windows)
    let mut file = tokio::fs::File::create(path).await.map_err(io_err)?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        hasher.update(&chunk);
        file.write_all(&chunk).await.map_err(io_err)?;
    }
    file.flush().await.map_err(io_err)?;
    Ok(hex::encode(hasher.finalize()))
}

fn part_path_for(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}
