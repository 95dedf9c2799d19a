use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the entire launcher backend.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-1 mismatch for {path:?}: expected {expected}, got {actual}")]
    Sha1Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("SHA-256 mismatch for {path:?}: expected {expected}, got {actual}")]
    Sha256Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── Maven ───────────────────────────────────────────
    #[error("Invalid Maven coordinate: {0}")]
    InvalidMavenCoordinate(String),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Options ─────────────────────────────────────────
    #[error("Invalid launch options: {0}")]
    InvalidOptions(String),

    // ── Java ────────────────────────────────────────────
    #[error("Java not found for major version {0}")]
    JavaNotFound(u32),

    #[error("Java execution failed: {0}")]
    JavaExecution(String),

    #[error("A runtime download is already in progress (Java {0})")]
    DownloadInProgress(u32),

    #[error("Runtime download for Java {0} was cancelled")]
    DownloadCancelled(u32),

    #[error("Runtime for Java {major} extracted but no executable found under {root:?}")]
    RuntimeLayout { major: u32, root: PathBuf },

    // ── Loader ──────────────────────────────────────────
    #[error("Loader error: {0}")]
    Loader(String),

    #[error("Loader API unreachable: {0}")]
    LoaderApi(String),

    #[error("No {loader} build available for Minecraft {game_version}")]
    LoaderVersionUnavailable {
        loader: String,
        game_version: String,
    },

    #[error("Loader installer exited with code {code:?}")]
    InstallerFailed { code: Option<i32> },

    // ── Archive ─────────────────────────────────────────
    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl LauncherError {
    /// Attach a path to an IO error; other variants pass through untouched.
    pub fn at_path(self, path: impl Into<PathBuf>) -> Self {
        match self {
            LauncherError::Io { source, .. } => LauncherError::Io {
                path: path.into(),
                source,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_pick_up_their_path() {
        let err = LauncherError::from(std::io::Error::from(std::io::ErrorKind::NotFound))
            .at_path("/games/mc/versions/1.20.1/1.20.1.json");
        match err {
            LauncherError::Io { path, .. } => {
                assert_eq!(path, PathBuf::from("/games/mc/versions/1.20.1/1.20.1.json"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn other_variants_ignore_paths() {
        let err = LauncherError::JavaNotFound(17).at_path("/nowhere");
        assert_eq!(err.to_string(), "Java not found for major version 17");
    }
}
