use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::auth::LaunchIdentity;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::GameDir;

const MIN_HEAP_MB: u32 = 512;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoaderKind {
    #[default]
    Vanilla,
    Fabric,
    Quilt,
    Forge,
}

impl LoaderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LoaderKind::Vanilla => "vanilla",
            LoaderKind::Fabric => "fabric",
            LoaderKind::Quilt => "quilt",
            LoaderKind::Forge => "forge",
        }
    }
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoaderKind {
    type Err = LauncherError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "vanilla" => Ok(LoaderKind::Vanilla),
            "fabric" => Ok(LoaderKind::Fabric),
            "quilt" => Ok(LoaderKind::Quilt),
            "forge" => Ok(LoaderKind::Forge),
            other => Err(LauncherError::InvalidOptions(format!(
                "unknown loader '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryBounds {
    pub min_mb: u32,
    pub max_mb: u32,
}

impl Default for MemoryBounds {
    fn default() -> Self {
        Self {
            min_mb: 1024,
            max_mb: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_port() -> u16 {
    25565
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

/// Everything a caller may ask of one launch attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOptions {
    /// Base game version, e.g. `1.20.1`.
    pub version: String,
    #[serde(default)]
    pub loader: LoaderKind,
    /// Loader build; the newest compatible one is used when absent.
    #[serde(default)]
    pub loader_version: Option<String>,
    /// Game root; the platform `.minecraft` directory when absent.
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub identity: LaunchIdentity,
    #[serde(default)]
    pub memory: MemoryBounds,
    #[serde(default)]
    pub java_path: Option<PathBuf>,
    #[serde(default)]
    pub jvm_args: Vec<String>,
    #[serde(default)]
    pub game_args: Vec<String>,
    #[serde(default)]
    pub server: Option<ServerAddress>,
    #[serde(default)]
    pub window: Option<WindowSize>,
}

impl LaunchOptions {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            loader: LoaderKind::Vanilla,
            loader_version: None,
            root: None,
            identity: LaunchIdentity::default(),
            memory: MemoryBounds::default(),
            java_path: None,
            jvm_args: Vec::new(),
            game_args: Vec::new(),
            server: None,
            window: None,
        }
    }

    pub fn validate(&self) -> LauncherResult<()> {
        if self.version.trim().is_empty() {
            return Err(LauncherError::InvalidOptions("version is required".into()));
        }
        if !is_safe_version_id(&self.version) {
            return Err(LauncherError::InvalidOptions(format!(
                "version {:?} may only contain letters, digits, '.', '_', '+' and '-'",
                self.version
            )));
        }
        if let Some(loader_version) = self.loader_version.as_deref() {
            if loader_version.trim().is_empty() {
                return Err(LauncherError::InvalidOptions(
                    "loader version must not be blank".into(),
                ));
            }
            if !is_safe_version_id(loader_version.trim()) {
                return Err(LauncherError::InvalidOptions(format!(
                    "loader version {loader_version:?} may only contain letters, digits, '.', '_', '+' and '-'"
                )));
            }
        }
        if self.memory.max_mb < MIN_HEAP_MB {
            return Err(LauncherError::InvalidOptions(format!(
                "maximum memory must be at least {MIN_HEAP_MB} MB"
            )));
        }
        if self.memory.min_mb > self.memory.max_mb {
            return Err(LauncherError::InvalidOptions(format!(
                "minimum memory ({} MB) exceeds maximum ({} MB)",
                self.memory.min_mb, self.memory.max_mb
            )));
        }
        if let Some(server) = &self.server {
            if server.host.trim().is_empty() || server.port == 0 {
                return Err(LauncherError::InvalidOptions(
                    "server address needs a host and a port".into(),
                ));
            }
        }
        if let Some(window) = &self.window {
            if window.width == 0 || window.height == 0 {
                return Err(LauncherError::InvalidOptions(
                    "window size must be non-zero".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn game_dir(&self) -> GameDir {
        match &self.root {
            Some(root) => GameDir::new(root),
            None => GameDir::platform_default(),
        }
    }
}

/// Version ids become directory names under `versions/`.
fn is_safe_version_id(id: &str) -> bool {
    !id.is_empty()
        && !id.chars().all(|c| c == '.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-'))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameVersion {
    /// Base game version.
    pub number: String,
    /// Reconciled loader profile to launch instead of the base version.
    pub custom: Option<String>,
}

impl GameVersion {
    pub fn profile_id(&self) -> &str {
        self.custom.as_deref().unwrap_or(&self.number)
    }
}

/// The configuration handed to the launch backend. Loader handlers refine it.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub game: GameDir,
    pub identity: LaunchIdentity,
    pub version: GameVersion,
    pub memory: MemoryBounds,
    pub java_path: PathBuf,
    /// Major of the selected runtime; the required major when it was not detected.
    pub java_major: u32,
    pub jvm_args: Vec<String>,
    pub game_args: Vec<String>,
    pub window: Option<WindowSize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deserialize_from_minimal_json() {
        let options: LaunchOptions =
            serde_json::from_str(r#"{"version": "1.20.1", "loader": "forge"}"#).unwrap();
        assert_eq!(options.loader, LoaderKind::Forge);
        assert_eq!(options.memory, MemoryBounds::default());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn validation_rejects_bad_bounds_and_blank_fields() {
        let mut options = LaunchOptions::new("1.20.1");
        options.memory = MemoryBounds {
            min_mb: 8192,
            max_mb: 4096,
        };
        assert!(options.validate().is_err());

        let mut options = LaunchOptions::new(" ");
        assert!(options.validate().is_err());
        options.version = "1.20.1".into();
        options.loader_version = Some("".into());
        assert!(options.validate().is_err());

        let mut options = LaunchOptions::new("1.20.1");
        options.server = Some(ServerAddress {
            host: "".into(),
            port: 25565,
        });
        assert!(options.validate().is_err());
    }

    #[test]
    fn version_ids_must_be_plain_path_segments() {
        for id in ["1.20.1", "24w14a", "1.20.1-pre2", "1.7.10_pre4", "b1.7.3+x"] {
            assert!(LaunchOptions::new(id).validate().is_ok(), "{id}");
        }
        for id in ["\u{20ac}w", "../1.20.1", "1.20/1", "..", "1.20.1 "] {
            assert!(LaunchOptions::new(id).validate().is_err(), "{id}");
        }

        let mut options = LaunchOptions::new("1.20.1");
        options.loader_version = Some("0.15.7/../..".into());
        assert!(options.validate().is_err());
    }

    #[test]
    fn loader_kind_parses_case_insensitively() {
        assert_eq!("Fabric".parse::<LoaderKind>().unwrap(), LoaderKind::Fabric);
        assert_eq!("".parse::<LoaderKind>().unwrap(), LoaderKind::Vanilla);
        assert!("neoforge".parse::<LoaderKind>().is_err());
    }

    #[test]
    fn profile_id_prefers_custom_version() {
        let mut version = GameVersion {
            number: "1.20.1".into(),
            custom: None,
        };
        assert_eq!(version.profile_id(), "1.20.1");
        version.custom = Some("fabric-loader-0.15.7-1.20.1".into());
        assert_eq!(version.profile_id(), "fabric-loader-0.15.7-1.20.1");
    }
}
