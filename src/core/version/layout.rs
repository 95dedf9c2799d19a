use std::path::{Path, PathBuf};

/// Paths inside a game root (`.minecraft` or a custom directory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameDir {
    root: PathBuf,
}

impl GameDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The platform-convention game directory.
    pub fn platform_default() -> Self {
        Self::new(default_game_root())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    pub fn version_dir(&self, id: &str) -> PathBuf {
        self.versions_dir().join(id)
    }

    pub fn version_json(&self, id: &str) -> PathBuf {
        self.version_dir(id).join(format!("{id}.json"))
    }

    pub fn version_jar(&self, id: &str) -> PathBuf {
        self.version_dir(id).join(format!("{id}.jar"))
    }

    pub fn natives_dir(&self, id: &str) -> PathBuf {
        self.version_dir(id).join("natives")
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.root.join("libraries")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join("assets")
    }

    pub fn asset_index(&self, index_id: &str) -> PathBuf {
        self.assets_dir()
            .join("indexes")
            .join(format!("{index_id}.json"))
    }

    /// Cached version catalog document.
    pub fn catalog_path(&self) -> PathBuf {
        self.root
            .join("cache")
            .join("json")
            .join("version_manifest.json")
    }

    pub fn installers_dir(&self) -> PathBuf {
        self.root.join("cache").join("installers")
    }

    pub fn launcher_profiles(&self) -> PathBuf {
        self.root.join("launcher_profiles.json")
    }
}

/// `%APPDATA%\.minecraft`, `~/Library/Application Support/minecraft` or `~/.minecraft`.
pub fn default_game_root() -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".minecraft")
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("minecraft")
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".minecraft")
    }
}

/// `true` when `path` is a regular file with no content.
///
/// A zero-byte artifact is what an interrupted download leaves behind.
pub fn is_zero_byte_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() == 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_files_are_keyed_by_id() {
        let game = GameDir::new("/games/mc");
        assert_eq!(
            game.version_json("1.20.1-forge-47.4.10"),
            PathBuf::from("/games/mc/versions/1.20.1-forge-47.4.10/1.20.1-forge-47.4.10.json")
        );
        assert_eq!(
            game.version_jar("1.20.1"),
            PathBuf::from("/games/mc/versions/1.20.1/1.20.1.jar")
        );
        assert_eq!(
            game.asset_index("5"),
            PathBuf::from("/games/mc/assets/indexes/5.json")
        );
        assert_eq!(
            game.catalog_path(),
            PathBuf::from("/games/mc/cache/json/version_manifest.json")
        );
    }

    #[test]
    fn zero_byte_detection() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.jar");
        let full = dir.path().join("full.jar");
        std::fs::write(&empty, b"").unwrap();
        std::fs::write(&full, b"PK").unwrap();

        assert!(is_zero_byte_file(&empty));
        assert!(!is_zero_byte_file(&full));
        assert!(!is_zero_byte_file(&dir.path().join("missing.jar")));
        assert!(!is_zero_byte_file(dir.path()));
    }
}
