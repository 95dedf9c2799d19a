use std::path::{Path, PathBuf};

use crate::core::error::{LauncherError, LauncherResult};

const APP_DIR_NAME: &str = "blocklaunch";

/// How deep below a scan root the runtime folders live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootLayout {
    /// The root itself is a runtime home (e.g. `$JAVA_HOME`).
    Runtime,
    /// `root/<runtime>/bin/java`
    Direct,
    /// `root/<vendor>/<runtime>/bin/java`
    VendorGroup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRoot {
    pub path: PathBuf,
    pub layout: RootLayout,
}

impl ScanRoot {
    pub fn new(path: impl Into<PathBuf>, layout: RootLayout) -> Self {
        Self {
            path: path.into(),
            layout,
        }
    }
}

/// Directories owned by the launcher. Built once at startup and passed down.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    app_data_dir: PathBuf,
}

impl RuntimePaths {
    pub fn new(app_data_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_data_dir: app_data_dir.into(),
        }
    }

    /// Resolve the platform data directory and make sure it exists.
    pub fn discover() -> LauncherResult<Self> {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME);
        std::fs::create_dir_all(&data_dir).map_err(|source| LauncherError::Io {
            path: data_dir.clone(),
            source,
        })?;
        Ok(Self::new(data_dir))
    }

    pub fn app_data_dir(&self) -> &Path {
        &self.app_data_dir
    }

    /// Root of the runtimes this launcher downloads and owns.
    pub fn managed_root(&self) -> PathBuf {
        self.app_data_dir.join("runtimes")
    }
}

/// Installation roots that vendors and package managers use on this platform.
pub fn platform_scan_roots() -> Vec<ScanRoot> {
    let mut roots = Vec::new();

    if let Some(java_home) = std::env::var_os("JAVA_HOME") {
        roots.push(ScanRoot::new(java_home, RootLayout::Runtime));
    }

    let home = dirs::home_dir();
    if let Some(home) = &home {
        roots.push(ScanRoot::new(home.join(".jdks"), RootLayout::Direct));
        roots.push(ScanRoot::new(
            home.join(".sdkman").join("candidates").join("java"),
            RootLayout::Direct,
        ));
    }

    if cfg!(target_os = "windows") {
        for var in ["ProgramFiles", "ProgramFiles(x86)", "ProgramW6432"] {
            if let Some(dir) = std::env::var_os(var) {
                roots.push(ScanRoot::new(dir, RootLayout::VendorGroup));
            }
        }
    } else if cfg!(target_os = "macos") {
        roots.push(ScanRoot::new(
            "/Library/Java/JavaVirtualMachines",
            RootLayout::Direct,
        ));
        if let Some(home) = &home {
            roots.push(ScanRoot::new(
                home.join("Library").join("Java").join("JavaVirtualMachines"),
                RootLayout::Direct,
            ));
        }
    } else {
        for dir in ["/usr/lib/jvm", "/usr/lib64/jvm", "/usr/java", "/opt/java", "/opt/jdk"] {
            roots.push(ScanRoot::new(dir, RootLayout::Direct));
        }
        roots.push(ScanRoot::new("/opt", RootLayout::VendorGroup));
    }

    roots
}

pub fn java_exe() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}

/// Executable inside a runtime home, covering the macOS bundle layout.
pub fn java_binary_in(runtime_home: &Path) -> Option<PathBuf> {
    let primary = runtime_home.join("bin").join(java_exe());
    if primary.is_file() {
        return Some(primary);
    }

    let mac_layout = runtime_home
        .join("Contents")
        .join("Home")
        .join("bin")
        .join(java_exe());
    if mac_layout.is_file() {
        return Some(mac_layout);
    }

    None
}
