use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, instrument};

use super::paths::{java_binary_in, platform_scan_roots, RootLayout, RuntimePaths, ScanRoot};
use super::version::{major_from_dir_name, parse_major_version, UNKNOWN_MAJOR};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeSource {
    Managed,
    System,
}

/// A Java executable found on disk. Recomputed on every query.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RuntimeDescriptor {
    /// Path to the `java` executable.
    pub path: PathBuf,
    pub major: u32,
    pub name: String,
    pub source: RuntimeSource,
}

/// Scans installation roots for Java runtimes.
#[derive(Debug, Clone)]
pub struct RuntimeLocator {
    roots: Vec<ScanRoot>,
    managed_root: PathBuf,
}

impl RuntimeLocator {
    /// Platform roots plus the launcher's managed runtime root.
    pub fn new(paths: &RuntimePaths) -> Self {
        Self::with_roots(platform_scan_roots(), paths.managed_root())
    }

    pub fn with_roots(roots: Vec<ScanRoot>, managed_root: impl Into<PathBuf>) -> Self {
        Self {
            roots,
            managed_root: managed_root.into(),
        }
    }

    pub fn managed_root(&self) -> &Path {
        &self.managed_root
    }

    /// Every runtime under every root, de-duplicated by executable path.
    ///
    /// A root that cannot be read is skipped; the rest still report.
    #[instrument(skip(self))]
    pub fn scan_all(&self) -> Vec<RuntimeDescriptor> {
        let managed = ScanRoot::new(self.managed_root.clone(), RootLayout::VendorGroup);
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        let sources = std::iter::once((&managed, RuntimeSource::Managed))
            .chain(self.roots.iter().map(|root| (root, RuntimeSource::System)));

        for (root, source) in sources {
            for descriptor in scan_root(root, source) {
                let key = std::fs::canonicalize(&descriptor.path)
                    .unwrap_or_else(|_| descriptor.path.clone());
                if seen.insert(key) {
                    found.push(descriptor);
                }
            }
        }

        debug!("Runtime scan found {} installations", found.len());
        found
    }

    /// Best runtime for `required_major`, or `None` when nothing qualifies.
    pub fn find_compatible(&self, required_major: u32) -> Option<RuntimeDescriptor> {
        select_compatible(self.scan_all(), required_major)
    }

    /// Runtimes for `major` that live under the managed root.
    pub fn find_managed(&self, major: u32) -> Vec<RuntimeDescriptor> {
        let managed = ScanRoot::new(self.managed_root.clone(), RootLayout::VendorGroup);
        scan_root(&managed, RuntimeSource::Managed)
            .into_iter()
            .filter(|descriptor| descriptor.major == major)
            .collect()
    }
}

/// Java 8 is only satisfied by Java 8; anything newer accepts any major at or above it.
pub fn is_compatible(detected_major: u32, required_major: u32) -> bool {
    if detected_major == UNKNOWN_MAJOR {
        return false;
    }
    if required_major == 8 {
        return detected_major == 8;
    }
    detected_major >= required_major
}

/// Smallest qualifying major wins; managed runtimes win ties.
pub fn select_compatible(
    candidates: Vec<RuntimeDescriptor>,
    required_major: u32,
) -> Option<RuntimeDescriptor> {
    candidates
        .into_iter()
        .filter(|candidate| is_compatible(candidate.major, required_major))
        .min_by(|a, b| {
            a.major
                .cmp(&b.major)
                .then(a.source.cmp(&b.source))
                .then_with(|| a.path.cmp(&b.path))
        })
}

fn scan_root(root: &ScanRoot, source: RuntimeSource) -> Vec<RuntimeDescriptor> {
    match root.layout {
        RootLayout::Runtime => root_as_runtime(&root.path, None, source)
            .into_iter()
            .collect(),
        RootLayout::Direct => runtime_homes(&root.path)
            .into_iter()
            .filter_map(|home| root_as_runtime(&home, None, source))
            .collect(),
        RootLayout::VendorGroup => runtime_homes(&root.path)
            .into_iter()
            .flat_map(|vendor| {
                let vendor_name = dir_name(&vendor);
                runtime_homes(&vendor)
                    .into_iter()
                    .filter_map(move |home| root_as_runtime(&home, vendor_name.as_deref(), source))
            })
            .collect(),
    }
}

fn root_as_runtime(
    home: &Path,
    vendor: Option<&str>,
    source: RuntimeSource,
) -> Option<RuntimeDescriptor> {
    let path = java_binary_in(home)?;
    let folder = dir_name(home)?;
    let major = match major_from_dir_name(&folder) {
        UNKNOWN_MAJOR => major_from_release_file(home),
        major => major,
    };
    let name = match vendor {
        Some(vendor) => format!("{vendor}/{folder}"),
        None => folder,
    };

    Some(RuntimeDescriptor {
        path,
        major,
        name,
        source,
    })
}

/// `JAVA_VERSION="17.0.8"` from the `release` file every JDK build ships.
fn major_from_release_file(home: &Path) -> u32 {
    [home.join("release"), home.join("Contents").join("Home").join("release")]
        .iter()
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .flat_map(|raw| {
            raw.lines()
                .filter_map(|line| line.strip_prefix("JAVA_VERSION="))
                .map(|value| parse_major_version(value.trim_matches('"')))
                .collect::<Vec<_>>()
        })
        .find(|major| *major != UNKNOWN_MAJOR)
        .unwrap_or(UNKNOWN_MAJOR)
}

/// Child directories of `dir`; an unreadable directory yields nothing.
fn runtime_homes(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!("Skipping runtime root {:?}: {}", dir, err);
            return Vec::new();
        }
    };

    let mut homes: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    homes.sort();
    homes
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::java::paths::java_exe;

    fn fake_runtime(home: &Path) -> PathBuf {
        let bin = home.join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let exe = bin.join(java_exe());
        std::fs::write(&exe, b"").unwrap();
        exe
    }

    fn descriptor(major: u32, source: RuntimeSource, path: &str) -> RuntimeDescriptor {
        RuntimeDescriptor {
            path: PathBuf::from(path),
            major,
            name: path.to_string(),
            source,
        }
    }

    #[test]
    fn java_8_requires_exact_match() {
        assert!(is_compatible(8, 8));
        assert!(!is_compatible(11, 8));
        assert!(!is_compatible(17, 8));
        assert!(!is_compatible(UNKNOWN_MAJOR, 8));
    }

    #[test]
    fn modern_requirements_accept_newer_majors() {
        assert!(is_compatible(17, 17));
        assert!(is_compatible(21, 17));
        assert!(!is_compatible(11, 17));
        assert!(!is_compatible(UNKNOWN_MAJOR, 17));
        assert!(!is_compatible(UNKNOWN_MAJOR, 0));
    }

    #[test]
    fn never_selects_below_required_major() {
        let majors = [0, 8, 11, 16, 17, 20, 21, 22];
        for required in [8, 11, 16, 17, 21, 25] {
            let candidates = majors
                .iter()
                .map(|m| descriptor(*m, RuntimeSource::System, &format!("/jvm/{m}")))
                .collect();
            if let Some(selected) = select_compatible(candidates, required) {
                if required == 8 {
                    assert_eq!(selected.major, 8);
                } else {
                    assert!(selected.major >= required);
                }
            }
        }
    }

    #[test]
    fn prefers_smallest_qualifying_major() {
        let candidates = vec![
            descriptor(21, RuntimeSource::System, "/jvm/21"),
            descriptor(17, RuntimeSource::System, "/jvm/17"),
        ];
        let selected = select_compatible(candidates, 17).unwrap();
        assert_eq!(selected.major, 17);
    }

    #[test]
    fn managed_runtime_wins_a_tie() {
        let candidates = vec![
            descriptor(17, RuntimeSource::System, "/a/17"),
            descriptor(17, RuntimeSource::Managed, "/z/17"),
        ];
        let selected = select_compatible(candidates, 17).unwrap();
        assert_eq!(selected.source, RuntimeSource::Managed);
    }

    #[test]
    fn scans_direct_and_vendor_group_roots() {
        let dir = tempfile::tempdir().unwrap();
        let direct = dir.path().join("jvm");
        let group = dir.path().join("programs");
        let managed = dir.path().join("managed");

        fake_runtime(&direct.join("jdk-17.0.9"));
        fake_runtime(&group.join("Eclipse Adoptium").join("jdk-21.0.2-hotspot"));
        fake_runtime(&managed.join("java8").join("jdk8u392-b08-jre"));
        std::fs::create_dir_all(direct.join("not-a-runtime")).unwrap();

        let locator = RuntimeLocator::with_roots(
            vec![
                ScanRoot::new(&direct, RootLayout::Direct),
                ScanRoot::new(&group, RootLayout::VendorGroup),
                ScanRoot::new(dir.path().join("missing"), RootLayout::Direct),
            ],
            &managed,
        );

        let mut found = locator.scan_all();
        found.sort_by_key(|d| d.major);
        let majors: Vec<u32> = found.iter().map(|d| d.major).collect();
        assert_eq!(majors, vec![8, 17, 21]);
        assert_eq!(found[0].source, RuntimeSource::Managed);
        assert_eq!(found[2].name, "Eclipse Adoptium/jdk-21.0.2-hotspot");
    }

    #[test]
    fn release_file_names_the_major_of_plain_folders() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("jvm").join("default-runtime");
        fake_runtime(&home);
        std::fs::write(
            home.join("release"),
            "IMPLEMENTOR=\"Eclipse Adoptium\"\nJAVA_VERSION=\"17.0.10\"\n",
        )
        .unwrap();

        let locator = RuntimeLocator::with_roots(
            vec![ScanRoot::new(dir.path().join("jvm"), RootLayout::Direct)],
            dir.path().join("managed"),
        );

        let found = locator.find_compatible(17).unwrap();
        assert_eq!(found.major, 17);
        assert_eq!(found.name, "default-runtime");
    }

    #[test]
    fn duplicate_roots_do_not_duplicate_results() {
        let dir = tempfile::tempdir().unwrap();
        let direct = dir.path().join("jvm");
        fake_runtime(&direct.join("jdk-17"));

        let locator = RuntimeLocator::with_roots(
            vec![
                ScanRoot::new(&direct, RootLayout::Direct),
                ScanRoot::new(&direct, RootLayout::Direct),
                ScanRoot::new(direct.join("jdk-17"), RootLayout::Runtime),
            ],
            dir.path().join("managed"),
        );

        assert_eq!(locator.scan_all().len(), 1);
    }

    #[test]
    fn find_compatible_skips_unknown_versions() {
        let dir = tempfile::tempdir().unwrap();
        let direct = dir.path().join("jvm");
        fake_runtime(&direct.join("default-java"));
        fake_runtime(&direct.join("jdk-21"));

        let locator = RuntimeLocator::with_roots(
            vec![ScanRoot::new(&direct, RootLayout::Direct)],
            dir.path().join("managed"),
        );

        let selected = locator.find_compatible(17).unwrap();
        assert_eq!(selected.major, 21);
        assert!(locator.find_compatible(8).is_none());
    }
}
