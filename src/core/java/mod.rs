pub mod locator;
pub mod paths;
pub mod provisioner;
pub mod version;

pub use locator::{is_compatible, RuntimeDescriptor, RuntimeLocator, RuntimeSource};
pub use paths::{RuntimePaths, ScanRoot};
pub use provisioner::{DownloadProgress, RuntimeArchive, RuntimeProvisioner, SessionState};
pub use version::required_java_for_minecraft_version;
