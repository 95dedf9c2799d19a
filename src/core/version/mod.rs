pub mod bootstrap;
pub mod layout;
pub mod manifest;
pub mod reconcile;
pub mod version_file;

pub use bootstrap::VersionBootstrapper;
pub use layout::{default_game_root, is_zero_byte_file, GameDir};
pub use manifest::{VersionCatalog, VersionEntry};
pub use reconcile::{reconcile, reconcile_files, MergeFlavor, ReconciledProfile};
pub use version_file::{resolve_with_inheritance, LibraryEntry, VersionJson};
