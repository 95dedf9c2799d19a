pub mod args;
pub mod backend;
pub mod classify;
pub mod classpath;
pub mod event;
pub mod options;
pub mod orchestrator;
pub mod process;

pub use backend::{BackendEvent, LaunchBackend, ProcessBackend};
pub use classify::{classify, Diagnosis, ErrorKind};
pub use event::{EventSink, LaunchEvent, LogLevel, CANCELLED_EXIT_CODE};
pub use options::{
    GameVersion, LaunchConfig, LaunchOptions, LoaderKind, MemoryBounds, ServerAddress, WindowSize,
};
pub use orchestrator::{LaunchOrchestrator, LaunchServices};
pub use process::{kill_tree, GameProcess};
