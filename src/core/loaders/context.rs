use crate::core::downloader::Downloader;
use crate::core::launch::{EventSink, LaunchConfig, LaunchOptions};
use crate::core::version::VersionBootstrapper;

/// Everything a handler sees during one `prepare` call.
pub struct PrepareContext<'a> {
    pub options: &'a LaunchOptions,
    pub config: &'a mut LaunchConfig,
    pub events: &'a EventSink,
}

/// Network collaborators shared by the loader handlers.
#[derive(Debug, Clone)]
pub struct LoaderServices {
    pub downloader: Downloader,
    pub bootstrapper: VersionBootstrapper,
}

impl LoaderServices {
    pub fn new(downloader: Downloader) -> Self {
        Self {
            bootstrapper: VersionBootstrapper::new(downloader.clone()),
            downloader,
        }
    }
}
