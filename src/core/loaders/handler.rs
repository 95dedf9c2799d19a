use async_trait::async_trait;
use tracing::warn;

use crate::core::error::LauncherResult;
use crate::core::launch::{EventSink, LoaderKind};
use crate::core::version::{
    is_zero_byte_file, reconcile_files, GameDir, MergeFlavor, ReconciledProfile,
};

use super::context::{LoaderServices, PrepareContext};
use super::fabric::{LightweightFlavor, LightweightHandler};
use super::forge::ForgeHandler;

#[async_trait]
pub trait LoaderHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Point `ctx.config.version` at a reconciled, launchable profile.
    async fn prepare(&self, ctx: PrepareContext<'_>) -> LauncherResult<()>;
}

/// Static dispatch over the supported loader families.
pub enum Handler {
    Lightweight(LightweightHandler),
    Heavyweight(ForgeHandler),
}

impl Handler {
    /// `None` for vanilla, which needs no preparation.
    pub fn for_loader(kind: LoaderKind, services: LoaderServices) -> Option<Self> {
        match kind {
            LoaderKind::Vanilla => None,
            LoaderKind::Fabric => Some(Self::Lightweight(LightweightHandler::new(
                LightweightFlavor::Fabric,
                services,
            ))),
            LoaderKind::Quilt => Some(Self::Lightweight(LightweightHandler::new(
                LightweightFlavor::Quilt,
                services,
            ))),
            LoaderKind::Forge => Some(Self::Heavyweight(ForgeHandler::new(services))),
        }
    }
}

#[async_trait]
impl LoaderHandler for Handler {
    fn name(&self) -> &'static str {
        match self {
            Handler::Lightweight(h) => h.name(),
            Handler::Heavyweight(h) => h.name(),
        }
    }

    async fn prepare(&self, ctx: PrepareContext<'_>) -> LauncherResult<()> {
        match self {
            Handler::Lightweight(h) => h.prepare(ctx).await,
            Handler::Heavyweight(h) => h.prepare(ctx).await,
        }
    }
}

/// Delete a zero-byte jar for `id`, and its profile JSON too when `with_profile`.
/// Returns whether anything was removed.
pub(crate) async fn purge_corrupt_profile(
    game: &GameDir,
    id: &str,
    with_profile: bool,
    events: &EventSink,
) -> bool {
    let jar = game.version_jar(id);
    if !is_zero_byte_file(&jar) {
        return false;
    }

    events.warn(format!("Cached jar for {id} is empty; removing it"));
    if let Err(err) = tokio::fs::remove_file(&jar).await {
        warn!("Could not remove {:?}: {}", jar, err);
    }
    if with_profile {
        let json = game.version_json(id);
        if json.exists() {
            if let Err(err) = tokio::fs::remove_file(&json).await {
                warn!("Could not remove {:?}: {}", json, err);
            }
        }
    }
    true
}

/// Reconcile `id` over `base_version`. Failures leave the profile as it is.
pub(crate) async fn reconcile_or_warn(
    game: &GameDir,
    id: &str,
    base_version: &str,
    flavor: MergeFlavor,
    events: &EventSink,
) -> Option<ReconciledProfile> {
    let base_path = game.version_json(base_version);
    if !base_path.exists() {
        events.warn(format!(
            "Base manifest {base_version} is missing; launching {id} unpatched"
        ));
        return None;
    }

    match reconcile_files(id, &game.version_json(id), &base_path, flavor).await {
        Ok(profile) => Some(profile),
        Err(err) => {
            events.warn(format!("Could not reconcile {id} with {base_version}: {err}"));
            None
        }
    }
}
