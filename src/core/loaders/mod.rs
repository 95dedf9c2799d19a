pub mod context;
pub mod fabric;
pub mod forge;
pub mod handler;

pub use context::{LoaderServices, PrepareContext};
pub use fabric::{LightweightFlavor, LightweightHandler};
pub use forge::ForgeHandler;
pub use handler::{Handler, LoaderHandler};
