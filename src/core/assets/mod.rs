mod asset_index;

pub use asset_index::{ensure_assets, load_or_fetch_index, AssetIndex, AssetObject};
