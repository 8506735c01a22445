//! Tile pyramid building blocks: grid geometry, tile lifecycle, caching,
//! and asynchronous loading.

pub mod cache;
pub mod grid;
pub mod loader;
pub mod source;
pub mod tile;

pub use cache::TileCache;
pub use grid::{TileGrid, ZDirection};
pub use loader::{TileFetcher, TileLoader, TileLoaderConfig, TileResult};
#[cfg(feature = "http")]
pub use source::HttpTileFetcher;
pub use source::{RasterTileSource, TileSource};
pub use tile::{Tile, TileImage, TileState};
