//! # Tilescape
//!
//! A raster tile compositing engine for interactive maps, inspired by the
//! canvas renderers of Leaflet and OpenLayers.
//!
//! Given a pyramid of pre-tiled imagery addressed by zoom/row/column, the
//! engine selects the tiles that satisfy an arbitrary viewport (center,
//! resolution, rotation), substitutes ancestor or descendant tiles while the
//! ideal tiles stream in, and composites everything onto a software canvas
//! with seam-free destination rectangles and time-bounded fade-ins.

pub mod core;
pub mod prelude;
pub mod rendering;
pub mod tiles;

// Re-export public API
pub use crate::core::{
    geo::{Extent, Point, TileCoord, TileRange},
    transform::Transform,
    viewport::{FrameState, ViewState},
};

pub use crate::tiles::{
    cache::TileCache,
    grid::{TileGrid, ZDirection},
    loader::{TileFetcher, TileLoader, TileLoaderConfig},
    source::{RasterTileSource, TileSource},
    tile::{Tile, TileImage, TileState},
};

pub use crate::rendering::{
    renderer::{TileLayerRenderer, TileRenderOptions},
    surface::Canvas,
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "http")]
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] image::error::ImageError),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("tile does not exist in the pyramid")]
    TileNotFound,

    #[error("Invalid tile grid: {0}")]
    InvalidGrid(String),
}
