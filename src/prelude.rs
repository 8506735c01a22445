//! Prelude module for common tilescape types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use tilescape::prelude::*;`

pub use crate::core::{
    geo::{Extent, Point, TileCoord, TileRange},
    transform::Transform,
    viewport::{FrameState, ViewState},
};

pub use crate::tiles::{
    cache::TileCache,
    grid::{TileGrid, ZDirection},
    loader::{TileFetcher, TileLoader, TileLoaderConfig, TileResult},
    source::{RasterTileSource, TileSource},
    tile::{Tile, TileImage, TileState},
};

#[cfg(feature = "http")]
pub use crate::tiles::source::HttpTileFetcher;

pub use crate::rendering::{
    renderer::{
        Presentation, SelectedTile, TileLayerRenderer, TileRenderOptions, TileSelection, TilesByZ,
    },
    surface::Canvas,
    transition::TransitionTracker,
};

pub use crate::{Error, Result};

pub use std::{
    sync::Arc,
    time::{Duration, Instant},
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
