//! Tile grid geometry: resolution pyramid and extent/index conversions

use crate::core::geo::{Extent, Point, TileCoord, TileRange};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Fraction of a tile used to keep floating point noise from pulling an
/// adjacent tile into a range whose edge lands exactly on a tile boundary
const TILE_FRACTION_EPSILON: f64 = 1e-6;

/// Tolerance when matching a view resolution against a pyramid level
const RESOLUTION_EPSILON: f64 = 1e-9;

/// Tie-break bias when a view resolution falls between two pyramid levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ZDirection {
    /// Snap to the lower zoom number (coarser tiles, scaled up)
    PreferLower,
    /// Snap to the higher zoom number (finer tiles, scaled down)
    #[default]
    PreferHigher,
}

/// Maps between projected map units and tile indices of a quad-tree
/// pyramid: a coverage extent, a strictly decreasing resolution per zoom
/// level, and a uniform tile pixel size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileGrid {
    extent: Extent,
    resolutions: Vec<f64>,
    tile_size: u32,
}

impl TileGrid {
    /// Creates a grid from an explicit resolution list.
    ///
    /// Resolutions are map units per tile pixel and must be strictly
    /// decreasing, one entry per zoom level starting at zero.
    pub fn new(extent: Extent, resolutions: Vec<f64>, tile_size: u32) -> Result<Self> {
        if extent.is_empty() {
            return Err(Error::InvalidGrid("empty grid extent".to_string()));
        }
        if resolutions.is_empty() {
            return Err(Error::InvalidGrid("no resolutions".to_string()));
        }
        if tile_size == 0 {
            return Err(Error::InvalidGrid("zero tile size".to_string()));
        }
        if resolutions.windows(2).any(|pair| pair[1] >= pair[0]) {
            return Err(Error::InvalidGrid(
                "resolutions must be strictly decreasing".to_string(),
            ));
        }
        Ok(Self {
            extent,
            resolutions,
            tile_size,
        })
    }

    /// Power-of-two pyramid covering `extent`: zoom 0 fits the extent width
    /// in a single tile row, and every level halves the resolution
    pub fn for_extent(extent: Extent, levels: u8, tile_size: u32) -> Self {
        let base = extent.width() / tile_size as f64;
        let resolutions = (0..levels.max(1))
            .map(|z| base / 2_f64.powi(z as i32))
            .collect();
        Self {
            extent,
            resolutions,
            tile_size,
        }
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Top-left corner of the grid; tile `(0, 0)` hangs off it
    pub fn origin(&self) -> Point {
        self.extent.top_left()
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn min_zoom(&self) -> u8 {
        0
    }

    pub fn max_zoom(&self) -> u8 {
        (self.resolutions.len() - 1) as u8
    }

    /// Resolution of the given zoom level in map units per tile pixel
    pub fn resolution(&self, z: u8) -> f64 {
        self.resolutions[z as usize]
    }

    /// Zoom level whose resolution satisfies the requested one.
    ///
    /// An exact match (within tolerance) wins outright; between two levels
    /// the `direction` decides, instead of rounding, so the choice is
    /// deterministic for any input.
    pub fn z_for_resolution(&self, resolution: f64, direction: ZDirection) -> u8 {
        for (z, &level) in self.resolutions.iter().enumerate() {
            if (level - resolution).abs() <= level * RESOLUTION_EPSILON {
                return z as u8;
            }
            if level < resolution {
                if z == 0 {
                    return 0;
                }
                return match direction {
                    ZDirection::PreferLower => (z - 1) as u8,
                    ZDirection::PreferHigher => z as u8,
                };
            }
        }
        self.max_zoom()
    }

    /// Number of tile columns/rows the grid extent spans at zoom `z`
    fn tiles_across(&self, z: u8) -> (i64, i64) {
        let tile_span = self.resolution(z) * self.tile_size as f64;
        let across_x = (self.extent.width() / tile_span - TILE_FRACTION_EPSILON).ceil() as i64;
        let across_y = (self.extent.height() / tile_span - TILE_FRACTION_EPSILON).ceil() as i64;
        (across_x.max(1), across_y.max(1))
    }

    /// Tile containing the given point at zoom `z`, clamped to the grid
    pub fn tile_coord_for_coord_and_z(&self, point: Point, z: u8) -> TileCoord {
        let origin = self.origin();
        let tile_span = self.resolution(z) * self.tile_size as f64;
        let (across_x, across_y) = self.tiles_across(z);
        let x = ((point.x - origin.x) / tile_span).floor() as i64;
        let y = ((origin.y - point.y) / tile_span).floor() as i64;
        TileCoord::new(
            x.clamp(0, across_x - 1) as u32,
            y.clamp(0, across_y - 1) as u32,
            z,
        )
    }

    /// Extent covered by a tile in map units
    pub fn tile_coord_extent(&self, coord: TileCoord) -> Extent {
        let origin = self.origin();
        let tile_span = self.resolution(coord.z) * self.tile_size as f64;
        let min_x = origin.x + coord.x as f64 * tile_span;
        let max_y = origin.y - coord.y as f64 * tile_span;
        Extent::new(min_x, max_y - tile_span, min_x + tile_span, max_y)
    }

    /// Tiles needed to cover `extent` at zoom `z`; empty input or an extent
    /// entirely outside the grid yields an empty range
    pub fn tile_range_for_extent_and_z(&self, extent: Extent, z: u8) -> TileRange {
        if extent.is_empty() {
            return TileRange::empty();
        }
        let origin = self.origin();
        let tile_span = self.resolution(z) * self.tile_size as f64;
        let (across_x, across_y) = self.tiles_across(z);

        let min_x = ((extent.min_x - origin.x) / tile_span + TILE_FRACTION_EPSILON).floor() as i64;
        let max_x =
            ((extent.max_x - origin.x) / tile_span - TILE_FRACTION_EPSILON).ceil() as i64 - 1;
        let min_y = ((origin.y - extent.max_y) / tile_span + TILE_FRACTION_EPSILON).floor() as i64;
        let max_y =
            ((origin.y - extent.min_y) / tile_span - TILE_FRACTION_EPSILON).ceil() as i64 - 1;

        if max_x < 0 || max_y < 0 || min_x >= across_x || min_y >= across_y {
            return TileRange::empty();
        }
        TileRange::new(
            min_x.clamp(0, across_x - 1) as u32,
            max_x.clamp(0, across_x - 1) as u32,
            min_y.clamp(0, across_y - 1) as u32,
            max_y.clamp(0, across_y - 1) as u32,
        )
    }

    /// Range of tiles at `z + 1` covering the footprint of `coord`, or
    /// `None` at the bottom of the pyramid
    pub fn child_tile_range(&self, coord: TileCoord) -> Option<TileRange> {
        if coord.z >= self.max_zoom() {
            return None;
        }
        let extent = self.tile_coord_extent(coord);
        Some(self.tile_range_for_extent_and_z(extent, coord.z + 1))
    }

    /// Visits every ancestor level of `coord` from `z - 1` down to zero with
    /// the tile range covering the coordinate's footprint at that level.
    ///
    /// Stops as soon as the callback returns `true` and reports whether the
    /// walk was stopped early.
    pub fn for_each_parent_tile_range<F>(&self, coord: TileCoord, mut f: F) -> bool
    where
        F: FnMut(u8, TileRange) -> bool,
    {
        let extent = self.tile_coord_extent(coord);
        let mut z = coord.z;
        while z > 0 {
            z -= 1;
            let range = self.tile_range_for_extent_and_z(extent, z);
            if f(z, range) {
                return true;
            }
        }
        false
    }
}
