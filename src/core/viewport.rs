use crate::core::geo::{Extent, Point, TileCoord};
use crate::prelude::HashSet;
use serde::{Deserialize, Serialize};

/// Snapshot of the current view: projected center, resolution in map units
/// per display pixel, and rotation in radians
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub center: Point,
    pub resolution: f64,
    pub rotation: f64,
}

impl ViewState {
    pub fn new(center: Point, resolution: f64) -> Self {
        Self {
            center,
            resolution,
            rotation: 0.0,
        }
    }

    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = rotation;
        self
    }
}

/// Ephemeral per-frame record handed to the renderer on every animation
/// frame and rebuilt by the host for the next one.
///
/// The renderer accumulates the tiles it drew (`used_tiles`) and the tiles
/// it wants kept loading (`wanted_tiles`) here, and raises `animate` when a
/// fade is still in progress so the host schedules another frame.
#[derive(Debug, Clone)]
pub struct FrameState {
    pub view: ViewState,
    /// Viewport size in display pixels
    pub size: [u32; 2],
    /// Device pixel ratio of the display
    pub pixel_ratio: f64,
    /// Frame clock in milliseconds; must be monotonic across frames
    pub time: f64,
    /// Set by the renderer when another frame should be scheduled
    pub animate: bool,
    /// Tiles drawn or retained this frame; protected from cache expiry
    pub used_tiles: HashSet<TileCoord>,
    /// Tiles within the preload margin that should finish loading
    pub wanted_tiles: HashSet<TileCoord>,
}

impl FrameState {
    pub fn new(view: ViewState, size: [u32; 2], pixel_ratio: f64, time: f64) -> Self {
        Self {
            view,
            size,
            pixel_ratio,
            time,
            animate: false,
            used_tiles: HashSet::default(),
            wanted_tiles: HashSet::default(),
        }
    }

    /// Extent covered by the viewport in map units
    pub fn extent(&self) -> Extent {
        Extent::for_view_and_size(
            self.view.center,
            self.view.resolution,
            self.view.rotation,
            self.size,
        )
    }
}
