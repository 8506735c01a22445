//! Tile lifecycle and raster payload types

use crate::core::geo::TileCoord;
use crate::prelude::Arc;
use crate::Result;

/// Lifecycle state of a tile.
///
/// Transitions are driven by the owning source: `Idle` → `Loading` when the
/// tile is handed to the loader, then `Loaded`, `Error` or `Empty` depending
/// on the fetch outcome. The renderer only ever reads the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileState {
    /// Created but not yet scheduled for loading
    Idle,
    /// Handed to the loader; a result will arrive on a later frame
    Loading,
    /// Raster payload available
    Loaded,
    /// Fetch failed terminally (after retries)
    Error,
    /// The pyramid has no data for this coordinate
    Empty,
}

/// Decoded RGBA8 raster payload of a tile, shared via `Arc` between the
/// cache and the per-frame draw sets
#[derive(Debug, Clone, PartialEq)]
pub struct TileImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl TileImage {
    /// Wraps raw RGBA8 pixels; `data` length must be `width * height * 4`
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Self {
        assert_eq!(
            data.len(),
            (width * height * 4) as usize,
            "RGBA byte length does not match dimensions"
        );
        Self {
            width,
            height,
            data,
        }
    }

    /// Single-color image, handy for placeholders and tests
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Decodes encoded image bytes (PNG, JPEG, ...) into RGBA8
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = decoded.dimensions();
        Ok(Self {
            width,
            height,
            data: decoded.into_raw(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Pixel at `(x, y)`, or `None` outside the image
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 4) as usize;
        Some([self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]])
    }
}

/// A unit of raster content in the pyramid.
///
/// Tiles are owned by their source's cache and always re-resolved by
/// coordinate each frame; the renderer never keeps one across frames. The
/// `interim` link points at the previously loaded generation of the *same*
/// coordinate, kept alive across a source refresh so something can be drawn
/// while the replacement loads.
#[derive(Debug)]
pub struct Tile {
    id: u64,
    coord: TileCoord,
    state: TileState,
    revision: u64,
    image: Option<Arc<TileImage>>,
    interim: Option<Box<Tile>>,
}

impl Tile {
    pub(crate) fn new(id: u64, coord: TileCoord, revision: u64) -> Self {
        Self {
            id,
            coord,
            state: TileState::Idle,
            revision,
            image: None,
            interim: None,
        }
    }

    /// Store-assigned identity, unique across evictions and refreshes
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    pub fn state(&self) -> TileState {
        self.state
    }

    /// Source revision this tile was created under
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn image(&self) -> Option<&Arc<TileImage>> {
        self.image.as_ref()
    }

    /// Nearest loaded tile along the interim chain, or `self` when none of
    /// the older generations is loaded either
    pub fn interim_or_self(&self) -> &Tile {
        if self.state == TileState::Loaded {
            return self;
        }
        let mut current = self.interim.as_deref();
        while let Some(tile) = current {
            if tile.state == TileState::Loaded {
                return tile;
            }
            current = tile.interim.as_deref();
        }
        self
    }

    pub(crate) fn set_interim(&mut self, interim: Option<Box<Tile>>) {
        self.interim = interim;
    }

    /// Collapses this tile into an interim for its replacement: the nearest
    /// loaded generation survives, everything stale is dropped
    pub(crate) fn into_interim(mut self) -> Option<Box<Tile>> {
        loop {
            if self.state == TileState::Loaded {
                self.interim = None;
                return Some(Box::new(self));
            }
            match self.interim.take() {
                Some(older) => self = *older,
                None => return None,
            }
        }
    }

    pub fn start_loading(&mut self) {
        self.state = TileState::Loading;
    }

    pub fn finish_loading(&mut self, image: Arc<TileImage>) {
        self.image = Some(image);
        self.state = TileState::Loaded;
    }

    pub fn fail(&mut self) {
        self.state = TileState::Error;
    }

    pub fn mark_empty(&mut self) {
        self.state = TileState::Empty;
    }
}
