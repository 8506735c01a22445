//! Tile sources: the capability the renderer draws from, plus the concrete
//! cache-backed implementation and the HTTP fetcher.

use crate::core::geo::{TileCoord, TileRange};
use crate::prelude::{Arc, HashSet};
use crate::tiles::cache::TileCache;
use crate::tiles::grid::TileGrid;
use crate::tiles::loader::{TileFetcher, TileLoader, TileLoaderConfig};
use crate::tiles::tile::{Tile, TileState};
use crate::{Error, Result};

/// Everything the renderer needs from a supplier of tiles.
///
/// `get_tile` must be idempotent per coordinate within a frame: repeated
/// calls return the same cached tile instance. Tile state is only ever
/// flipped through `process_results` on the render thread, never
/// concurrently by the loader.
pub trait TileSource {
    /// Grid geometry of the pyramid this source serves
    fn grid(&self) -> &TileGrid;

    /// Tile for a coordinate, created idle on first request
    fn get_tile(&mut self, coord: TileCoord) -> &mut Tile;

    /// Visits every cached loaded tile inside `range` at zoom `z` and
    /// reports whether the range was fully covered by loaded tiles
    fn for_each_loaded_tile(
        &mut self,
        z: u8,
        range: TileRange,
        f: &mut dyn FnMut(&Tile),
    ) -> bool;

    /// Schedule loading of an idle tile
    fn enqueue(&mut self, coord: TileCoord);

    /// Apply finished loader results to tile state
    fn process_results(&mut self);

    /// Expire cached tiles down to capacity, sparing the used set and
    /// keeping room for at least `wanted` tiles
    fn expire_cache(&mut self, used: &HashSet<TileCoord>, wanted: usize);

    /// Monotonic change counter; bumping it invalidates cached tiles
    fn revision(&self) -> u64;

    /// Whether tiles fully cover their footprint with opaque pixels
    fn opaque(&self) -> bool {
        true
    }

    /// Border padding baked into tile images, in tile pixels
    fn gutter(&self) -> u32 {
        0
    }

    /// Ratio between tile image pixels and display pixels
    fn tile_pixel_ratio(&self, pixel_ratio: f64) -> f64 {
        let _ = pixel_ratio;
        1.0
    }

    /// Size of a tile image at zoom `z` in device pixels
    fn tile_pixel_size(&self, z: u8, pixel_ratio: f64) -> [f64; 2] {
        let _ = z;
        let size = (self.grid().tile_size() as f64 * self.tile_pixel_ratio(pixel_ratio)).round();
        [size, size]
    }
}

/// Cache-backed tile source fed by a background loader.
///
/// Owns the grid, the LRU cache and the worker pool; assigns every tile a
/// unique id so downstream fade bookkeeping survives eviction and
/// recreation of a tile at the same coordinate.
pub struct RasterTileSource {
    grid: TileGrid,
    cache: TileCache,
    loader: TileLoader,
    revision: u64,
    next_tile_id: u64,
    gutter: u32,
    opaque: bool,
    tile_pixel_ratio: f64,
}

impl RasterTileSource {
    pub fn new(grid: TileGrid, fetcher: Arc<dyn TileFetcher>, config: TileLoaderConfig) -> Self {
        Self {
            grid,
            cache: TileCache::with_default_capacity(),
            loader: TileLoader::new(fetcher, config),
            revision: 0,
            next_tile_id: 1,
            gutter: 0,
            opaque: true,
            tile_pixel_ratio: 1.0,
        }
    }

    pub fn with_cache_size(mut self, capacity: usize) -> Self {
        self.cache = TileCache::new(capacity);
        self
    }

    pub fn with_gutter(mut self, gutter: u32) -> Self {
        self.gutter = gutter;
        self
    }

    pub fn with_opaque(mut self, opaque: bool) -> Self {
        self.opaque = opaque;
        self
    }

    /// For retina tile sets whose images are denser than the display
    pub fn with_tile_pixel_ratio(mut self, ratio: f64) -> Self {
        self.tile_pixel_ratio = ratio;
        self
    }

    /// Invalidate all cached tiles. Loaded generations stay available as
    /// interim tiles until their replacements load.
    pub fn refresh(&mut self) {
        self.revision += 1;
        log::debug!("tile source refreshed, revision {}", self.revision);
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }
}

impl TileSource for RasterTileSource {
    fn grid(&self) -> &TileGrid {
        &self.grid
    }

    fn get_tile(&mut self, coord: TileCoord) -> &mut Tile {
        let current = matches!(
            self.cache.peek(&coord),
            Some(tile) if tile.revision() == self.revision
        );
        if !current {
            // stale or missing: create a fresh tile, keeping the old loaded
            // generation reachable as interim
            let interim = self.cache.remove(&coord).and_then(Tile::into_interim);
            let mut tile = Tile::new(self.next_tile_id, coord, self.revision);
            self.next_tile_id += 1;
            tile.set_interim(interim);
            self.cache.insert(coord, tile);
        }
        self.cache
            .get_mut(&coord)
            .expect("tile was just inserted or verified present")
    }

    fn for_each_loaded_tile(
        &mut self,
        z: u8,
        range: TileRange,
        f: &mut dyn FnMut(&Tile),
    ) -> bool {
        if range.is_empty() {
            return false;
        }
        let mut covered = true;
        for (x, y) in range.iter() {
            let coord = TileCoord::new(x, y, z);
            match self.cache.get(&coord) {
                Some(tile) if tile.state() == TileState::Loaded => f(tile),
                _ => covered = false,
            }
        }
        covered
    }

    fn enqueue(&mut self, coord: TileCoord) {
        if let Some(tile) = self.cache.get_mut(&coord) {
            if tile.state() == TileState::Idle {
                tile.start_loading();
                self.loader.enqueue(coord);
            }
        }
    }

    fn process_results(&mut self) {
        for result in self.loader.drain() {
            let Some(tile) = self.cache.get_mut(&result.coord) else {
                // evicted while loading; the result is stale
                continue;
            };
            if tile.state() != TileState::Loading {
                continue;
            }
            match result.data {
                Ok(image) => tile.finish_loading(Arc::new(image)),
                Err(Error::TileNotFound) => tile.mark_empty(),
                Err(error) => {
                    log::warn!("failed to load tile {}: {}", result.coord, error);
                    tile.fail();
                }
            }
        }
    }

    fn expire_cache(&mut self, used: &HashSet<TileCoord>, wanted: usize) {
        self.cache.ensure_capacity(wanted);
        self.cache.expire(used);
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn opaque(&self) -> bool {
        self.opaque
    }

    fn gutter(&self) -> u32 {
        self.gutter
    }

    fn tile_pixel_ratio(&self, _pixel_ratio: f64) -> f64 {
        self.tile_pixel_ratio
    }
}

/// Shared blocking HTTP client with a custom User-Agent so that public tile
/// servers don't reject the request. Building the client once avoids the
/// cost of TLS and connection pool setup for every tile.
#[cfg(feature = "http")]
pub(crate) static HTTP_CLIENT: once_cell::sync::Lazy<reqwest::blocking::Client> =
    once_cell::sync::Lazy::new(|| {
        reqwest::blocking::Client::builder()
            .user_agent("tilescape/0.1 (+https://github.com/PoHsuanLai/tilescape)")
            .build()
            .expect("failed to build reqwest blocking client")
    });

/// Fetches tiles from an XYZ tile server and decodes them.
///
/// The URL template uses `{z}`, `{x}`, `{y}` and optionally `{s}` for
/// subdomain rotation.
#[cfg(feature = "http")]
pub struct HttpTileFetcher {
    url_template: String,
    subdomains: Vec<String>,
}

#[cfg(feature = "http")]
impl HttpTileFetcher {
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            subdomains: Vec::new(),
        }
    }

    pub fn with_subdomains(mut self, subdomains: Vec<String>) -> Self {
        self.subdomains = subdomains;
        self
    }

    /// Fetcher for the public OpenStreetMap tile servers
    pub fn openstreetmap() -> Self {
        Self::new("https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png").with_subdomains(vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
        ])
    }

    fn url(&self, coord: TileCoord) -> String {
        let mut url = self
            .url_template
            .replace("{z}", &coord.z.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string());
        if url.contains("{s}") {
            let subdomain = if self.subdomains.is_empty() {
                ""
            } else {
                let index = ((coord.x + coord.y) as usize) % self.subdomains.len();
                self.subdomains[index].as_str()
            };
            url = url.replace("{s}", subdomain);
        }
        url
    }
}

#[cfg(feature = "http")]
impl TileFetcher for HttpTileFetcher {
    fn fetch(&self, coord: TileCoord) -> Result<crate::tiles::tile::TileImage> {
        let url = self.url(coord);
        let response = HTTP_CLIENT.get(&url).send()?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::TileNotFound);
        }
        if !response.status().is_success() {
            return Err(Error::Http(format!("HTTP {} for {}", response.status(), url)));
        }
        let bytes = response.bytes()?;
        crate::tiles::tile::TileImage::decode(&bytes)
    }
}
