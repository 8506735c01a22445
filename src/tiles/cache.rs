//! In-memory tile cache with used-set aware LRU expiry

use crate::core::geo::TileCoord;
use crate::prelude::HashSet;
use crate::tiles::tile::Tile;
use lru::LruCache;

/// LRU tile cache keyed by coordinate.
///
/// Unlike a hard-capped LRU, insertion never evicts: eviction happens only
/// in [`TileCache::expire`], which runs once per frame after drawing and
/// never removes a tile the current frame marked as used. The soft capacity
/// can be raised per frame so the cache always holds at least the wanted
/// tile count of the visible pyramid.
#[derive(Debug)]
pub struct TileCache {
    tiles: LruCache<TileCoord, Tile>,
    capacity: usize,
}

impl TileCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            tiles: LruCache::unbounded(),
            capacity: capacity.max(1),
        }
    }

    /// Create a new tile cache with default capacity (1024 tiles)
    pub fn with_default_capacity() -> Self {
        Self::new(1024)
    }

    /// Get a tile, marking it as recently used
    pub fn get(&mut self, coord: &TileCoord) -> Option<&Tile> {
        self.tiles.get(coord).map(|tile| &*tile)
    }

    pub fn get_mut(&mut self, coord: &TileCoord) -> Option<&mut Tile> {
        self.tiles.get_mut(coord)
    }

    /// Look at a tile without touching its recency
    pub fn peek(&self, coord: &TileCoord) -> Option<&Tile> {
        self.tiles.peek(coord)
    }

    pub fn insert(&mut self, coord: TileCoord, tile: Tile) {
        self.tiles.put(coord, tile);
    }

    pub fn remove(&mut self, coord: &TileCoord) -> Option<Tile> {
        self.tiles.pop(coord)
    }

    pub fn contains(&self, coord: &TileCoord) -> bool {
        self.tiles.contains(coord)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Raise the soft capacity to at least `wanted` entries
    pub fn ensure_capacity(&mut self, wanted: usize) {
        self.capacity = self.capacity.max(wanted);
    }

    /// Drop least-recently-used tiles while over capacity.
    ///
    /// Stops at the first least-recently-used entry that is in the `used`
    /// set: everything more recent was touched at least as recently, so
    /// nothing evictable remains beyond it.
    pub fn expire(&mut self, used: &HashSet<TileCoord>) {
        while self.tiles.len() > self.capacity {
            let coord = match self.tiles.peek_lru() {
                Some((coord, _)) if !used.contains(coord) => *coord,
                _ => break,
            };
            if self.tiles.pop(&coord).is_some() {
                log::debug!("evicted tile {}", coord);
            }
        }
    }

    pub fn clear(&mut self) {
        self.tiles.clear();
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(x: u32, y: u32, z: u8) -> Tile {
        Tile::new((z as u64) << 32 | (x as u64) << 16 | y as u64, TileCoord::new(x, y, z), 0)
    }

    #[test]
    fn test_tile_cache_basic_operations() {
        let mut cache = TileCache::new(2);
        let coord1 = TileCoord::new(1, 2, 3);
        let coord2 = TileCoord::new(4, 5, 6);

        // Initially empty
        assert!(cache.is_empty());
        assert_eq!(cache.len(), 0);

        // Insert and retrieve
        cache.insert(coord1, tile(1, 2, 3));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&coord1));
        assert_eq!(cache.get(&coord1).map(|t| t.coord()), Some(coord1));

        // Insert second item; no eviction on insert even at capacity
        cache.insert(coord2, tile(4, 5, 6));
        cache.insert(TileCoord::new(7, 7, 7), tile(7, 7, 7));
        assert_eq!(cache.len(), 3);

        // Clear cache
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expire_evicts_least_recently_used() {
        let mut cache = TileCache::new(2);
        let coords = [
            TileCoord::new(1, 1, 1),
            TileCoord::new(2, 2, 2),
            TileCoord::new(3, 3, 3),
        ];
        for c in coords {
            cache.insert(c, tile(c.x, c.y, c.z));
        }

        cache.expire(&HashSet::default());
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&coords[0])); // Evicted
        assert!(cache.contains(&coords[1]));
        assert!(cache.contains(&coords[2]));
    }

    #[test]
    fn test_expire_spares_used_tiles() {
        let mut cache = TileCache::new(1);
        let old = TileCoord::new(1, 1, 1);
        let newer = TileCoord::new(2, 2, 2);
        cache.insert(old, tile(1, 1, 1));
        cache.insert(newer, tile(2, 2, 2));

        // the LRU entry is in use, so expiry must leave the cache alone
        let mut used = HashSet::default();
        used.insert(old);
        cache.expire(&used);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&old));
    }

    #[test]
    fn test_ensure_capacity_only_grows() {
        let mut cache = TileCache::new(4);
        cache.ensure_capacity(16);
        assert_eq!(cache.capacity(), 16);
        cache.ensure_capacity(2);
        assert_eq!(cache.capacity(), 16);
    }

    #[test]
    fn test_peek_does_not_promote() {
        let mut cache = TileCache::new(1);
        let a = TileCoord::new(1, 0, 1);
        let b = TileCoord::new(0, 1, 1);
        cache.insert(a, tile(1, 0, 1));
        cache.insert(b, tile(0, 1, 1));

        // peeking at `a` must not save it from expiry
        assert!(cache.peek(&a).is_some());
        cache.expire(&HashSet::default());
        assert!(!cache.contains(&a));
        assert!(cache.contains(&b));
    }
}
