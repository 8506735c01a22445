use serde::{Deserialize, Serialize};

/// Represents a point in projected map units or pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn subtract(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn multiply(&self, scalar: f64) -> Point {
        Point::new(self.x * scalar, self.y * scalar)
    }

    pub fn floor(&self) -> Point {
        Point::new(self.x.floor(), self.y.floor())
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Axis-aligned rectangle in projected map units: `[min_x, min_y, max_x, max_y]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// An extent that contains nothing and intersects nothing
    pub fn empty() -> Self {
        Self::new(f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY)
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Top-left corner, with y growing downward from it
    pub fn top_left(&self) -> Point {
        Point::new(self.min_x, self.max_y)
    }

    pub fn contains_point(&self, point: &Point) -> bool {
        point.x >= self.min_x
            && point.x <= self.max_x
            && point.y >= self.min_y
            && point.y <= self.max_y
    }

    pub fn contains_extent(&self, other: &Extent) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && self.max_x >= other.max_x
            && self.max_y >= other.max_y
    }

    pub fn intersects(&self, other: &Extent) -> bool {
        !(other.max_x < self.min_x
            || other.min_x > self.max_x
            || other.max_y < self.min_y
            || other.min_y > self.max_y)
    }

    /// Returns the intersection with another extent, possibly empty
    pub fn intersection(&self, other: &Extent) -> Extent {
        Extent::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        )
    }

    /// Extent covered by a viewport with the given center, resolution
    /// (map units per pixel), rotation in radians, and pixel size.
    ///
    /// For a rotated view this is the axis-aligned bounding box of the
    /// rotated viewport rectangle.
    pub fn for_view_and_size(center: Point, resolution: f64, rotation: f64, size: [u32; 2]) -> Self {
        let dx = (resolution * size[0] as f64) / 2.0;
        let dy = (resolution * size[1] as f64) / 2.0;
        let (sin, cos) = rotation.sin_cos();

        let corners = [(-dx, -dy), (dx, -dy), (dx, dy), (-dx, dy)];
        let mut extent = Extent::empty();
        for (px, py) in corners {
            let x = center.x + px * cos - py * sin;
            let y = center.y + px * sin + py * cos;
            extent.min_x = extent.min_x.min(x);
            extent.min_y = extent.min_y.min(y);
            extent.max_x = extent.max_x.max(x);
            extent.max_y = extent.max_y.max(y);
        }
        extent
    }
}

/// Represents a tile coordinate in a quad-tree tile pyramid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Gets the parent tile at the next lower zoom level
    pub fn parent(&self) -> Option<TileCoord> {
        if self.z == 0 {
            None
        } else {
            Some(TileCoord::new(self.x / 2, self.y / 2, self.z - 1))
        }
    }

    /// Gets the four child tiles at the next higher zoom level
    pub fn children(&self) -> [TileCoord; 4] {
        [
            TileCoord::new(self.x * 2, self.y * 2, self.z + 1),
            TileCoord::new(self.x * 2 + 1, self.y * 2, self.z + 1),
            TileCoord::new(self.x * 2, self.y * 2 + 1, self.z + 1),
            TileCoord::new(self.x * 2 + 1, self.y * 2 + 1, self.z + 1),
        ]
    }

    /// Checks that the coordinate indices fit a power-of-two pyramid level
    pub fn is_valid(&self) -> bool {
        let max_coord = 2_u32.pow(self.z as u32);
        self.x < max_coord && self.y < max_coord
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Inclusive rectangular set of tile indices at one zoom level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRange {
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
}

impl TileRange {
    pub fn new(min_x: u32, max_x: u32, min_y: u32, max_y: u32) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    /// A range containing no tiles; iteration over it yields nothing
    pub fn empty() -> Self {
        Self::new(1, 0, 1, 0)
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    pub fn width(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            self.max_x - self.min_x + 1
        }
    }

    pub fn height(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            self.max_y - self.min_y + 1
        }
    }

    pub fn count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn intersects(&self, other: &TileRange) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && other.max_x >= self.min_x
            && other.min_x <= self.max_x
            && other.max_y >= self.min_y
            && other.min_y <= self.max_y
    }

    /// Iterates `(x, y)` pairs in row-major order; empty ranges short-circuit
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> {
        let (min_x, max_x) = (self.min_x, self.max_x);
        let (min_y, max_y) = (self.min_y, self.max_y);
        (min_y..=max_y).flat_map(move |y| (min_x..=max_x).map(move |x| (x, y)))
    }
}
