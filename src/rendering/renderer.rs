//! Tile selection and compositing engine.
//!
//! Each animation frame the renderer computes the ideal zoom level and tile
//! range for the viewport, picks a drawable tile for every coordinate in
//! range (falling back to loaded descendants or ancestors while the ideal
//! tile streams in), and composites the picks onto the software canvas in
//! back-to-front zoom order with seam-free destination rectangles.

use std::cmp::Ordering;

use crate::core::geo::{Extent, Point, TileCoord};
use crate::core::transform::Transform;
use crate::core::viewport::FrameState;
use crate::prelude::{Arc, HashMap, HashSet};
use crate::rendering::surface::Canvas;
use crate::rendering::transition::TransitionTracker;
use crate::tiles::grid::{TileGrid, ZDirection};
use crate::tiles::source::TileSource;
use crate::tiles::tile::{TileImage, TileState};
use serde::{Deserialize, Serialize};

/// Settled fade entries for tiles outside the last drawn set are garbage
/// collected once the tracker grows past this many entries
const TRANSITION_PRUNE_THRESHOLD: usize = 4096;

/// Per-layer rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileRenderOptions {
    /// Layer opacity applied at presentation time
    pub opacity: f64,
    /// Optional clip extent; content outside it is never drawn
    pub extent: Option<Extent>,
    /// How many zoom levels below the ideal one to keep loading for
    /// fallback coverage
    pub preload: u8,
    /// Whether errored tiles fall back to interim/ancestor content instead
    /// of rendering as blank
    pub use_interim_tiles_on_error: bool,
    /// Tie-break when the view resolution sits between two zoom levels
    pub z_direction: ZDirection,
    /// Fade-in duration in milliseconds; zero disables fading
    pub transition: f64,
}

impl Default for TileRenderOptions {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            extent: None,
            preload: 0,
            use_interim_tiles_on_error: true,
            z_direction: ZDirection::default(),
            transition: 250.0,
        }
    }
}

/// A tile chosen for drawing this frame
#[derive(Debug, Clone)]
pub struct SelectedTile {
    pub id: u64,
    pub coord: TileCoord,
    pub image: Arc<TileImage>,
}

/// Zoom level → coordinate → selected tile; rebuilt every frame
pub type TilesByZ = HashMap<u8, HashMap<TileCoord, SelectedTile>>;

/// Output of the per-frame tile selection pass
#[derive(Debug)]
pub struct TileSelection {
    /// Zoom level the viewport resolution maps to
    pub ideal_z: u8,
    pub by_z: TilesByZ,
    /// True when a tile appeared that last frame's pass did not draw, or
    /// when errored tiles made preloaded fallback content relevant
    pub new_tiles: bool,
}

/// Pure presentation record: everything the host needs to put the rendered
/// canvas on screen
#[derive(Debug, Clone, Copy)]
pub struct Presentation<'a> {
    pub canvas: &'a Canvas,
    pub opacity: f64,
    /// Canvas pixels → display pixels, including rotation and centering
    pub transform: Transform,
}

/// True for tiles that need no further fallback: loaded content, a known
/// hole in the pyramid, or a terminal error the layer renders as blank
pub fn is_drawable(state: TileState, use_interim_tiles_on_error: bool) -> bool {
    matches!(state, TileState::Loaded | TileState::Empty)
        || (state == TileState::Error && !use_interim_tiles_on_error)
}

/// Destination rectangle `[x, y, w, h]` for the tile `(x_index, y_index)`
/// steps away from the snapped origin.
///
/// Both edges are rounded independently from the floating origin and the
/// size is their difference, so two adjacent tiles compute the identical
/// pixel coordinate for their shared edge no matter the scale factor.
pub(crate) fn dest_rect(origin: Point, x_index: i64, y_index: i64, dx: f64, dy: f64) -> [i64; 4] {
    let next_x = (origin.x - (x_index - 1) as f64 * dx).round() as i64;
    let next_y = (origin.y - (y_index - 1) as f64 * dy).round() as i64;
    let x = (origin.x - x_index as f64 * dx).round() as i64;
    let y = (origin.y - y_index as f64 * dy).round() as i64;
    [x, y, next_x - x, next_y - y]
}

/// Sorts zoom levels into draw order: the ideal level always comes last so
/// it paints on top; the fallback levels keep ascending order among
/// themselves
pub(crate) fn draw_order(zs: &mut [u8], ideal_z: u8) {
    zs.sort_by(|a, b| {
        if *a == ideal_z {
            Ordering::Greater
        } else if *b == ideal_z {
            Ordering::Less
        } else {
            a.cmp(b)
        }
    });
}

/// Registers every cached loaded tile of `range` into the draw set for `z`
/// and reports whether the range was fully covered
fn register_loaded_tiles(
    source: &mut dyn TileSource,
    z: u8,
    range: crate::core::geo::TileRange,
    by_z: &mut TilesByZ,
) -> bool {
    source.for_each_loaded_tile(z, range, &mut |tile| {
        if let Some(image) = tile.image() {
            by_z.entry(z).or_default().insert(
                tile.coord(),
                SelectedTile {
                    id: tile.id(),
                    coord: tile.coord(),
                    image: image.clone(),
                },
            );
        }
    })
}

/// Renders one tile source as a layer onto an owned software canvas.
///
/// Drive it with one `prepare_frame` / `render_frame` pair per animation
/// frame; the calls must never overlap for the same renderer instance. All
/// per-frame state lives in the [`FrameState`]; only the fade bookkeeping,
/// the last drawn tile set and the rendered revision/extent persist across
/// frames.
pub struct TileLayerRenderer {
    source: Box<dyn TileSource>,
    options: TileRenderOptions,
    canvas: Canvas,
    transitions: TransitionTracker,
    pixel_transform: Transform,
    inverse_pixel_transform: Transform,
    rendered_tiles: HashSet<u64>,
    rendered_revision: u64,
    rendered_extent: Option<Extent>,
    has_rendered: bool,
}

impl TileLayerRenderer {
    pub fn new(source: Box<dyn TileSource>, options: TileRenderOptions) -> Self {
        let transitions = TransitionTracker::new(options.transition);
        Self {
            source,
            options,
            canvas: Canvas::new(),
            transitions,
            pixel_transform: Transform::identity(),
            inverse_pixel_transform: Transform::identity(),
            rendered_tiles: HashSet::default(),
            rendered_revision: 0,
            rendered_extent: None,
            has_rendered: false,
        }
    }

    pub fn options(&self) -> &TileRenderOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: TileRenderOptions) {
        if options.transition != self.options.transition {
            self.transitions = TransitionTracker::new(options.transition);
        }
        self.options = options;
    }

    pub fn source(&self) -> &dyn TileSource {
        self.source.as_ref()
    }

    pub fn source_mut(&mut self) -> &mut dyn TileSource {
        self.source.as_mut()
    }

    /// Canvas pixels → display pixels of the last rendered frame
    pub fn pixel_transform(&self) -> Transform {
        self.pixel_transform
    }

    /// Display pixels → canvas pixels of the last rendered frame
    pub fn inverse_pixel_transform(&self) -> Transform {
        self.inverse_pixel_transform
    }

    /// Map extent covered by the canvas of the last rendered frame
    pub fn rendered_extent(&self) -> Option<Extent> {
        self.rendered_extent
    }

    /// The drawing surface, once a frame has been rendered
    pub fn get_image(&self) -> Option<&Canvas> {
        self.has_rendered.then_some(&self.canvas)
    }

    /// Presentation record for the host: canvas, layer opacity, and the
    /// canvas→display transform
    pub fn presentation(&self) -> Option<Presentation<'_>> {
        self.has_rendered.then_some(Presentation {
            canvas: &self.canvas,
            opacity: self.options.opacity,
            transform: self.pixel_transform,
        })
    }

    /// Applies finished loads and reports whether the frame can render.
    ///
    /// This is the only place tile states change, so a frame always sees a
    /// consistent snapshot of the pyramid.
    pub fn prepare_frame(&mut self, frame: &FrameState) -> bool {
        self.source.process_results();
        frame.size[0] > 0
            && frame.size[1] > 0
            && frame.view.resolution.is_finite()
            && frame.view.resolution > 0.0
    }

    /// Picks a drawable tile for every coordinate the viewport needs.
    ///
    /// For each coordinate in the ideal-zoom range: fetch the tile,
    /// substitute its interim generation when it is not drawable, and
    /// register loaded content. Unless the tile already covers its
    /// footprint fully opaquely, look for coverage below (the four children
    /// at `z + 1`) and then above, walking ancestors down to zoom zero and
    /// stopping at the first fully loaded level.
    pub fn select_tiles(&mut self, frame: &FrameState) -> TileSelection {
        let grid = self.source.grid().clone();
        let z = grid.z_for_resolution(frame.view.resolution, self.options.z_direction);
        let mut extent = frame.extent();
        if let Some(layer_extent) = self.options.extent {
            extent = extent.intersection(&layer_extent);
        }
        let tile_range = grid.tile_range_for_extent_and_z(extent, z);

        let mut by_z: TilesByZ = HashMap::default();
        by_z.insert(z, HashMap::default());
        // a source refresh invalidates everything drawn so far
        let mut new_tiles = self.source.revision() != self.rendered_revision;

        let use_interim = self.options.use_interim_tiles_on_error;
        for (x, y) in tile_range.iter() {
            let coord = TileCoord::new(x, y, z);

            let (tile_id, state, image, requested_state) = {
                let tile = self.source.get_tile(coord);
                let requested_state = tile.state();
                let resolved = if is_drawable(requested_state, use_interim) {
                    &*tile
                } else {
                    tile.interim_or_self()
                };
                (
                    resolved.id(),
                    resolved.state(),
                    resolved.image().cloned(),
                    requested_state,
                )
            };

            if requested_state == TileState::Error && use_interim && self.options.preload > 0 {
                // preloaded lower-resolution tiles may now be the best content
                new_tiles = true;
            }

            if is_drawable(state, use_interim) {
                if state == TileState::Loaded {
                    if let Some(image) = image {
                        by_z.entry(z).or_default().insert(
                            coord,
                            SelectedTile {
                                id: tile_id,
                                coord,
                                image,
                            },
                        );
                        let mut in_transition = self.transitions.in_transition(tile_id);
                        if in_transition && self.options.opacity < 1.0 {
                            // fading on a translucent layer double-blends
                            // against the fallback underneath
                            self.transitions.end(tile_id);
                            in_transition = false;
                        }
                        if !new_tiles
                            && (in_transition || !self.rendered_tiles.contains(&tile_id))
                        {
                            new_tiles = true;
                        }
                    }
                } else if state == TileState::Error {
                    // fallback on error disabled: terminally loaded, renders
                    // as blank and needs no coverage
                    continue;
                }
                if self.transitions.alpha(tile_id, frame.time) >= 1.0 {
                    // fully opaque already; nothing underneath would show
                    continue;
                }
            }

            let mut covered = false;
            if let Some(child_range) = grid.child_tile_range(coord) {
                covered =
                    register_loaded_tiles(self.source.as_mut(), z + 1, child_range, &mut by_z);
            }
            if !covered {
                let source = self.source.as_mut();
                grid.for_each_parent_tile_range(coord, |parent_z, parent_range| {
                    register_loaded_tiles(&mut *source, parent_z, parent_range, &mut by_z)
                });
            }
        }

        TileSelection {
            ideal_z: z,
            by_z,
            new_tiles,
        }
    }

    /// Composites the selected tiles for this frame onto the canvas and
    /// returns it.
    pub fn render_frame(&mut self, frame: &mut FrameState) -> &Canvas {
        let view = frame.view;
        let source_revision = self.source.revision();
        let selection = self.select_tiles(frame);
        let z = selection.ideal_z;

        let grid = self.source.grid().clone();
        let tile_resolution = grid.resolution(z);
        let tile_pixel_ratio = self.source.tile_pixel_ratio(frame.pixel_ratio);

        // canvas size in device pixels; a rotated view gets a square canvas
        // sized to the viewport diagonal so rotation never clips content
        let mut width = (frame.size[0] as f64 * tile_pixel_ratio).round();
        let mut height = (frame.size[1] as f64 * tile_pixel_ratio).round();
        if view.rotation != 0.0 {
            let diagonal = (width * width + height * height).sqrt().round();
            width = diagonal;
            height = diagonal;
        }

        // canvas pixels → display pixels, and its exact inverse
        self.pixel_transform = Transform::compose(
            frame.size[0] as f64 / 2.0,
            frame.size[1] as f64 / 2.0,
            1.0 / tile_pixel_ratio,
            1.0 / tile_pixel_ratio,
            view.rotation,
            -width / 2.0,
            -height / 2.0,
        );
        self.inverse_pixel_transform = self.pixel_transform.inverted();

        // map extent backing the canvas at the ideal-zoom resolution; when
        // the view resolution sits between levels the tile transform scales
        // content around the canvas center to compensate
        let dx = (tile_resolution * width) / 2.0 / tile_pixel_ratio;
        let dy = (tile_resolution * height) / 2.0 / tile_pixel_ratio;
        let canvas_extent = Extent::new(
            view.center.x - dx,
            view.center.y - dy,
            view.center.x + dx,
            view.center.y + dy,
        );
        let canvas_scale = tile_resolution / view.resolution;
        let tile_transform = Transform::compose(
            width / 2.0,
            height / 2.0,
            canvas_scale,
            canvas_scale,
            0.0,
            -width / 2.0,
            -height / 2.0,
        );

        self.canvas.resize_and_clear(width as u32, height as u32);
        self.rendered_tiles.clear();

        if width < 1.0 || height < 1.0 {
            // zero-size viewport: nothing to draw, bookkeeping stays sound
            self.finish_frame(source_revision, canvas_extent);
            return &self.canvas;
        }

        // clip to the layer extent for the duration of the frame; only an
        // unrotated view maps the extent to an axis-aligned canvas rectangle
        let frame_extent = frame.extent();
        let map_to_canvas = |p: Point| {
            tile_transform.apply(Point::new(
                tile_pixel_ratio * (p.x - canvas_extent.min_x) / tile_resolution,
                tile_pixel_ratio * (canvas_extent.max_y - p.y) / tile_resolution,
            ))
        };
        if let Some(layer_extent) = self.options.extent {
            if view.rotation == 0.0 && !layer_extent.contains_extent(&frame_extent) {
                let top_left = map_to_canvas(layer_extent.top_left());
                let bottom_right =
                    map_to_canvas(Point::new(layer_extent.max_x, layer_extent.min_y));
                self.canvas.set_clip([
                    top_left.x.round() as i64,
                    top_left.y.round() as i64,
                    bottom_right.x.round() as i64,
                    bottom_right.y.round() as i64,
                ]);
            }
        }

        let mut zs: Vec<u8> = selection.by_z.keys().copied().collect();
        draw_order(&mut zs, z);

        let tile_gutter = (self.source.gutter() as f64 * tile_pixel_ratio).round() as u32;
        let source_opaque = self.source.opaque();

        for &current_z in &zs {
            let Some(tiles) = selection.by_z.get(&current_z) else {
                continue;
            };
            let current_resolution = grid.resolution(current_z);
            let current_scale = current_resolution / tile_resolution;
            let tile_pixel_size = self.source.tile_pixel_size(current_z, frame.pixel_ratio);
            let step_x = tile_pixel_size[0] * current_scale * canvas_scale;
            let step_y = tile_pixel_size[1] * current_scale * canvas_scale;

            // snapped floating origin: every destination rectangle at this
            // level derives from one anchor so shared edges round alike
            let origin_coord = grid.tile_coord_for_coord_and_z(canvas_extent.top_left(), current_z);
            let origin_extent = grid.tile_coord_extent(origin_coord);
            let origin = tile_transform.apply(Point::new(
                tile_pixel_ratio * (origin_extent.min_x - canvas_extent.min_x) / tile_resolution,
                tile_pixel_ratio * (canvas_extent.max_y - origin_extent.max_y) / tile_resolution,
            ));

            let fades_here = current_z == z;
            for selected in tiles.values() {
                let x_index = origin_coord.x as i64 - selected.coord.x as i64;
                let y_index = origin_coord.y as i64 - selected.coord.y as i64;
                let [rect_x, rect_y, rect_w, rect_h] =
                    dest_rect(origin, x_index, y_index, step_x, step_y);

                let image = selected.image.as_ref();
                if image.width() <= 2 * tile_gutter || image.height() <= 2 * tile_gutter {
                    continue;
                }
                let src = [
                    tile_gutter,
                    tile_gutter,
                    image.width() - 2 * tile_gutter,
                    image.height() - 2 * tile_gutter,
                ];

                let alpha = if fades_here {
                    self.transitions.alpha(selected.id, frame.time)
                } else {
                    1.0
                };
                if alpha >= 1.0 && !source_opaque {
                    // a finished tile may still carry transparent pixels;
                    // drop the fallback underneath so it cannot bleed through
                    self.canvas.clear_rect(rect_x, rect_y, rect_w, rect_h);
                }
                self.canvas
                    .draw_image(image, src, [rect_x, rect_y, rect_w, rect_h], alpha);

                if alpha < 1.0 {
                    frame.animate = true;
                } else if fades_here {
                    self.transitions.end(selected.id);
                }
                self.rendered_tiles.insert(selected.id);
                frame.used_tiles.insert(selected.coord);
            }
        }
        self.canvas.clear_clip();

        self.manage_tile_pyramid(frame, &grid, z);
        let wanted = frame.wanted_tiles.len();
        self.source.expire_cache(&frame.used_tiles, wanted);
        if self.transitions.len() > TRANSITION_PRUNE_THRESHOLD {
            self.transitions.prune(&self.rendered_tiles);
        }
        if selection.new_tiles {
            log::debug!("new tiles appeared at z{}", z);
        }

        self.finish_frame(source_revision, canvas_extent);
        &self.canvas
    }

    fn finish_frame(&mut self, source_revision: u64, canvas_extent: Extent) {
        self.rendered_revision = source_revision;
        self.rendered_extent = Some(canvas_extent);
        self.has_rendered = true;
    }

    /// Keeps the pyramid around the current view warm: tiles within the
    /// preload margin get materialized and loaded, everything visible at
    /// coarser levels is marked used so the cache retains it.
    fn manage_tile_pyramid(&mut self, frame: &mut FrameState, grid: &TileGrid, ideal_z: u8) {
        let mut extent = frame.extent();
        if let Some(layer_extent) = self.options.extent {
            extent = extent.intersection(&layer_extent);
        }
        if extent.is_empty() {
            return;
        }
        for z in grid.min_zoom()..=ideal_z {
            let range = grid.tile_range_for_extent_and_z(extent, z);
            let within_preload = ideal_z - z <= self.options.preload;
            for (x, y) in range.iter() {
                let coord = TileCoord::new(x, y, z);
                if within_preload {
                    frame.wanted_tiles.insert(coord);
                    if self.source.get_tile(coord).state() == TileState::Idle {
                        self.source.enqueue(coord);
                    }
                } else {
                    frame.used_tiles.insert(coord);
                }
            }
        }
    }
}
