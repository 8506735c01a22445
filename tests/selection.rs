//! End-to-end tests for the tile selection engine: ideal-zoom picks,
//! child coverage, ancestor walks, and the error fallback policy.

use std::sync::Arc;

use tilescape::prelude::*;

/// Fetcher for staged pyramids: every fetch reports a hole
struct BlankFetcher;

impl TileFetcher for BlankFetcher {
    fn fetch(&self, _coord: TileCoord) -> Result<TileImage> {
        Err(Error::TileNotFound)
    }
}

/// 4096 x 4096 map units, 256 px tiles, zooms 0..=6; z4 has resolution 1.0
fn grid() -> TileGrid {
    TileGrid::for_extent(Extent::new(0.0, 0.0, 4096.0, 4096.0), 7, 256)
}

/// Renderer over an inert loader so staged tile states never change
fn renderer(options: TileRenderOptions) -> TileLayerRenderer {
    let source = RasterTileSource::new(grid(), Arc::new(BlankFetcher), TileLoaderConfig::for_testing());
    TileLayerRenderer::new(Box::new(source), options)
}

fn no_fade() -> TileRenderOptions {
    TileRenderOptions {
        transition: 0.0,
        ..Default::default()
    }
}

fn load(renderer: &mut TileLayerRenderer, coord: TileCoord) {
    let image = Arc::new(TileImage::solid(256, 256, [coord.x as u8, coord.y as u8, coord.z, 255]));
    renderer.source_mut().get_tile(coord).finish_loading(image);
}

/// Viewport resolving exactly to z4, centered on tile (2, 2)
fn frame_at_z4(size: [u32; 2]) -> FrameState {
    let view = ViewState::new(Point::new(640.0, 3456.0), 1.0);
    FrameState::new(view, size, 1.0, 0.0)
}

#[test]
fn test_all_loaded_uses_only_ideal_zoom() {
    let mut renderer = renderer(no_fade());
    for x in 1..=3 {
        for y in 1..=3 {
            load(&mut renderer, TileCoord::new(x, y, 4));
        }
    }
    // a loaded ancestor that must stay untouched
    load(&mut renderer, TileCoord::new(0, 0, 2));

    let frame = frame_at_z4([512, 512]);
    let selection = renderer.select_tiles(&frame);

    assert_eq!(selection.ideal_z, 4);
    assert_eq!(selection.by_z.len(), 1);
    let ideal = &selection.by_z[&4];
    assert_eq!(ideal.len(), 9);
    assert!(ideal.contains_key(&TileCoord::new(2, 2, 4)));
    assert!(selection.new_tiles);
}

#[test]
fn test_fading_tiles_still_pull_in_ancestors() {
    // with fades enabled a freshly loaded tile is not yet opaque, so the
    // nearest loaded ancestor is kept underneath it
    let mut renderer = renderer(TileRenderOptions::default());
    load(&mut renderer, TileCoord::new(2, 2, 4));
    load(&mut renderer, TileCoord::new(1, 1, 3));

    let selection = renderer.select_tiles(&frame_at_z4([256, 256]));
    assert_eq!(selection.by_z[&4].len(), 1);
    assert_eq!(selection.by_z[&3].len(), 1);
}

#[test]
fn test_opaque_ideal_tile_skips_fallback_search() {
    // documented optimization: a fully opaque ideal tile occludes anything
    // underneath, so no fallback is even looked up
    let mut renderer = renderer(no_fade());
    load(&mut renderer, TileCoord::new(2, 2, 4));
    load(&mut renderer, TileCoord::new(1, 1, 3));
    load(&mut renderer, TileCoord::new(4, 4, 5));

    let selection = renderer.select_tiles(&frame_at_z4([256, 256]));
    assert_eq!(selection.by_z.len(), 1);
    assert_eq!(selection.by_z[&4].len(), 1);
}

#[test]
fn test_idle_tile_covered_by_loaded_children() {
    let mut renderer = renderer(no_fade());
    for (x, y) in TileRange::new(4, 5, 4, 5).iter() {
        load(&mut renderer, TileCoord::new(x, y, 5));
    }
    // loaded ancestor that must not be registered: the children already
    // cover the footprint
    load(&mut renderer, TileCoord::new(1, 1, 3));

    let selection = renderer.select_tiles(&frame_at_z4([256, 256]));

    assert_eq!(selection.ideal_z, 4);
    assert!(selection.by_z[&4].is_empty());
    assert_eq!(selection.by_z[&5].len(), 4);
    assert!(!selection.by_z.contains_key(&3));
    assert!(!selection.new_tiles);
}

#[test]
fn test_partial_children_fall_back_to_nearest_ancestor() {
    let mut renderer = renderer(no_fade());
    // only three of the four children exist
    load(&mut renderer, TileCoord::new(4, 4, 5));
    load(&mut renderer, TileCoord::new(5, 4, 5));
    load(&mut renderer, TileCoord::new(4, 5, 5));
    // nothing at z3; the walk must keep descending to z2 and stop there
    load(&mut renderer, TileCoord::new(0, 0, 2));
    load(&mut renderer, TileCoord::new(0, 0, 0));

    let selection = renderer.select_tiles(&frame_at_z4([256, 256]));

    assert_eq!(selection.by_z[&5].len(), 3);
    assert_eq!(selection.by_z[&2].len(), 1);
    assert!(!selection.by_z.contains_key(&3));
    // walk stopped at the first loaded level, zoom 0 never visited
    assert!(!selection.by_z.contains_key(&0));
}

#[test]
fn test_error_without_fallback_is_terminal() {
    let mut renderer = renderer(TileRenderOptions {
        use_interim_tiles_on_error: false,
        transition: 0.0,
        ..Default::default()
    });
    renderer.source_mut().get_tile(TileCoord::new(2, 2, 4)).start_loading();
    renderer.source_mut().get_tile(TileCoord::new(2, 2, 4)).fail();
    load(&mut renderer, TileCoord::new(1, 1, 3));

    let selection = renderer.select_tiles(&frame_at_z4([256, 256]));

    // treated as loaded: drawn as blank, and no fallback was searched
    assert_eq!(selection.by_z.len(), 1);
    assert!(selection.by_z[&4].is_empty());
    assert!(!selection.new_tiles);
}

#[test]
fn test_error_with_fallback_registers_ancestor() {
    let mut renderer = renderer(TileRenderOptions {
        use_interim_tiles_on_error: true,
        preload: 2,
        transition: 0.0,
        ..Default::default()
    });
    renderer.source_mut().get_tile(TileCoord::new(2, 2, 4)).start_loading();
    renderer.source_mut().get_tile(TileCoord::new(2, 2, 4)).fail();
    load(&mut renderer, TileCoord::new(1, 1, 3));

    let selection = renderer.select_tiles(&frame_at_z4([256, 256]));

    assert!(selection.by_z[&4].is_empty());
    assert_eq!(selection.by_z[&3].len(), 1);
    // errored tiles with a preload margin mean preloaded fallback content
    // just became relevant
    assert!(selection.new_tiles);
}

#[test]
fn test_interim_generation_survives_refresh() {
    let mut source =
        RasterTileSource::new(grid(), Arc::new(BlankFetcher), TileLoaderConfig::for_testing());
    let coord = TileCoord::new(2, 2, 4);
    source
        .get_tile(coord)
        .finish_loading(Arc::new(TileImage::solid(256, 256, [7, 7, 7, 255])));
    source.refresh();

    let mut renderer = TileLayerRenderer::new(Box::new(source), no_fade());
    let selection = renderer.select_tiles(&frame_at_z4([256, 256]));

    // the stale loaded generation stands in for the re-requested tile
    let ideal = &selection.by_z[&4];
    assert_eq!(ideal.len(), 1);
    assert_eq!(ideal[&coord].image.pixel(0, 0), Some([7, 7, 7, 255]));
    // and the replacement was re-created idle
    assert_eq!(renderer.source_mut().get_tile(coord).state(), TileState::Idle);
}

#[test]
fn test_new_tiles_clears_once_rendered() {
    let mut renderer = renderer(no_fade());
    load(&mut renderer, TileCoord::new(2, 2, 4));

    let selection = renderer.select_tiles(&frame_at_z4([256, 256]));
    assert!(selection.new_tiles);

    let mut frame = frame_at_z4([256, 256]);
    renderer.render_frame(&mut frame);

    // nothing new on the second pass over an identical viewport
    let selection = renderer.select_tiles(&frame_at_z4([256, 256]));
    assert!(!selection.new_tiles);
}

#[test]
fn test_prepare_frame_rejects_degenerate_viewports() {
    let mut renderer = renderer(no_fade());
    assert!(renderer.prepare_frame(&frame_at_z4([256, 256])));
    assert!(!renderer.prepare_frame(&frame_at_z4([0, 256])));

    let view = ViewState::new(Point::new(0.0, 0.0), 0.0);
    assert!(!renderer.prepare_frame(&FrameState::new(view, [256, 256], 1.0, 0.0)));
}

/// Fetcher that always answers with a solid tile
struct SolidFetcher;

impl TileFetcher for SolidFetcher {
    fn fetch(&self, _coord: TileCoord) -> Result<TileImage> {
        Ok(TileImage::solid(256, 256, [10, 20, 30, 255]))
    }
}

#[test]
fn test_async_load_completes_through_frames() {
    let source = RasterTileSource::new(grid(), Arc::new(SolidFetcher), TileLoaderConfig::default());
    let mut renderer = TileLayerRenderer::new(Box::new(source), no_fade());

    // first frame requests the tile and draws nothing
    let mut frame = frame_at_z4([256, 256]);
    renderer.prepare_frame(&frame);
    renderer.render_frame(&mut frame);
    assert_eq!(
        renderer.source_mut().get_tile(TileCoord::new(2, 2, 4)).state(),
        TileState::Loading
    );

    // later frames pick up the loader result
    let mut loaded = false;
    for attempt in 0..200 {
        std::thread::sleep(std::time::Duration::from_millis(10));
        let mut frame = frame_at_z4([256, 256]);
        frame.time = attempt as f64 * 10.0;
        renderer.prepare_frame(&frame);
        renderer.render_frame(&mut frame);
        if renderer.source_mut().get_tile(TileCoord::new(2, 2, 4)).state() == TileState::Loaded {
            loaded = true;
            break;
        }
    }
    assert!(loaded, "tile never finished loading");
    let canvas = renderer.get_image().unwrap();
    assert_eq!(canvas.pixel(128, 128), Some([10, 20, 30, 255]));
}
