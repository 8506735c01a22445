use std::sync::Arc;

use tilescape::prelude::*;

/// Synthetic pyramid: every tile is a flat color derived from its
/// coordinate, with a checkerboard tint so tile boundaries are visible
struct CheckerFetcher;

impl TileFetcher for CheckerFetcher {
    fn fetch(&self, coord: TileCoord) -> Result<TileImage> {
        // simulate decode latency
        std::thread::sleep(std::time::Duration::from_millis(5));
        let shade: u8 = if (coord.x + coord.y) % 2 == 0 { 200 } else { 140 };
        let rgba = [shade, 60 + 30 * coord.z, 255 - shade, 255];
        Ok(TileImage::solid(256, 256, rgba))
    }
}

/// Example of driving the renderer without any UI: pump frames until all
/// fades settle, then dump the canvas to a PPM file.
fn main() -> tilescape::Result<()> {
    env_logger::init();

    println!("Tilescape Headless Example");
    println!("==========================");

    let grid = TileGrid::for_extent(Extent::new(0.0, 0.0, 4096.0, 4096.0), 7, 256);
    let source = RasterTileSource::new(grid, Arc::new(CheckerFetcher), TileLoaderConfig::default());
    let mut renderer = TileLayerRenderer::new(
        Box::new(source),
        TileRenderOptions {
            preload: 1,
            ..Default::default()
        },
    );

    let view = ViewState::new(Point::new(640.0, 3456.0), 1.0).with_rotation(0.2);
    let mut time = 0.0;
    let mut frames = 0;

    loop {
        let mut frame = FrameState::new(view, [640, 480], 1.0, time);
        if renderer.prepare_frame(&frame) {
            renderer.render_frame(&mut frame);
        }
        frames += 1;

        let loading = frame
            .wanted_tiles
            .iter()
            .filter(|coord| renderer.source_mut().get_tile(**coord).state() == TileState::Loading)
            .count();
        println!(
            "frame {:>3} t={:>6.0}ms loading={} animate={}",
            frames, time, loading, frame.animate
        );

        if loading == 0 && !frame.animate && frames > 1 {
            break;
        }
        if frames > 300 {
            println!("giving up after {} frames", frames);
            break;
        }

        std::thread::sleep(std::time::Duration::from_millis(16));
        time += 16.0;
    }

    let canvas = match renderer.get_image() {
        Some(canvas) => canvas,
        None => {
            println!("nothing was rendered");
            return Ok(());
        }
    };

    // binary PPM, alpha dropped
    let mut ppm = format!("P6\n{} {}\n255\n", canvas.width(), canvas.height()).into_bytes();
    for pixel in canvas.data().chunks_exact(4) {
        ppm.extend_from_slice(&pixel[..3]);
    }
    let path = "headless.ppm";
    std::fs::write(path, ppm)?;

    println!(
        "wrote {} ({}x{} canvas after {} frames)",
        path,
        canvas.width(),
        canvas.height(),
        frames
    );
    Ok(())
}
