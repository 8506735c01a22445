//! Frame rendering: the software drawing surface, fade bookkeeping, and the
//! tile selection + compositing engine.

pub mod renderer;
pub mod surface;
pub mod transition;

pub use renderer::{
    Presentation, SelectedTile, TileLayerRenderer, TileRenderOptions, TileSelection, TilesByZ,
};
pub use surface::Canvas;
pub use transition::TransitionTracker;
