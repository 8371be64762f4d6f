//! Overlapping tile grids: splitting, streaming, seam blending and reassembly.
//!
//! Two ways through the same geometry:
//!
//! - [`RegionSource`] + [`Reconstructor`] stream one tile at a time and bake
//!   seam alpha in while decoding the processed tensor.
//! - [`Tiler`] materializes every tile up front, supports random access and
//!   replacement, pads sources smaller than a tile, and fades seams when the
//!   tiles are patched back together.

mod grid;
mod reconstruct;
mod region;
mod seam;
mod tiler;

pub use grid::{Grid, GridConfig, Rect, TilePosition};
pub use reconstruct::Reconstructor;
pub use region::{RegionSource, SourceTile};
pub use seam::{apply_fade, composite_over, fade_left_edge, fade_top_edge, ramp, EdgeFade};
pub use tiler::{Padding, Tiler};
