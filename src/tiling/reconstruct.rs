//! Streaming reconstruction of processed tiles onto the output canvas.

use ndarray::ArrayView4;

use crate::error::{Error, Result};
use crate::image::{Image, TensorCodec};

use super::grid::{Grid, GridConfig, TilePosition};
use super::seam::{self, EdgeFade};

/// Places processed tiles in the same row-major order a
/// [`RegionSource`](super::RegionSource) yields them.
pub struct Reconstructor {
    grid: Grid,
    codec: TensorCodec,
    canvas: Image,
    cursor: usize,
}

impl Reconstructor {
    /// Create an empty `canvas_width × canvas_height` canvas.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the tile geometry does not fit the canvas.
    pub fn open(
        canvas_width: u32,
        canvas_height: u32,
        tile_width: u32,
        tile_height: u32,
        overlap: u32,
        codec: TensorCodec,
    ) -> Result<Self> {
        let grid = Grid::compute(GridConfig::new(
            canvas_width,
            canvas_height,
            tile_width,
            tile_height,
            overlap,
        ))?;

        Ok(Self {
            grid,
            codec,
            canvas: Image::new(canvas_width, canvas_height),
            cursor: 0,
        })
    }

    /// Decode `tensor` with the seam alpha of the current slot baked in,
    /// composite it at that slot's placement and advance to the next slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Capacity`] once every slot is filled, and
    /// [`Error::DimensionMismatch`] / [`Error::ShapeMismatch`] if the tensor is
    /// not one tile of RGB.
    pub fn put(&mut self, tensor: ArrayView4<'_, f32>) -> Result<TilePosition> {
        let position = self.next_position()?;

        let cfg = self.grid.config();
        let (_, height, width, _) = tensor.dim();
        if (width, height) != (cfg.tile_width as usize, cfg.tile_height as usize) {
            return Err(tile_mismatch(cfg, width, height));
        }

        let tile = self
            .codec
            .decode_with_fade(tensor, EdgeFade::for_position(position, self.grid.overlap()))?;
        self.place(position, &tile);
        Ok(position)
    }

    /// Composite an already decoded opaque tile at the current slot, fading
    /// its shared edges first.
    ///
    /// # Errors
    ///
    /// Same as [`Self::put`].
    pub fn put_image(&mut self, tile: &Image) -> Result<TilePosition> {
        let position = self.next_position()?;

        let cfg = self.grid.config();
        if tile.dimensions() != (cfg.tile_width, cfg.tile_height) {
            return Err(tile_mismatch(
                cfg,
                tile.width() as usize,
                tile.height() as usize,
            ));
        }

        let faded = seam::apply_fade(tile, EdgeFade::for_position(position, self.grid.overlap()));
        self.place(position, &faded);
        Ok(position)
    }

    fn next_position(&self) -> Result<TilePosition> {
        if self.cursor >= self.grid.len() {
            return Err(Error::Capacity {
                capacity: self.grid.len(),
            });
        }
        self.grid.position(self.cursor)
    }

    fn place(&mut self, position: TilePosition, tile: &Image) {
        let rect = self.grid.placement(position);
        seam::composite_over(&mut self.canvas, tile, rect.x, rect.y);
        self.cursor += 1;
        tracing::debug!(
            "Placed tile {}/{} at ({}, {})",
            self.cursor,
            self.grid.len(),
            rect.x,
            rect.y
        );
    }

    #[must_use]
    pub const fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Number of slots, `n_cols * n_rows`.
    #[must_use]
    pub const fn number_of_tiles(&self) -> usize {
        self.grid.len()
    }

    /// Tiles placed so far.
    #[must_use]
    pub const fn placed(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.cursor == self.grid.len()
    }

    /// The canvas, once every slot is filled.
    #[must_use]
    pub fn image(&self) -> Option<&Image> {
        self.is_complete().then_some(&self.canvas)
    }

    /// Take the finished canvas.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompleteCanvas`] if any slot is still empty.
    pub fn into_image(self) -> Result<Image> {
        if !self.is_complete() {
            return Err(Error::IncompleteCanvas {
                placed: self.cursor,
                expected: self.grid.len(),
            });
        }
        Ok(self.canvas)
    }
}

fn tile_mismatch(cfg: &GridConfig, width: usize, height: usize) -> Error {
    Error::DimensionMismatch {
        expected_width: cfg.tile_width,
        expected_height: cfg.tile_height,
        actual_width: u32::try_from(width).unwrap_or(u32::MAX),
        actual_height: u32::try_from(height).unwrap_or(u32::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::MemorySource;
    use crate::tiling::RegionSource;
    use image::Rgba;

    fn numbered(width: u32, height: u32) -> Image {
        Image::from_fn(width, height, |x, y| {
            Rgba([(x % 253) as u8, (y % 239) as u8, ((x + 3 * y) % 256) as u8, 255])
        })
    }

    /// Stream `img` through an identity transform and reassemble it.
    fn identity_round_trip(img: &Image, tile: u32, overlap: u32) -> Image {
        let codec = TensorCodec::default();
        let source = MemorySource::new(img.clone());
        let mut reader = RegionSource::open(&source, tile, tile, overlap).unwrap();
        let mut builder =
            Reconstructor::open(img.width(), img.height(), tile, tile, overlap, codec).unwrap();
        assert_eq!(builder.number_of_tiles(), reader.number_of_tiles());

        let mut buffer = TensorCodec::buffer(tile, tile);
        while let Some(t) = reader.next_tile().unwrap() {
            codec.encode_into(t.pixels, &mut buffer).unwrap();
            let placed = builder.put(buffer.view()).unwrap();
            assert_eq!(placed, t.position);
        }
        reader.close();
        builder.into_image().unwrap()
    }

    #[test]
    fn test_reference_scenario_is_pixel_exact() {
        let img = numbered(800, 600);
        assert_eq!(identity_round_trip(&img, 384, 40), img);
    }

    #[test]
    fn test_zero_overlap_is_pixel_exact() {
        let img = numbered(257, 130);
        assert_eq!(identity_round_trip(&img, 64, 0), img);
    }

    #[test]
    fn test_clamped_last_column_is_pixel_exact() {
        // width = 3 * stride + 1
        let img = numbered(3 * 56 + 1, 64);
        assert_eq!(identity_round_trip(&img, 64, 8), img);
    }

    #[test]
    fn test_extra_tile_is_capacity_error() {
        let codec = TensorCodec::default();
        let mut builder = Reconstructor::open(64, 64, 64, 64, 8, codec).unwrap();
        let tensor = TensorCodec::buffer(64, 64);
        builder.put(tensor.view()).unwrap();
        assert!(builder.is_complete());
        assert!(matches!(
            builder.put(tensor.view()),
            Err(Error::Capacity { capacity: 1 })
        ));
    }

    #[test]
    fn test_wrong_tile_size_rejected() {
        let mut builder =
            Reconstructor::open(128, 128, 64, 64, 8, TensorCodec::default()).unwrap();
        let tensor = TensorCodec::buffer(32, 64);
        assert!(matches!(
            builder.put(tensor.view()),
            Err(Error::DimensionMismatch { .. })
        ));
        assert_eq!(builder.placed(), 0);
    }

    #[test]
    fn test_incomplete_canvas_not_returned() {
        let mut builder =
            Reconstructor::open(128, 128, 64, 64, 8, TensorCodec::default()).unwrap();
        builder.put(TensorCodec::buffer(64, 64).view()).unwrap();
        assert!(builder.image().is_none());
        assert!(matches!(
            builder.into_image(),
            Err(Error::IncompleteCanvas {
                placed: 1,
                expected: 9
            })
        ));
    }

    #[test]
    fn test_put_image_matches_put() {
        let img = numbered(200, 150);
        let codec = TensorCodec::default();
        let mut by_tensor = Reconstructor::open(200, 150, 96, 96, 24, codec).unwrap();
        let mut by_image = Reconstructor::open(200, 150, 96, 96, 24, codec).unwrap();

        let grid = *by_tensor.grid();
        for (_, rect) in grid.iter() {
            let tile =
                image::imageops::crop_imm(&img, rect.x, rect.y, rect.width, rect.height).to_image();
            by_tensor.put(codec.encode(&tile).view()).unwrap();
            by_image.put_image(&tile).unwrap();
        }
        assert_eq!(by_tensor.into_image().unwrap(), by_image.into_image().unwrap());
    }

    #[test]
    fn test_overlap_too_large() {
        assert!(matches!(
            Reconstructor::open(800, 600, 40, 40, 50, TensorCodec::default()),
            Err(Error::Config { .. })
        ));
    }
}
