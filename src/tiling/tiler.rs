//! Eager tiling with random access and in-place replacement.

use image::Rgba;

use crate::error::{Error, Result};
use crate::image::Image;

use super::grid::{Grid, GridConfig, Rect, TilePosition};
use super::seam::{self, EdgeFade};

/// Padding added to the right and bottom of an undersized source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Padding {
    pub right: u32,
    pub bottom: u32,
}

impl Padding {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.right == 0 && self.bottom == 0
    }
}

/// Splits a whole image into independent tile copies up front.
///
/// Sources smaller than the tile along a dimension are padded at the right or
/// bottom with a fill colour; [`Tiler::patch_fragments`] crops the padding away
/// again.
#[derive(Debug, Clone)]
pub struct Tiler {
    grid: Grid,
    tiles: Vec<Image>,
    original_width: u32,
    original_height: u32,
    padding: Padding,
}

impl Tiler {
    /// Split `source` into `tile_width × tile_height` tiles overlapping by
    /// `overlap`, padding with `pad_color` where the source is too small.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the overlap is not smaller than both tile
    /// dimensions.
    pub fn build(
        source: &Image,
        tile_width: u32,
        tile_height: u32,
        overlap: u32,
        pad_color: Rgba<u8>,
    ) -> Result<Self> {
        GridConfig::validate_tile(tile_width, tile_height, overlap)?;

        let (original_width, original_height) = source.dimensions();
        let padding = Padding {
            right: tile_width.saturating_sub(original_width),
            bottom: tile_height.saturating_sub(original_height),
        };

        let padded;
        let canvas = if padding.is_empty() {
            source
        } else {
            tracing::debug!(
                "Padding {original_width}x{original_height} by {}x{} to fit {tile_width}x{tile_height} tiles",
                padding.right,
                padding.bottom
            );
            padded = pad(source, padding, pad_color);
            &padded
        };

        let grid = Grid::compute(GridConfig::new(
            canvas.width(),
            canvas.height(),
            tile_width,
            tile_height,
            overlap,
        ))?;

        let tiles = grid
            .iter()
            .map(|(_, rect)| {
                image::imageops::crop_imm(canvas, rect.x, rect.y, rect.width, rect.height)
                    .to_image()
            })
            .collect();

        Ok(Self {
            grid,
            tiles,
            original_width,
            original_height,
            padding,
        })
    }

    #[must_use]
    pub const fn grid(&self) -> &Grid {
        &self.grid
    }

    #[must_use]
    pub const fn padding(&self) -> Padding {
        self.padding
    }

    /// Number of tiles, `n_cols * n_rows`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Tile at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= self.len()`.
    pub fn get(&self, index: usize) -> Result<&Image> {
        self.tiles.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.tiles.len(),
        })
    }

    /// Replace the tile at `index`, dropping the old one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= self.len()`, or
    /// [`Error::DimensionMismatch`] if `tile` differs in size from the tile it
    /// replaces.
    pub fn set(&mut self, index: usize, tile: Image) -> Result<()> {
        let len = self.tiles.len();
        let slot = self
            .tiles
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { index, len })?;

        if slot.dimensions() != tile.dimensions() {
            return Err(Error::DimensionMismatch {
                expected_width: slot.width(),
                expected_height: slot.height(),
                actual_width: tile.width(),
                actual_height: tile.height(),
            });
        }

        *slot = tile;
        Ok(())
    }

    /// Tiles with their grid positions and placements, row-major.
    pub fn iter(&self) -> impl Iterator<Item = (TilePosition, Rect, &Image)> + '_ {
        self.grid
            .iter()
            .zip(&self.tiles)
            .map(|((position, rect), tile)| (position, rect, tile))
    }

    /// Reassemble the tiles into one image of the original (unpadded) size.
    ///
    /// Every tile outside column 0 fades its left overlap band and every tile
    /// outside row 0 fades its top band before it is composited at its
    /// placement. The stored tiles are left untouched.
    #[must_use]
    pub fn patch_fragments(&self) -> Image {
        let cfg = self.grid.config();
        let mut canvas = Image::new(cfg.canvas_width, cfg.canvas_height);

        for (position, rect, tile) in self.iter() {
            let fade = self.fade_for(position);
            if fade.is_opaque() {
                seam::composite_over(&mut canvas, tile, rect.x, rect.y);
            } else {
                seam::composite_over(&mut canvas, &seam::apply_fade(tile, fade), rect.x, rect.y);
            }
        }

        if self.padding.is_empty() {
            canvas
        } else {
            image::imageops::crop_imm(&canvas, 0, 0, self.original_width, self.original_height)
                .to_image()
        }
    }

    /// Fade that [`Self::patch_fragments`] applies to the tile at `position`.
    #[must_use]
    pub const fn fade_for(&self, position: TilePosition) -> EdgeFade {
        EdgeFade::for_position(position, self.grid.overlap())
    }

    /// Drop every tile buffer.
    pub fn release(self) {
        tracing::debug!("Releasing {} tiles", self.tiles.len());
    }
}

/// Copy `source` onto a `pad_color` canvas grown by `padding`.
fn pad(source: &Image, padding: Padding, pad_color: Rgba<u8>) -> Image {
    let mut canvas = Image::from_pixel(
        source.width() + padding.right,
        source.height() + padding.bottom,
        pad_color,
    );
    // Source and canvas share the top-left origin, so this cannot go out of bounds
    image::imageops::replace(&mut canvas, source, 0, 0);
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn numbered(width: u32, height: u32) -> Image {
        Image::from_fn(width, height, |x, y| {
            Rgba([(x % 251) as u8, (y % 241) as u8, ((x * y) % 239) as u8, 255])
        })
    }

    #[test]
    fn test_tiles_match_placements() {
        let img = numbered(800, 600);
        let tiler = Tiler::build(&img, 384, 384, 40, WHITE).unwrap();
        assert_eq!(tiler.len(), 6);
        for (_, rect, tile) in tiler.iter() {
            let expected =
                image::imageops::crop_imm(&img, rect.x, rect.y, rect.width, rect.height).to_image();
            assert_eq!(tile, &expected);
        }
    }

    #[test]
    fn test_patch_reproduces_source() {
        let img = numbered(800, 600);
        let tiler = Tiler::build(&img, 384, 384, 40, WHITE).unwrap();
        assert_eq!(tiler.patch_fragments(), img);
    }

    #[test]
    fn test_zero_overlap_is_pixel_exact() {
        let img = numbered(130, 70);
        let tiler = Tiler::build(&img, 32, 32, 0, WHITE).unwrap();
        assert_eq!(tiler.patch_fragments(), img);
    }

    #[test]
    fn test_undersized_source_is_padded_and_cropped() {
        let img = numbered(100, 80);
        let tiler = Tiler::build(&img, 128, 128, 16, WHITE).unwrap();
        assert_eq!(
            tiler.padding(),
            Padding {
                right: 28,
                bottom: 48
            }
        );
        assert_eq!(tiler.len(), 1);
        assert_eq!(tiler.get(0).unwrap().get_pixel(127, 127), &WHITE);
        assert_eq!(tiler.patch_fragments(), img);
    }

    #[test]
    fn test_padding_along_one_dimension() {
        let img = numbered(300, 50);
        let tiler = Tiler::build(&img, 128, 64, 16, WHITE).unwrap();
        assert_eq!(tiler.padding().right, 0);
        assert_eq!(tiler.padding().bottom, 14);
        assert_eq!(tiler.patch_fragments(), img);
    }

    #[test]
    fn test_overlap_too_large() {
        let img = numbered(800, 600);
        assert!(matches!(
            Tiler::build(&img, 40, 40, 50, WHITE),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_set_validates_index_and_size() {
        let img = numbered(200, 200);
        let mut tiler = Tiler::build(&img, 128, 128, 16, WHITE).unwrap();
        let len = tiler.len();

        assert!(matches!(
            tiler.set(len, Image::new(128, 128)),
            Err(Error::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            tiler.set(0, Image::new(127, 128)),
            Err(Error::DimensionMismatch { .. })
        ));
        assert!(matches!(tiler.get(len), Err(Error::IndexOutOfRange { .. })));

        let red = Image::from_pixel(128, 128, Rgba([255, 0, 0, 255]));
        tiler.set(0, red.clone()).unwrap();
        assert_eq!(tiler.get(0).unwrap(), &red);
    }

    #[test]
    fn test_patch_fades_replaced_tiles() {
        let img = Image::from_pixel(200, 128, Rgba([0, 0, 0, 255]));
        let mut tiler = Tiler::build(&img, 128, 128, 32, WHITE).unwrap();
        assert_eq!(tiler.len(), 2);
        tiler
            .set(1, Image::from_pixel(128, 128, Rgba([255, 255, 255, 255])))
            .unwrap();

        let out = tiler.patch_fragments();
        let left = tiler.grid().left(1);
        // inside the band the ramp mixes black into white, monotonically
        let band: Vec<u8> = (left..left + 32).map(|x| out.get_pixel(x, 10)[0]).collect();
        assert_eq!(band[0], 0);
        assert!(band.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(out.get_pixel(left + 32, 10)[0], 255);
        assert!(out.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn test_fade_for_follows_neighbours() {
        let img = numbered(300, 300);
        let tiler = Tiler::build(&img, 128, 128, 16, WHITE).unwrap();
        let grid = *tiler.grid();
        assert_eq!(grid.n_cols(), 3);

        let first = tiler.fade_for(grid.position(0).unwrap());
        assert!(first.is_opaque());

        let top_row = tiler.fade_for(grid.position(1).unwrap());
        assert_eq!(top_row.alpha_at(0, 0), 0);
        assert_eq!(top_row.alpha_at(0, 100), 0);
        assert_eq!(top_row.alpha_at(16, 0), 255);

        let inner = tiler.fade_for(grid.position(4).unwrap());
        assert_eq!(inner.alpha_at(100, 0), 0);
        assert_eq!(inner.alpha_at(8, 100), inner.alpha_at(100, 8));
        assert_eq!(inner.alpha_at(100, 100), 255);
    }
}
