//! Streaming tile source.

use crate::error::{Error, Result};
use crate::image::{Image, ImageSource};

use super::grid::{Grid, GridConfig, Rect, TilePosition};

/// A tile borrowed from the reader's reusable buffer.
#[derive(Debug, Clone, Copy)]
pub struct SourceTile<'a> {
    pub position: TilePosition,
    pub rect: Rect,
    pub pixels: &'a Image,
}

/// Forward-only reader yielding one grid tile at a time.
///
/// Only the placement rectangle of the current tile is read from the source,
/// into a single buffer of tile size, so the reader's own memory stays at one
/// tile however large the source is. Restarting means opening a new reader.
pub struct RegionSource<S> {
    source: Option<S>,
    grid: Grid,
    cursor: usize,
    buffer: Image,
}

impl<S: ImageSource> RegionSource<S> {
    /// Open a reader over `source`. Only the source dimensions are queried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the overlap is not smaller than the tile or
    /// the tile does not fit inside the source.
    pub fn open(source: S, tile_width: u32, tile_height: u32, overlap: u32) -> Result<Self> {
        let (width, height) = source.dimensions();
        let grid = Grid::compute(GridConfig::new(
            width,
            height,
            tile_width,
            tile_height,
            overlap,
        ))?;

        tracing::debug!(
            "Streaming {width}x{height} as {}x{} tiles of {tile_width}x{tile_height}",
            grid.n_cols(),
            grid.n_rows()
        );

        Ok(Self {
            source: Some(source),
            grid,
            cursor: 0,
            buffer: Image::new(tile_width, tile_height),
        })
    }

    /// Read the next tile in row-major order, or `None` once every tile has
    /// been read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after [`Self::close`], or the source's error if
    /// the region cannot be read.
    pub fn next_tile(&mut self) -> Result<Option<SourceTile<'_>>> {
        let source = self.source.as_ref().ok_or(Error::Closed)?;
        if self.cursor >= self.grid.len() {
            return Ok(None);
        }

        let position = self.grid.position(self.cursor)?;
        let rect = self.grid.placement(position);
        source.read_region(rect, &mut self.buffer)?;
        self.cursor += 1;

        Ok(Some(SourceTile {
            position,
            rect,
            pixels: &self.buffer,
        }))
    }

    /// Release the underlying source.
    pub fn close(&mut self) {
        self.source = None;
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    #[must_use]
    pub const fn grid(&self) -> &Grid {
        &self.grid
    }

    #[must_use]
    pub const fn number_of_tiles(&self) -> usize {
        self.grid.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::MemorySource;
    use image::Rgba;

    fn numbered(width: u32, height: u32) -> Image {
        Image::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, (x / 256) as u8, 255])
        })
    }

    #[test]
    fn test_streams_every_placement() {
        let img = numbered(800, 600);
        let source = MemorySource::new(img.clone());
        let mut reader = RegionSource::open(&source, 384, 384, 40).unwrap();
        assert_eq!(reader.number_of_tiles(), 6);

        let mut seen = Vec::new();
        while let Some(tile) = reader.next_tile().unwrap() {
            assert_eq!(tile.pixels.dimensions(), (384, 384));
            let expected = image::imageops::crop_imm(
                &img,
                tile.rect.x,
                tile.rect.y,
                tile.rect.width,
                tile.rect.height,
            )
            .to_image();
            assert_eq!(tile.pixels, &expected);
            seen.push(tile.position.index);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
        assert!(reader.next_tile().unwrap().is_none());
    }

    #[test]
    fn test_next_after_close_fails() {
        let source = MemorySource::new(numbered(64, 64));
        let mut reader = RegionSource::open(source, 32, 32, 4).unwrap();
        assert!(reader.next_tile().unwrap().is_some());
        reader.close();
        assert!(reader.is_closed());
        assert!(matches!(reader.next_tile(), Err(Error::Closed)));
    }

    #[test]
    fn test_overlap_too_large() {
        let source = MemorySource::new(numbered(64, 64));
        assert!(matches!(
            RegionSource::open(source, 40, 40, 50),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_source_smaller_than_tile() {
        let source = MemorySource::new(numbered(100, 64));
        assert!(matches!(
            RegionSource::open(source, 128, 128, 8),
            Err(Error::Config { .. })
        ));
    }
}
