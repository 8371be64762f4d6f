//! Grid and stride arithmetic for overlapping fixed-size tiles.

use crate::error::{Error, Result};

/// Axis-aligned pixel rectangle, `[x, x + width) × [y, y + height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    #[must_use]
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    #[must_use]
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Whether `self` lies entirely inside a `width × height` canvas.
    #[must_use]
    pub const fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width && self.bottom() <= height
    }
}

/// Inputs of the grid computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridConfig {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub overlap: u32,
}

impl GridConfig {
    #[must_use]
    pub const fn new(
        canvas_width: u32,
        canvas_height: u32,
        tile_width: u32,
        tile_height: u32,
        overlap: u32,
    ) -> Self {
        Self {
            canvas_width,
            canvas_height,
            tile_width,
            tile_height,
            overlap,
        }
    }

    /// Check the tile/overlap relation alone, independent of the canvas.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a tile dimension is zero or the overlap is
    /// not strictly smaller than both tile dimensions.
    pub fn validate_tile(tile_width: u32, tile_height: u32, overlap: u32) -> Result<()> {
        if tile_width == 0 || tile_height == 0 {
            return Err(Error::config(format!(
                "tile size {tile_width}x{tile_height} must be non-zero"
            )));
        }
        if overlap >= tile_width || overlap >= tile_height {
            return Err(Error::config(format!(
                "overlap {overlap} must be smaller than tile size {tile_width}x{tile_height}"
            )));
        }
        Ok(())
    }
}

/// Grid position of a tile, in row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePosition {
    pub index: usize,
    pub col: u32,
    pub row: u32,
}

impl TilePosition {
    /// The tile shares columns with a neighbour on its left.
    #[must_use]
    pub const fn has_left_neighbour(&self) -> bool {
        self.col != 0
    }

    /// The tile shares rows with a neighbour above it.
    #[must_use]
    pub const fn has_top_neighbour(&self) -> bool {
        self.row != 0
    }
}

/// Derived tiling grid.
///
/// Intermediate tiles advance by `stride = tile - overlap`; the last column and
/// row are snapped flush against the right and bottom canvas edges, so the
/// placements always cover the canvas exactly regardless of divisibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    config: GridConfig,
    stride_x: u32,
    stride_y: u32,
    n_cols: u32,
    n_rows: u32,
}

impl Grid {
    /// Compute the grid for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the overlap is not smaller than both tile
    /// dimensions, or if a tile dimension exceeds the canvas.
    pub fn compute(config: GridConfig) -> Result<Self> {
        GridConfig::validate_tile(config.tile_width, config.tile_height, config.overlap)?;

        if config.tile_width > config.canvas_width || config.tile_height > config.canvas_height {
            return Err(Error::config(format!(
                "tile size {}x{} exceeds canvas {}x{}",
                config.tile_width, config.tile_height, config.canvas_width, config.canvas_height
            )));
        }

        let stride_x = config.tile_width - config.overlap;
        let stride_y = config.tile_height - config.overlap;
        let n_cols = (config.canvas_width - config.overlap).div_ceil(stride_x);
        let n_rows = (config.canvas_height - config.overlap).div_ceil(stride_y);

        Ok(Self {
            config,
            stride_x,
            stride_y,
            n_cols,
            n_rows,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &GridConfig {
        &self.config
    }

    #[must_use]
    pub const fn stride_x(&self) -> u32 {
        self.stride_x
    }

    #[must_use]
    pub const fn stride_y(&self) -> u32 {
        self.stride_y
    }

    #[must_use]
    pub const fn n_cols(&self) -> u32 {
        self.n_cols
    }

    #[must_use]
    pub const fn n_rows(&self) -> u32 {
        self.n_rows
    }

    #[must_use]
    pub const fn overlap(&self) -> u32 {
        self.config.overlap
    }

    /// Total number of tiles, `n_cols * n_rows`.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.n_cols as usize * self.n_rows as usize
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Left edge of column `col`.
    #[must_use]
    pub const fn left(&self, col: u32) -> u32 {
        snap(
            col,
            self.n_cols,
            self.stride_x,
            self.config.canvas_width,
            self.config.tile_width,
        )
    }

    /// Top edge of row `row`.
    #[must_use]
    pub const fn top(&self, row: u32) -> u32 {
        snap(
            row,
            self.n_rows,
            self.stride_y,
            self.config.canvas_height,
            self.config.tile_height,
        )
    }

    /// Row-major position of tile `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= self.len()`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn position(&self, index: usize) -> Result<TilePosition> {
        if index >= self.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        // Safe: index < n_cols * n_rows, both u32
        let cols = self.n_cols as usize;
        Ok(TilePosition {
            index,
            col: (index % cols) as u32,
            row: (index / cols) as u32,
        })
    }

    /// Placement rectangle of the tile at `position`.
    #[must_use]
    pub const fn placement(&self, position: TilePosition) -> Rect {
        Rect::new(
            self.left(position.col),
            self.top(position.row),
            self.config.tile_width,
            self.config.tile_height,
        )
    }

    /// All tiles in row-major order (column advances first).
    pub fn iter(&self) -> impl Iterator<Item = (TilePosition, Rect)> + '_ {
        (0..self.n_rows).flat_map(move |row| {
            (0..self.n_cols).map(move |col| {
                let position = TilePosition {
                    index: row as usize * self.n_cols as usize + col as usize,
                    col,
                    row,
                };
                (position, self.placement(position))
            })
        })
    }
}

/// Placement rule along one axis: first slot at 0, last slot flush with the
/// far edge, everything else on the stride.
const fn snap(slot: u32, slots: u32, stride: u32, canvas: u32, tile: u32) -> u32 {
    if slot == 0 {
        0
    } else if slot == slots - 1 {
        canvas - tile
    } else {
        slot * stride
    }
}
