//! Seam blending for overlapping tiles.
//!
//! A tile that shares columns with its left neighbour (or rows with its top
//! neighbour) gets a linear alpha ramp across the shared band, rising from 0 at
//! the shared edge to fully opaque where the band ends. Compositing such a tile
//! source-over onto the already placed neighbour cross-fades the two instead of
//! leaving a hard seam.
//!
//! The ramp can be baked in while a tensor is converted to pixels (see
//! [`TensorCodec::decode_with_fade`](crate::image::TensorCodec::decode_with_fade))
//! or applied afterwards with [`fade_left_edge`] / [`fade_top_edge`]. Both use
//! [`ramp`] and therefore agree exactly.

use image::{Rgba, RgbaImage};

use super::grid::TilePosition;

/// Alpha of the `offset`-th column (or row) from a shared edge.
///
/// Non-decreasing in `offset`, 0 at the edge and 255 from `overlap` inward.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn ramp(offset: u32, overlap: u32) -> u8 {
    if offset >= overlap {
        return u8::MAX;
    }
    // Safe: offset < overlap, so the quotient is below 255
    (u64::from(offset) * 255 / u64::from(overlap)) as u8
}

/// Which edges of a tile fade, and over how many pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeFade {
    pub left: bool,
    pub top: bool,
    pub overlap: u32,
}

impl EdgeFade {
    /// Fully opaque tile.
    pub const NONE: Self = Self {
        left: false,
        top: false,
        overlap: 0,
    };

    /// Fade the edges a tile at `position` shares with earlier tiles.
    #[must_use]
    pub const fn for_position(position: TilePosition, overlap: u32) -> Self {
        Self {
            left: position.has_left_neighbour(),
            top: position.has_top_neighbour(),
            overlap,
        }
    }

    #[must_use]
    pub const fn is_opaque(&self) -> bool {
        self.overlap == 0 || (!self.left && !self.top)
    }

    /// Alpha at tile-local `(x, y)`: the smaller ramp in the top-left corner,
    /// the top ramp in the top band, the left ramp in the left band, opaque
    /// elsewhere.
    #[inline]
    #[must_use]
    pub fn alpha_at(&self, x: u32, y: u32) -> u8 {
        let left = if self.left { ramp(x, self.overlap) } else { u8::MAX };
        let top = if self.top { ramp(y, self.overlap) } else { u8::MAX };
        left.min(top)
    }
}

/// Copy of `tile` with its first `overlap` columns ramped from transparent to
/// opaque, row by row.
#[must_use]
pub fn fade_left_edge(tile: &RgbaImage, overlap: u32) -> RgbaImage {
    apply_fade(
        tile,
        EdgeFade {
            left: true,
            top: false,
            overlap,
        },
    )
}

/// Copy of `tile` with its first `overlap` rows ramped from transparent to
/// opaque, column by column.
#[must_use]
pub fn fade_top_edge(tile: &RgbaImage, overlap: u32) -> RgbaImage {
    apply_fade(
        tile,
        EdgeFade {
            left: false,
            top: true,
            overlap,
        },
    )
}

/// Copy of `tile` with `fade` applied. Existing alpha is only ever lowered, so
/// fading left then top gives the same corner as baking both at once.
#[must_use]
pub fn apply_fade(tile: &RgbaImage, fade: EdgeFade) -> RgbaImage {
    let mut out = tile.clone();
    if fade.is_opaque() {
        return out;
    }
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        if x >= fade.overlap && y >= fade.overlap {
            continue;
        }
        pixel[3] = pixel[3].min(fade.alpha_at(x, y));
    }
    out
}

/// Straight-alpha source-over of `tile` onto `canvas` with its top-left corner
/// at `(left, top)`. Parts of the tile outside the canvas are dropped.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn composite_over(canvas: &mut RgbaImage, tile: &RgbaImage, left: u32, top: u32) {
    let width = tile.width().min(canvas.width().saturating_sub(left));
    let height = tile.height().min(canvas.height().saturating_sub(top));

    for y in 0..height {
        for x in 0..width {
            let src = tile.get_pixel(x, y);
            let dst = canvas.get_pixel_mut(left + x, top + y);
            match src[3] {
                0 => {}
                u8::MAX => *dst = *src,
                _ => *dst = blend_over(*src, *dst),
            }
        }
    }
}

#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn blend_over(src: Rgba<u8>, dst: Rgba<u8>) -> Rgba<u8> {
    let sa = f32::from(src[3]) / 255.0;
    let da = f32::from(dst[3]) / 255.0;
    let out_a = da.mul_add(1.0 - sa, sa);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let s = f32::from(src[c]);
        let d = f32::from(dst[c]);
        // Safe: convex combination of two u8 values stays within [0, 255]
        out[c] = (s.mul_add(sa, d * da * (1.0 - sa)) / out_a).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}
