//! Conversion between RGBA pixels and normalized NHWC tensors.

use ndarray::{Array4, ArrayView4};

use crate::error::{Error, Result};
use crate::tiling::EdgeFade;

use super::{Image, ImageTensor, RGB_CHANNELS};

/// Normalizes pixels as `(value - mean) / scale` and back.
///
/// The default (`mean = 0`, `scale = 255`) maps `[0, 255]` to `[0, 1]`, the
/// range the arbitrary style transfer models expect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TensorCodec {
    mean: f32,
    scale: f32,
}

impl Default for TensorCodec {
    fn default() -> Self {
        Self {
            mean: 0.0,
            scale: 255.0,
        }
    }
}

impl TensorCodec {
    /// Create a codec with the given normalization.
    ///
    /// # Errors
    ///
    /// Returns an error if `scale` is zero or either value is not finite.
    pub fn new(mean: f32, scale: f32) -> Result<Self> {
        if !mean.is_finite() || !scale.is_finite() || scale == 0.0 {
            return Err(Error::InvalidParameter {
                name: "tensor_scale".to_string(),
                reason: format!("mean {mean} and scale {scale} must be finite, scale non-zero"),
            });
        }
        Ok(Self { mean, scale })
    }

    /// Zeroed `(1, height, width, 3)` buffer suitable for [`Self::encode_into`].
    #[must_use]
    pub fn buffer(width: u32, height: u32) -> ImageTensor {
        Array4::zeros((1, height as usize, width as usize, RGB_CHANNELS))
    }

    /// Encode `image` into a freshly allocated tensor.
    #[must_use]
    pub fn encode(&self, image: &Image) -> ImageTensor {
        let mut tensor = Self::buffer(image.width(), image.height());
        self.fill(image, &mut tensor);
        tensor
    }

    /// Encode `image` into an existing buffer, reusing its allocation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if the buffer is not
    /// `(1, image.height, image.width, 3)`.
    pub fn encode_into(&self, image: &Image, buffer: &mut ImageTensor) -> Result<()> {
        let expected = [1, image.height() as usize, image.width() as usize, RGB_CHANNELS];
        if buffer.shape() != expected {
            return Err(Error::ShapeMismatch {
                expected: format!("{expected:?}"),
                actual: format!("{:?}", buffer.shape()),
            });
        }
        self.fill(image, buffer);
        Ok(())
    }

    fn fill(&self, image: &Image, tensor: &mut ImageTensor) {
        for (x, y, pixel) in image.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..RGB_CHANNELS {
                tensor[[0, y, x, c]] = (f32::from(pixel[c]) - self.mean) / self.scale;
            }
        }
    }

    /// Decode a `(1, H, W, 3)` tensor into a fully opaque image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if the tensor is not a single NHWC RGB image.
    pub fn decode(&self, tensor: ArrayView4<'_, f32>) -> Result<Image> {
        self.decode_with_fade(tensor, EdgeFade::NONE)
    }

    /// Decode a `(1, H, W, 3)` tensor, writing seam alpha from `fade` in the
    /// same pass as the colour channels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if the tensor is not a single NHWC RGB image.
    #[allow(clippy::cast_possible_truncation)]
    pub fn decode_with_fade(&self, tensor: ArrayView4<'_, f32>, fade: EdgeFade) -> Result<Image> {
        let (batch, height, width, channels) = tensor.dim();
        if batch != 1 || channels != RGB_CHANNELS {
            return Err(Error::ShapeMismatch {
                expected: "[1, H, W, 3]".to_string(),
                actual: format!("{:?}", tensor.shape()),
            });
        }
        let too_large = || Error::ShapeMismatch {
            expected: "dimensions within u32".to_string(),
            actual: format!("{height}x{width}"),
        };
        let width = u32::try_from(width).map_err(|_| too_large())?;
        let height = u32::try_from(height).map_err(|_| too_large())?;

        let opaque = fade.is_opaque();
        Ok(Image::from_fn(width, height, |x, y| {
            let (xi, yi) = (x as usize, y as usize);
            let alpha = if opaque { u8::MAX } else { fade.alpha_at(x, y) };
            image::Rgba([
                self.denormalize(tensor[[0, yi, xi, 0]]),
                self.denormalize(tensor[[0, yi, xi, 1]]),
                self.denormalize(tensor[[0, yi, xi, 2]]),
                alpha,
            ])
        }))
    }

    /// Map a normalized value back to `[0, 255]` with rounding and clamping.
    #[inline]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn denormalize(&self, value: f32) -> u8 {
        // Safe: clamped to [0, 255] range before casting
        value.mul_add(self.scale, self.mean).round().clamp(0.0, 255.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient(width: u32, height: u32) -> Image {
        Image::from_fn(width, height, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8, 255])
        })
    }

    #[test]
    fn test_tensor_shape_and_range() {
        let tensor = TensorCodec::default().encode(&gradient(20, 10));
        assert_eq!(tensor.shape(), &[1, 10, 20, 3]);
        assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_decode_inverts_encode() {
        let codec = TensorCodec::default();
        let image = gradient(37, 23);
        let decoded = codec.decode(codec.encode(&image).view()).unwrap();
        assert_eq!(decoded, image);
    }

    #[test]
    fn test_custom_mean_scale_maps_to_signed_range() {
        let codec = TensorCodec::new(127.5, 127.5).unwrap();
        let black = Image::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        let tensor = codec.encode(&black);
        assert!(tensor.iter().all(|v| (v + 1.0).abs() < 1e-6));
        assert_eq!(codec.decode(tensor.view()).unwrap(), black);
    }

    #[test]
    fn test_zero_scale_rejected() {
        assert!(matches!(
            TensorCodec::new(0.0, 0.0),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_encode_into_rejects_wrong_buffer() {
        let mut buffer = TensorCodec::buffer(8, 8);
        let err = TensorCodec::default()
            .encode_into(&gradient(8, 9), &mut buffer)
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_decode_clamps_out_of_range() {
        let mut tensor = TensorCodec::buffer(1, 1);
        tensor[[0, 0, 0, 0]] = -3.0;
        tensor[[0, 0, 0, 1]] = 4.0;
        let image = TensorCodec::default().decode(tensor.view()).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [0, 255, 0, 255]);
    }

    #[test]
    fn test_decode_bakes_seam_alpha() {
        let codec = TensorCodec::default();
        let tensor = codec.encode(&gradient(16, 16));
        let fade = EdgeFade {
            left: true,
            top: false,
            overlap: 4,
        };
        let tile = codec.decode_with_fade(tensor.view(), fade).unwrap();
        assert_eq!(tile.get_pixel(0, 5)[3], 0);
        assert_eq!(tile.get_pixel(4, 5)[3], 255);
        assert!(tile.enumerate_pixels().all(|(x, y, p)| p[3] == fade.alpha_at(x, y)));
    }

    #[test]
    fn test_decode_rejects_batch() {
        let tensor = Array4::<f32>::zeros((2, 4, 4, 3));
        assert!(TensorCodec::default().decode(tensor.view()).is_err());
    }
}
