//! Image loading and pre-processing utilities.

use std::path::Path;

use image::metadata::Orientation;
use image::{imageops::FilterType, DynamicImage, ImageDecoder, ImageError, ImageReader, ImageResult};

use crate::error::{Error, Result};

use super::Image;

/// Load an image from disk as RGBA, upright.
///
/// The EXIF orientation recorded by cameras is applied, so the pixels come
/// back the way the picture is meant to be viewed.
///
/// # Errors
///
/// Returns an error if the image cannot be loaded or decoded.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<Image> {
    let path = path.as_ref();

    let mut decoder = open_decoder(path).map_err(|source| load_error(path, source))?;
    let orientation = decoder
        .orientation()
        .map_err(|source| load_error(path, source))?;

    let mut img = DynamicImage::from_decoder(decoder).map_err(|source| load_error(path, source))?;
    img.apply_orientation(orientation);

    Ok(img.to_rgba8())
}

/// `(width, height)` of the image at `path` once its EXIF orientation is
/// applied. Only the header is read.
///
/// # Errors
///
/// Returns an error if the file cannot be read or its format is unknown.
pub fn upright_dimensions<P: AsRef<Path>>(path: P) -> Result<(u32, u32)> {
    let path = path.as_ref();

    let mut decoder = open_decoder(path).map_err(|source| load_error(path, source))?;
    let (width, height) = decoder.dimensions();
    let orientation = decoder
        .orientation()
        .map_err(|source| load_error(path, source))?;

    Ok(if swaps_axes(orientation) {
        (height, width)
    } else {
        (width, height)
    })
}

fn open_decoder(path: &Path) -> ImageResult<impl ImageDecoder> {
    ImageReader::open(path)?.with_guessed_format()?.into_decoder()
}

const fn swaps_axes(orientation: Orientation) -> bool {
    matches!(
        orientation,
        Orientation::Rotate90
            | Orientation::Rotate270
            | Orientation::Rotate90FlipH
            | Orientation::Rotate270FlipH
    )
}

fn load_error(path: &Path, source: ImageError) -> Error {
    Error::ImageLoad {
        path: path.to_path_buf(),
        source,
    }
}

/// Scale `image` to fill a `size × size` square and centre-crop the excess.
///
/// This is the input the style encoder sees for both the style image and the
/// content image.
#[must_use]
pub fn prepare_encoder_input(image: &Image, size: u32) -> Image {
    // Resize with Lanczos3 for quality; the encoder input is small
    DynamicImage::ImageRgba8(image.clone())
        .resize_to_fill(size, size, FilterType::Lanczos3)
        .to_rgba8()
}

/// Downscale `image` so its longer side is at most `max_side`, keeping aspect.
/// Returns `None` when the image already fits.
#[must_use]
pub fn downscale_to_fit(image: &Image, max_side: u32) -> Option<Image> {
    let (width, height) = image.dimensions();
    if width.max(height) <= max_side {
        return None;
    }

    let resized = DynamicImage::ImageRgba8(image.clone()).resize(
        max_side,
        max_side,
        FilterType::Lanczos3,
    );
    Some(resized.to_rgba8())
}

/// Write a 32x16 JPEG, left half red and right half blue, tagged with EXIF
/// orientation 6 (display rotated 90 degrees clockwise).
#[cfg(test)]
pub(crate) fn write_rotated_jpeg(path: &Path) {
    use image::codecs::jpeg::JpegEncoder;
    use image::{Rgb, RgbImage};

    let img = RgbImage::from_fn(32, 16, |x, _| {
        if x < 16 {
            Rgb([255, 0, 0])
        } else {
            Rgb([0, 0, 255])
        }
    });
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, 95)
        .encode_image(&img)
        .unwrap();

    // APP1 Exif: big-endian TIFF header, one IFD entry 0x0112 SHORT = 6
    let exif: [u8; 32] = [
        b'E', b'x', b'i', b'f', 0, 0, b'M', b'M', 0, 0x2A, 0, 0, 0, 8, 0, 1, 0x01, 0x12, 0, 3, 0,
        0, 0, 1, 0, 6, 0, 0, 0, 0, 0, 0,
    ];
    let mut tagged = jpeg[..2].to_vec();
    tagged.extend_from_slice(&[0xFF, 0xE1]);
    tagged.extend_from_slice(&u16::try_from(exif.len() + 2).unwrap().to_be_bytes());
    tagged.extend_from_slice(&exif);
    tagged.extend_from_slice(&jpeg[2..]);
    std::fs::write(path, tagged).unwrap();
}
