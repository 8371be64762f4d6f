//! Pixel sources the pipeline reads tiles and encoder inputs from.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::tiling::Rect;

use super::{Image, RGBA_BYTES};

/// Read access to a source image.
///
/// `read_region` writes into a caller-owned buffer so a streaming reader can
/// reuse one allocation per tile.
pub trait ImageSource {
    /// `(width, height)` of the source.
    fn dimensions(&self) -> (u32, u32);

    /// Copy the pixels of `rect` into `dst`, which must be exactly `rect` sized.
    ///
    /// # Errors
    ///
    /// Returns an error if `rect` leaves the source, `dst` has the wrong size,
    /// or the pixels cannot be read.
    fn read_region(&self, rect: Rect, dst: &mut Image) -> Result<()>;

    /// Decode the whole source.
    ///
    /// # Errors
    ///
    /// Returns an error if the pixels cannot be read.
    fn read_full(&self) -> Result<Image>;

    fn width(&self) -> u32 {
        self.dimensions().0
    }

    fn height(&self) -> u32 {
        self.dimensions().1
    }
}

impl<S: ImageSource + ?Sized> ImageSource for &S {
    fn dimensions(&self) -> (u32, u32) {
        (**self).dimensions()
    }

    fn read_region(&self, rect: Rect, dst: &mut Image) -> Result<()> {
        (**self).read_region(rect, dst)
    }

    fn read_full(&self) -> Result<Image> {
        (**self).read_full()
    }
}

/// An image already decoded in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    image: Image,
}

impl MemorySource {
    #[must_use]
    pub const fn new(image: Image) -> Self {
        Self { image }
    }

    #[must_use]
    pub fn into_inner(self) -> Image {
        self.image
    }
}

impl From<Image> for MemorySource {
    fn from(image: Image) -> Self {
        Self::new(image)
    }
}

impl ImageSource for MemorySource {
    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn read_region(&self, rect: Rect, dst: &mut Image) -> Result<()> {
        copy_region(&self.image, rect, dst)
    }

    fn read_full(&self) -> Result<Image> {
        Ok(self.image.clone())
    }
}

/// An image file on disk.
///
/// Opening reads only the header. Dimensions and pixels are reported upright,
/// with the EXIF orientation applied. Pixels are decoded on first access and
/// kept for subsequent region reads, since the supported codecs cannot decode
/// a sub-rectangle in isolation.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    dimensions: (u32, u32),
    decoded: OnceLock<Image>,
}

impl FileSource {
    /// Open `path`, reading its dimensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its format is unknown.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let dimensions = super::upright_dimensions(path)?;

        tracing::debug!(
            "Opened {} ({}x{})",
            path.display(),
            dimensions.0,
            dimensions.1
        );

        Ok(Self {
            path: path.to_path_buf(),
            dimensions,
            decoded: OnceLock::new(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn pixels(&self) -> Result<&Image> {
        if let Some(image) = self.decoded.get() {
            return Ok(image);
        }
        let image = super::load_image(&self.path)?;
        Ok(self.decoded.get_or_init(|| image))
    }
}

impl ImageSource for FileSource {
    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn read_region(&self, rect: Rect, dst: &mut Image) -> Result<()> {
        copy_region(self.pixels()?, rect, dst)
    }

    fn read_full(&self) -> Result<Image> {
        match self.decoded.get() {
            Some(image) => Ok(image.clone()),
            None => super::load_image(&self.path),
        }
    }
}

/// Row-wise copy of `rect` from `src` into `dst`.
fn copy_region(src: &Image, rect: Rect, dst: &mut Image) -> Result<()> {
    if !rect.fits_within(src.width(), src.height()) {
        return Err(Error::IndexOutOfRange {
            index: rect.right().max(rect.bottom()) as usize,
            len: src.width().max(src.height()) as usize,
        });
    }
    if dst.dimensions() != (rect.width, rect.height) {
        return Err(Error::DimensionMismatch {
            expected_width: rect.width,
            expected_height: rect.height,
            actual_width: dst.width(),
            actual_height: dst.height(),
        });
    }

    let src_stride = src.width() as usize * RGBA_BYTES;
    let row_len = rect.width as usize * RGBA_BYTES;
    let src_raw = src.as_raw();
    for (row, dst_row) in dst.chunks_exact_mut(row_len).enumerate() {
        let start = (rect.y as usize + row) * src_stride + rect.x as usize * RGBA_BYTES;
        dst_row.copy_from_slice(&src_raw[start..start + row_len]);
    }
    Ok(())
}
