//! Image sources, tensor conversion, loading and saving utilities.

mod load;
mod save;
mod source;
mod tensor;

pub use load::{downscale_to_fit, load_image, prepare_encoder_input, upright_dimensions};
pub use save::save_image;
pub use source::{FileSource, ImageSource, MemorySource};
pub use tensor::TensorCodec;

use ndarray::Array4;

/// Owned RGBA pixel buffer. Tiles and canvases use the same type.
pub type Image = image::RgbaImage;

/// Image tensor in NHWC format (batch, height, width, channels).
/// Values are normalized by the codec's mean and scale.
pub type ImageTensor = Array4<f32>;

/// Number of channels in RGB images.
pub const RGB_CHANNELS: usize = 3;

/// Bytes per RGBA pixel.
pub(crate) const RGBA_BYTES: usize = 4;
