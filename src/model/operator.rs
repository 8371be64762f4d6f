//! Inference operators: style encoding and per-tile style transfer.

use ndarray::{Array4, ArrayView1, ArrayView4};
use ort::session::Session;
use ort::value::Tensor;

use crate::error::{Error, Result};
use crate::image::ImageTensor;

use super::Embedding;

/// Predicts a style embedding from a square `(1, S, S, 3)` image tensor.
pub trait StyleEncoder: Send {
    /// # Errors
    ///
    /// Returns [`Error::Inference`] if the operator fails.
    fn predict(&mut self, input: ArrayView4<'_, f32>) -> Result<Embedding>;
}

/// Restyles one `(1, H, W, 3)` tile under a style embedding.
pub trait StyleTransformer: Send {
    /// Write the restyled tile into `output`, which has the shape of `input`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Inference`] if the operator fails, or
    /// [`Error::ShapeMismatch`] if its output does not match `output`.
    fn transform(
        &mut self,
        input: ArrayView4<'_, f32>,
        style: ArrayView1<'_, f32>,
        output: &mut ImageTensor,
    ) -> Result<()>;
}

/// Style prediction network on ONNX Runtime.
pub struct OrtStyleEncoder {
    session: Session,
}

impl OrtStyleEncoder {
    #[must_use]
    pub const fn new(session: Session) -> Self {
        Self { session }
    }
}

impl StyleEncoder for OrtStyleEncoder {
    fn predict(&mut self, input: ArrayView4<'_, f32>) -> Result<Embedding> {
        let input_value = Tensor::from_array(input.to_owned())
            .map_err(|source| Error::inference("style encoder", source))?;

        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(|source| Error::inference("style encoder", source))?;

        let output = outputs
            .values()
            .next()
            .ok_or_else(|| Error::ShapeMismatch {
                expected: "style bottleneck output".to_string(),
                actual: "no output".to_string(),
            })?;

        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|source| Error::inference("style encoder", source))?;

        // Bottleneck comes out as (1, 1, 1, N)
        Ok(Embedding::from_vec(data.to_vec()))
    }
}

/// Style transfer network on ONNX Runtime.
pub struct OrtStyleTransformer {
    session: Session,
}

impl OrtStyleTransformer {
    #[must_use]
    pub const fn new(session: Session) -> Self {
        Self { session }
    }
}

impl StyleTransformer for OrtStyleTransformer {
    fn transform(
        &mut self,
        input: ArrayView4<'_, f32>,
        style: ArrayView1<'_, f32>,
        output: &mut ImageTensor,
    ) -> Result<()> {
        let content_value = Tensor::from_array(input.to_owned())
            .map_err(|source| Error::inference("style transformer", source))?;

        let bottleneck = style
            .to_owned()
            .into_shape_with_order((1, 1, 1, style.len()))
            .map_err(|_| Error::ShapeMismatch {
                expected: "[1, 1, 1, N] bottleneck".to_string(),
                actual: format!("{:?}", style.shape()),
            })?;
        let style_value = Tensor::from_array(bottleneck)
            .map_err(|source| Error::inference("style transformer", source))?;

        let outputs = self
            .session
            .run(ort::inputs![content_value, style_value])
            .map_err(|source| Error::inference("style transformer", source))?;

        let value = outputs
            .values()
            .next()
            .ok_or_else(|| Error::ShapeMismatch {
                expected: "stylized image output".to_string(),
                actual: "no output".to_string(),
            })?;

        let (shape_info, data) = value
            .try_extract_tensor::<f32>()
            .map_err(|source| Error::inference("style transformer", source))?;

        // Safe: tensor dimensions are always non-negative and within bounds
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let dims: Vec<usize> = shape_info.iter().map(|&x| x as usize).collect();

        copy_into(output, &dims, data)
    }
}

/// Copy raw operator output into the caller's tile buffer.
fn copy_into(output: &mut Array4<f32>, dims: &[usize], data: &[f32]) -> Result<()> {
    if dims != output.shape() {
        return Err(Error::ShapeMismatch {
            expected: format!("{:?}", output.shape()),
            actual: format!("{dims:?}"),
        });
    }

    let view = ArrayView4::from_shape(output.raw_dim(), data).map_err(|_| Error::ShapeMismatch {
        expected: format!("{:?}", output.shape()),
        actual: format!("{} values", data.len()),
    })?;
    output.assign(&view);
    Ok(())
}
