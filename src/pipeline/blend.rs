//! Interpolation between style embeddings.

use ndarray::{ArrayView1, Zip};

use crate::error::{Error, Result};
use crate::model::Embedding;

/// Blend a style image's embedding with the content image's own embedding.
///
/// `ratio` is the weight of `style`: `style * ratio + content * (1 - ratio)`.
/// A ratio of 1 applies the style image fully, 0 keeps the content's own style.
/// Equal inputs come back unchanged for every ratio.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if `ratio` is outside `[0, 1]` and
/// [`Error::ShapeMismatch`] if the embeddings differ in length.
pub fn blend_styles(
    style: ArrayView1<'_, f32>,
    content: ArrayView1<'_, f32>,
    ratio: f32,
) -> Result<Embedding> {
    if !(0.0..=1.0).contains(&ratio) {
        return Err(Error::InvalidParameter {
            name: "blend_ratio".to_string(),
            reason: format!("{ratio} must be between 0.0 and 1.0"),
        });
    }

    if style.len() != content.len() {
        return Err(Error::ShapeMismatch {
            expected: format!("embedding of length {}", style.len()),
            actual: format!("length {}", content.len()),
        });
    }

    Ok(Zip::from(style)
        .and(content)
        .map_collect(|&s, &c| (s - c).mul_add(ratio, c)))
}
