//! Inference operators and model loading.

mod loader;
mod operator;

pub use loader::{
    Accelerator, LoadedOperators, ModelCache, ModelConfig, ModelKind, NeedsFallback, Precision,
};
pub use operator::{OrtStyleEncoder, OrtStyleTransformer, StyleEncoder, StyleTransformer};

use ndarray::Array1;

/// Fixed-length style bottleneck produced by the style encoder.
pub type Embedding = Array1<f32>;
