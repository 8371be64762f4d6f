//! Custom error types for tilestyle.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error produced by an inference operator implementation.
pub type OperatorError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for the tilestyle library.
#[derive(Error, Debug)]
pub enum Error {
    /// Tiling geometry or pipeline configuration is unusable.
    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    /// More tiles were fed to a reconstruction than it has grid slots.
    #[error("reconstruction is full: all {capacity} tile slots are already placed")]
    Capacity { capacity: usize },

    /// A replacement tile does not have the dimensions of the tile it replaces.
    #[error("tile dimensions {actual_width}x{actual_height} do not match expected {expected_width}x{expected_height}")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    /// Tile or region access beyond the grid or source bounds.
    #[error("index {index} out of range for {len} elements")]
    IndexOutOfRange { index: usize, len: usize },

    /// The reconstructed canvas was requested before every slot was filled.
    #[error("canvas incomplete: {placed} of {expected} tiles placed")]
    IncompleteCanvas { placed: usize, expected: usize },

    /// The streaming tile source was used after `close()`.
    #[error("region source is closed")]
    Closed,

    /// A run was started while another one is still in flight.
    #[error("pipeline is busy with another run")]
    Busy,

    /// The run was cancelled between tiles.
    #[error("pipeline run was cancelled")]
    Cancelled,

    /// The pipeline worker thread is gone.
    #[error("pipeline worker stopped")]
    WorkerStopped,

    /// Failed to load an image file.
    #[error("failed to load image from {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Failed to save an image file.
    #[error("failed to save image to {path}: {source}")]
    ImageSave {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Model file is absent and no download location is configured.
    #[error("model {name} not found at {path}")]
    ModelMissing { name: String, path: PathBuf },

    /// Failed to download a model.
    #[error("failed to download model {name}: {source}")]
    ModelDownload {
        name: String,
        #[source]
        source: reqwest::Error,
    },

    /// Failed to load an ONNX model.
    #[error("failed to load ONNX model {name}: {source}")]
    ModelLoad {
        name: String,
        #[source]
        source: ort::Error,
    },

    /// An external inference operator failed.
    #[error("{operator} inference failed: {source}")]
    Inference {
        operator: &'static str,
        #[source]
        source: OperatorError,
    },

    /// Failed to create cache directory.
    #[error("failed to create cache directory {path}: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shape mismatch in tensor operations.
    #[error("tensor shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },
}

impl Error {
    /// Build a [`Error::Config`] from any displayable reason.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Wrap an operator failure as [`Error::Inference`].
    pub fn inference(operator: &'static str, source: impl Into<OperatorError>) -> Self {
        Self::Inference {
            operator,
            source: source.into(),
        }
    }
}

/// Result type alias for tilestyle operations.
pub type Result<T> = std::result::Result<T, Error>;
