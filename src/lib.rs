//! # tilestyle
//!
//! Arbitrary-resolution neural style transfer with fixed-size ONNX models.
//!
//! The content image is split into overlapping tiles of the transfer
//! network's input size, every tile is stylized with a blended style
//! embedding, and the results are stitched back together with alpha ramps
//! across the overlaps so no seams show.
//!
//! ## Example
//!
//! ```no_run
//! use tilestyle::image::{save_image, FileSource};
//! use tilestyle::model::ModelConfig;
//! use tilestyle::{Config, Orchestrator};
//!
//! # fn main() -> tilestyle::Result<()> {
//! let orchestrator = Orchestrator::load(Config::default(), &ModelConfig::default(), None)?;
//!
//! let content = FileSource::open("photo.jpg")?;
//! let style = FileSource::open("painting.png")?;
//! let stylized = orchestrator.execute(&content, &style, 0.8, None)?;
//!
//! save_image(&stylized, "stylized.png", 95)?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod image;
pub mod model;
pub mod pipeline;
pub mod tiling;

pub use error::{Error, Result};
pub use pipeline::{
    CancellationToken, Config, JobHandle, Orchestrator, PipelineState, ProgressEvent,
    TileStrategy, Worker,
};
