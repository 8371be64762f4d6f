//! Style transfer pipeline: embedding blend, tiled transfer and job execution.

mod blend;
mod config;
mod orchestrator;
mod progress;
mod worker;

pub use blend::blend_styles;
pub use config::{Config, TileStrategy};
pub use orchestrator::Orchestrator;
pub use progress::{
    progress_channel, CancellationToken, PipelineState, ProgressEvent, ProgressReceiver,
    ProgressSender,
};
pub use worker::{JobHandle, Worker};
