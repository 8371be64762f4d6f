//! `tilestyle` CLI - Apply an artistic style to images of any size.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tilestyle::image::{save_image, FileSource};
use tilestyle::model::{Accelerator, ModelConfig};
use tilestyle::{Config, JobHandle, Orchestrator, PipelineState, ProgressEvent, Worker};

/// Stylize a content image with the look of a style image.
#[derive(Parser, Debug)]
#[command(name = "tilestyle")]
#[command(version, about, long_about = None)]
struct Args {
    /// Content image path.
    #[arg(value_name = "CONTENT")]
    content: PathBuf,

    /// Style image path.
    #[arg(value_name = "STYLE")]
    style: PathBuf,

    /// Output image path. PNG keeps alpha, JPEG uses --quality.
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Style strength (0.0-1.0). 1.0 applies the style image fully.
    #[arg(short, long, default_value = "1.0", value_name = "FLOAT")]
    ratio: f32,

    /// Tile side in pixels. Must match the transfer model input.
    #[arg(long, default_value = "384", value_name = "PX")]
    tile: u32,

    /// Pixels shared by neighbouring tiles.
    #[arg(long, default_value = "50", value_name = "PX")]
    overlap: u32,

    /// Longest content side; larger images are downscaled first. 0 disables.
    #[arg(long, default_value = "1440", value_name = "PX")]
    max_size: u32,

    /// Output JPEG quality (1-100).
    #[arg(short, long, default_value = "95", value_name = "INT")]
    quality: u8,

    /// Directory holding the ONNX models.
    #[arg(long, value_name = "DIR")]
    model_dir: Option<PathBuf>,

    /// Base URL to download missing models from.
    #[arg(long, value_name = "URL")]
    model_url: Option<String>,

    /// Skip the CUDA provider and run int8 models on the CPU.
    #[arg(long)]
    cpu: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("tilestyle={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run(&args) {
        tracing::error!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run(args: &Args) -> Result<()> {
    let content = FileSource::open(&args.content).context("Failed to open content image")?;
    let style = FileSource::open(&args.style).context("Failed to open style image")?;

    let config = Config {
        tile_width: args.tile,
        tile_height: args.tile,
        overlap: args.overlap,
        max_content_size: (args.max_size > 0).then_some(args.max_size),
        ..Config::default()
    };

    let models = ModelConfig {
        model_dir: args.model_dir.clone(),
        base_url: args.model_url.clone(),
        accelerator: if args.cpu {
            Accelerator::Cpu
        } else {
            Accelerator::Cuda
        },
        ..ModelConfig::default()
    };

    let orchestrator =
        Orchestrator::load(config, &models, None).context("Failed to initialize pipeline")?;
    let worker = Worker::spawn(orchestrator).context("Failed to start pipeline worker")?;

    let job = worker
        .submit(content, style, args.ratio)
        .context("Failed to submit job")?;
    follow(&job);

    let stylized = job.wait().context("Style transfer failed")?;
    worker.shutdown();

    save_image(&stylized, &args.output, args.quality).context("Failed to save output")?;

    println!(
        "Successfully stylized {} -> {}",
        args.content.display(),
        args.output.display()
    );

    Ok(())
}

/// Render a job's progress events until it ends.
fn follow(job: &JobHandle) {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg:<12} [{bar:40.cyan/blue}] {pos}%")
            .expect("valid template")
            .progress_chars("#>-"),
    );

    for event in job.progress().iter() {
        match event {
            ProgressEvent::Stage(state) => pb.set_message(stage_label(state)),
            ProgressEvent::Tile { percent, .. } => pb.set_position(u64::from(percent)),
            ProgressEvent::Finished => {
                pb.finish_with_message("Done");
                break;
            }
            ProgressEvent::Failed(_) => {
                pb.abandon_with_message("Failed");
                break;
            }
        }
    }
}

const fn stage_label(state: PipelineState) -> &'static str {
    match state {
        PipelineState::Ready => "Ready",
        PipelineState::LoadingModel => "Loading",
        PipelineState::EncodingStyle => "Style",
        PipelineState::EncodingContent => "Content",
        PipelineState::Blending => "Blending",
        PipelineState::Transferring { .. } => "Transferring",
        PipelineState::Reconstructing => "Stitching",
        PipelineState::Done => "Done",
        PipelineState::Error => "Failed",
    }
}
