//! Model resolution, downloading and loading utilities.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;

use crate::error::{Error, Result};

use super::operator::{OrtStyleEncoder, OrtStyleTransformer};

/// Networks used by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// Style prediction network - image to style bottleneck.
    StylePredict,
    /// Style transfer network - content tile and bottleneck to stylized tile.
    StyleTransfer,
}

/// Numeric precision of a model export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// Half-precision export, used on the accelerated path.
    Float16,
    /// Quantized export, used on the CPU.
    Int8,
}

impl ModelKind {
    /// Get the filename for this model at the given precision.
    #[must_use]
    pub const fn filename(&self, precision: Precision) -> &'static str {
        match (self, precision) {
            (Self::StylePredict, Precision::Float16) => "style_predict_f16_256.onnx",
            (Self::StylePredict, Precision::Int8) => "style_predict_int8_256.onnx",
            (Self::StyleTransfer, Precision::Float16) => "style_transfer_f16_384.onnx",
            (Self::StyleTransfer, Precision::Int8) => "style_transfer_int8_384.onnx",
        }
    }

    /// Get the approximate size in bytes for progress indication.
    #[must_use]
    pub const fn approx_size(&self, precision: Precision) -> u64 {
        match (self, precision) {
            (Self::StylePredict, Precision::Float16) => 4_700_000, // ~4.7 MB
            (Self::StylePredict, Precision::Int8) => 2_800_000,    // ~2.8 MB
            (Self::StyleTransfer, Precision::Float16) => 460_000,  // ~0.5 MB
            (Self::StyleTransfer, Precision::Int8) => 280_000,     // ~0.3 MB
        }
    }
}

/// Execution target for the inference operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Accelerator {
    /// CUDA execution provider with float16 models.
    #[default]
    Cuda,
    /// Default CPU provider with int8 models.
    Cpu,
}

/// Where models live and how they run.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Directory holding model files. `None` uses the platform cache directory.
    pub model_dir: Option<PathBuf>,

    /// Base URL missing models are downloaded from, as `<base>/<filename>`.
    pub base_url: Option<String>,

    /// Preferred execution target.
    pub accelerator: Accelerator,

    /// Intra-op threads for the CPU provider.
    pub cpu_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: None,
            base_url: None,
            accelerator: Accelerator::default(),
            cpu_threads: 4,
        }
    }
}

/// The accelerated path is unavailable; load the CPU variant instead.
#[derive(Debug, thiserror::Error)]
#[error("accelerated {model:?} unavailable: {reason}")]
pub struct NeedsFallback {
    pub model: ModelKind,
    pub reason: String,
}

/// Both operators, loaded for one execution target.
pub struct LoadedOperators {
    pub encoder: OrtStyleEncoder,
    pub transformer: OrtStyleTransformer,
    pub accelerator: Accelerator,
}

/// Manages the model directory and downloads.
pub struct ModelCache {
    cache_dir: PathBuf,
    base_url: Option<String>,
    cpu_threads: usize,
}

impl ModelCache {
    /// Create a new model cache.
    ///
    /// Without an explicit directory, uses the platform-appropriate cache directory:
    /// - Windows: `%LOCALAPPDATA%\tilestyle\models`
    /// - Linux: `~/.cache/tilestyle/models`
    /// - macOS: `~/Library/Caches/tilestyle/models`
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let cache_dir = config.model_dir.clone().unwrap_or_else(|| {
            let base = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
            base.join("tilestyle").join("models")
        });

        fs::create_dir_all(&cache_dir).map_err(|source| Error::CacheDir {
            path: cache_dir.clone(),
            source,
        })?;

        Ok(Self {
            cache_dir,
            base_url: config.base_url.clone(),
            cpu_threads: config.cpu_threads,
        })
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get the path to a model file, downloading if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelMissing`] if the file is absent and no base URL is
    /// configured, or an error if the download fails.
    pub fn get_model_path(&self, kind: ModelKind, precision: Precision) -> Result<PathBuf> {
        let filename = kind.filename(precision);
        let path = self.cache_dir.join(filename);

        if path.exists() {
            return Ok(path);
        }

        let Some(base_url) = &self.base_url else {
            return Err(Error::ModelMissing {
                name: filename.to_string(),
                path,
            });
        };

        let url = format!("{}/{filename}", base_url.trim_end_matches('/'));
        download_file(&url, &path, filename, kind.approx_size(precision))?;
        Ok(path)
    }

    /// Load the float16 export on the CUDA provider, failing instead of
    /// silently running elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`NeedsFallback`] if the model or the provider is unavailable.
    pub fn try_accelerated(&self, kind: ModelKind) -> std::result::Result<Session, NeedsFallback> {
        let fallback = |reason: String| NeedsFallback {
            model: kind,
            reason,
        };

        let path = self
            .get_model_path(kind, Precision::Float16)
            .map_err(|err| fallback(err.to_string()))?;

        Session::builder()
            .and_then(|builder| {
                builder.with_execution_providers([CUDAExecutionProvider::default()
                    .build()
                    .error_on_failure()])
            })
            .and_then(|mut builder| builder.commit_from_file(&path))
            .map_err(|err| fallback(err.to_string()))
    }

    /// Load the int8 export on the CPU provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be found or loaded.
    pub fn load_cpu(&self, kind: ModelKind) -> Result<Session> {
        let path = self.get_model_path(kind, Precision::Int8)?;
        let name = kind.filename(Precision::Int8);

        Session::builder()
            .and_then(|builder| builder.with_intra_threads(self.cpu_threads))
            .and_then(|mut builder| builder.commit_from_file(&path))
            .map_err(|source| Error::ModelLoad {
                name: name.to_string(),
                source,
            })
    }

    /// Load both operators on one execution target.
    ///
    /// With [`Accelerator::Cuda`], both networks are first tried on the
    /// accelerated path; if either needs a fallback, both are loaded on the
    /// CPU so a run never mixes targets.
    ///
    /// # Errors
    ///
    /// Returns an error if the CPU variants cannot be loaded.
    pub fn load_operators(&self, accelerator: Accelerator) -> Result<LoadedOperators> {
        if accelerator == Accelerator::Cuda {
            let accelerated = self
                .try_accelerated(ModelKind::StylePredict)
                .and_then(|predict| {
                    self.try_accelerated(ModelKind::StyleTransfer)
                        .map(|transfer| (predict, transfer))
                });

            match accelerated {
                Ok((predict, transfer)) => {
                    tracing::info!("Loaded style models on CUDA");
                    return Ok(LoadedOperators {
                        encoder: OrtStyleEncoder::new(predict),
                        transformer: OrtStyleTransformer::new(transfer),
                        accelerator: Accelerator::Cuda,
                    });
                }
                Err(err) => tracing::warn!("{err}; falling back to CPU"),
            }
        }

        tracing::info!("Loading style prediction model...");
        let predict = self.load_cpu(ModelKind::StylePredict)?;

        tracing::info!("Loading style transfer model...");
        let transfer = self.load_cpu(ModelKind::StyleTransfer)?;

        Ok(LoadedOperators {
            encoder: OrtStyleEncoder::new(predict),
            transformer: OrtStyleTransformer::new(transfer),
            accelerator: Accelerator::Cpu,
        })
    }
}

/// Download a file from a URL to a path with progress indication.
fn download_file(url: &str, path: &Path, name: &str, approx_size: u64) -> Result<()> {
    tracing::info!("Downloading {name} from {url}");

    let client = reqwest::blocking::Client::new();
    let response = client
        .get(url)
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .map_err(|source| Error::ModelDownload {
            name: name.to_string(),
            source,
        })?;

    let total_size = response.content_length().unwrap_or(approx_size);

    let pb = ProgressBar::new(total_size);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(format!("Downloading {name}"));

    // Write to a temporary file first, then rename for atomicity
    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)?;

    let mut downloaded = 0u64;
    let mut reader = response;

    loop {
        let mut buffer = [0u8; 8192];
        let bytes_read = std::io::Read::read(&mut reader, &mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        file.write_all(&buffer[..bytes_read])?;
        downloaded += bytes_read as u64;
        pb.set_position(downloaded);
    }

    pb.finish_with_message(format!("Downloaded {name}"));

    // Atomic rename
    fs::rename(&temp_path, path)?;

    Ok(())
}
