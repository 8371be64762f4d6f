//! Style transfer over tiled content.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, TryLockError};

use ndarray::ArrayView1;

use crate::error::{Error, Result};
use crate::image::{
    downscale_to_fit, prepare_encoder_input, Image, ImageSource, ImageTensor, MemorySource,
    TensorCodec,
};
use crate::model::{Embedding, ModelCache, ModelConfig, StyleEncoder, StyleTransformer};
use crate::tiling::{Reconstructor, RegionSource, Tiler};

use super::blend::blend_styles;
use super::config::{Config, TileStrategy};
use super::progress::{CancellationToken, PipelineState, ProgressSender, Reporter};

/// Tensor buffers reused across every tile of one run.
struct Scratch {
    encoder_input: ImageTensor,
    tile_input: ImageTensor,
    tile_output: ImageTensor,
}

impl Scratch {
    fn new(config: &Config) -> Self {
        Self {
            encoder_input: TensorCodec::buffer(config.encoder_size, config.encoder_size),
            tile_input: TensorCodec::buffer(config.tile_width, config.tile_height),
            tile_output: TensorCodec::buffer(config.tile_width, config.tile_height),
        }
    }
}

/// Operator handles plus the scratch of the run in flight.
struct Engine {
    encoder: Box<dyn StyleEncoder>,
    transformer: Box<dyn StyleTransformer>,
    scratch: Option<Scratch>,
}

/// Releases the single-flight flag when a run ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Busy)?;
        Ok(Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs style encoding, embedding blending and per-tile transfer, and
/// reassembles the stylized content.
///
/// One run at a time: a second [`Orchestrator::execute`] while one is in
/// flight fails with [`Error::Busy`] instead of waiting.
pub struct Orchestrator {
    config: Config,
    codec: TensorCodec,
    engine: Mutex<Engine>,
    busy: AtomicBool,
    state: Mutex<PipelineState>,
}

impl Orchestrator {
    /// Create an orchestrator around already loaded operators.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: Config,
        encoder: Box<dyn StyleEncoder>,
        transformer: Box<dyn StyleTransformer>,
    ) -> Result<Self> {
        config.validate()?;
        let codec = config.codec()?;

        tracing::info!("Initializing pipeline with config: {config:?}");

        Ok(Self {
            config,
            codec,
            engine: Mutex::new(Engine {
                encoder,
                transformer,
                scratch: None,
            }),
            busy: AtomicBool::new(false),
            state: Mutex::new(PipelineState::Ready),
        })
    }

    /// Load the ONNX operators described by `models` and create an orchestrator.
    ///
    /// This will download models if they are missing and a base URL is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or models cannot be loaded.
    pub fn load(
        config: Config,
        models: &ModelConfig,
        progress: Option<&ProgressSender>,
    ) -> Result<Self> {
        config.validate()?;

        let reporter = Reporter::new(progress);
        reporter.stage(PipelineState::LoadingModel);

        let loaded = match ModelCache::new(models)
            .and_then(|cache| cache.load_operators(models.accelerator))
        {
            Ok(loaded) => loaded,
            Err(err) => {
                reporter.stage(PipelineState::Error);
                reporter.failed(&err);
                return Err(err);
            }
        };

        tracing::info!("Style models loaded ({:?})", loaded.accelerator);

        let orchestrator = Self::new(
            config,
            Box::new(loaded.encoder),
            Box::new(loaded.transformer),
        )?;
        reporter.stage(PipelineState::Ready);
        Ok(orchestrator)
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Current state of the state machine.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a run is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Whether per-run scratch tensors are currently allocated.
    #[must_use]
    pub fn holds_scratch(&self) -> bool {
        match self.engine.try_lock() {
            Ok(engine) => engine.scratch.is_some(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().scratch.is_some(),
            Err(TryLockError::WouldBlock) => true,
        }
    }

    /// Stylize `content` with `style`.
    ///
    /// `blend_ratio` weights the style image's embedding against the content
    /// image's own: 1 applies the style fully, 0 keeps the content's style.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if another run is in flight, or the first error
    /// of the run. No partially stitched image is ever returned.
    pub fn execute(
        &self,
        content: &dyn ImageSource,
        style: &dyn ImageSource,
        blend_ratio: f32,
        progress: Option<&ProgressSender>,
    ) -> Result<Image> {
        self.execute_cancellable(content, style, blend_ratio, progress, &CancellationToken::new())
    }

    /// [`Self::execute`] with a cancellation token checked between tiles.
    ///
    /// # Errors
    ///
    /// Same as [`Self::execute`], plus [`Error::Cancelled`].
    pub fn execute_cancellable(
        &self,
        content: &dyn ImageSource,
        style: &dyn ImageSource,
        blend_ratio: f32,
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<Image> {
        let _busy = BusyGuard::acquire(&self.busy)?;
        let mut engine = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
        let mut reporter = Reporter::new(progress);

        let result = self.run(&mut engine, content, style, blend_ratio, &mut reporter, cancel);
        engine.scratch = None;

        match &result {
            Ok(image) => {
                tracing::info!(
                    "Style transfer complete ({}x{})",
                    image.width(),
                    image.height()
                );
                self.enter(PipelineState::Done, &reporter);
                reporter.finished();
            }
            Err(err) => {
                tracing::error!("Style transfer failed: {err}");
                self.enter(PipelineState::Error, &reporter);
                reporter.failed(err);
            }
        }

        result
    }

    /// Release the operator handles.
    pub fn shutdown(self) {
        let engine = self
            .engine
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        drop(engine);
        tracing::info!("Inference operators released");
    }

    fn run(
        &self,
        engine: &mut Engine,
        content: &dyn ImageSource,
        style: &dyn ImageSource,
        blend_ratio: f32,
        reporter: &mut Reporter<'_>,
        cancel: &CancellationToken,
    ) -> Result<Image> {
        let Engine {
            encoder,
            transformer,
            scratch,
        } = engine;
        ensure_not_empty("style", style)?;
        ensure_not_empty("content", content)?;
        let scratch = scratch.get_or_insert_with(|| Scratch::new(&self.config));

        self.enter(PipelineState::EncodingStyle, reporter);
        let style_embedding =
            self.encode(encoder.as_mut(), &mut scratch.encoder_input, &style.read_full()?)?;

        self.enter(PipelineState::EncodingContent, reporter);
        let content_pixels = content.read_full()?;
        let content_embedding =
            self.encode(encoder.as_mut(), &mut scratch.encoder_input, &content_pixels)?;

        self.enter(PipelineState::Blending, reporter);
        let blended = blend_styles(style_embedding.view(), content_embedding.view(), blend_ratio)?;

        // tiles are cut from the pixels already decoded for the encoder
        let working = match self
            .config
            .max_content_size
            .and_then(|max| downscale_to_fit(&content_pixels, max))
        {
            Some(image) => {
                tracing::info!(
                    "Content downscaled from {}x{} to {}x{}",
                    content_pixels.width(),
                    content_pixels.height(),
                    image.width(),
                    image.height()
                );
                image
            }
            None => content_pixels,
        };
        let source = MemorySource::new(working);

        let (width, height) = source.dimensions();
        let eager = match self.config.tile_strategy {
            TileStrategy::Auto => {
                width < self.config.tile_width || height < self.config.tile_height
            }
            TileStrategy::Eager => true,
            TileStrategy::Streaming => false,
        };

        if eager {
            self.transfer_eager(&source, transformer.as_mut(), scratch, blended.view(), reporter, cancel)
        } else {
            self.transfer_streaming(&source, transformer.as_mut(), scratch, blended.view(), reporter, cancel)
        }
    }

    /// Predict the embedding of `pixels` scaled and cropped to the encoder input.
    fn encode(
        &self,
        encoder: &mut dyn StyleEncoder,
        buffer: &mut ImageTensor,
        pixels: &Image,
    ) -> Result<Embedding> {
        let prepared = prepare_encoder_input(pixels, self.config.encoder_size);
        self.codec.encode_into(&prepared, buffer)?;

        let embedding = encoder.predict(buffer.view())?;
        if embedding.len() != self.config.embedding_len {
            return Err(Error::ShapeMismatch {
                expected: format!("embedding of length {}", self.config.embedding_len),
                actual: format!("length {}", embedding.len()),
            });
        }
        Ok(embedding)
    }

    /// Read, transfer and place one tile at a time.
    fn transfer_streaming(
        &self,
        source: &dyn ImageSource,
        transformer: &mut dyn StyleTransformer,
        scratch: &mut Scratch,
        style: ArrayView1<'_, f32>,
        reporter: &mut Reporter<'_>,
        cancel: &CancellationToken,
    ) -> Result<Image> {
        let cfg = &self.config;
        let (width, height) = source.dimensions();

        let mut reader = RegionSource::open(source, cfg.tile_width, cfg.tile_height, cfg.overlap)?;
        let mut builder = Reconstructor::open(
            width,
            height,
            cfg.tile_width,
            cfg.tile_height,
            cfg.overlap,
            self.codec,
        )?;

        let total = builder.number_of_tiles();
        tracing::info!("Transferring {width}x{height} as {total} streamed tiles");
        self.enter(PipelineState::Transferring { done: 0, total }, reporter);

        while let Some(tile) = reader.next_tile()? {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let index = tile.position.index;
            self.codec.encode_into(tile.pixels, &mut scratch.tile_input)?;
            transformer.transform(scratch.tile_input.view(), style, &mut scratch.tile_output)?;
            builder.put(scratch.tile_output.view())?;
            tracing::debug!("Tile {}/{total} placed at {:?}", index + 1, tile.rect);

            self.set_state(PipelineState::Transferring {
                done: index + 1,
                total,
            });
            reporter.tile(index, total);
        }
        reader.close();

        self.enter(PipelineState::Reconstructing, reporter);
        builder.into_image()
    }

    /// Split the whole source up front, replace every tile, then patch.
    fn transfer_eager(
        &self,
        source: &dyn ImageSource,
        transformer: &mut dyn StyleTransformer,
        scratch: &mut Scratch,
        style: ArrayView1<'_, f32>,
        reporter: &mut Reporter<'_>,
        cancel: &CancellationToken,
    ) -> Result<Image> {
        let cfg = &self.config;
        let mut tiler = Tiler::build(
            &source.read_full()?,
            cfg.tile_width,
            cfg.tile_height,
            cfg.overlap,
            cfg.pad_color,
        )?;

        let total = tiler.len();
        tracing::info!("Transferring {total} eager tiles");
        self.enter(PipelineState::Transferring { done: 0, total }, reporter);

        for index in 0..total {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            self.codec.encode_into(tiler.get(index)?, &mut scratch.tile_input)?;
            transformer.transform(scratch.tile_input.view(), style, &mut scratch.tile_output)?;
            tiler.set(index, self.codec.decode(scratch.tile_output.view())?)?;
            tracing::debug!("Tile {}/{total} transferred", index + 1);

            self.set_state(PipelineState::Transferring {
                done: index + 1,
                total,
            });
            reporter.tile(index, total);
        }

        self.enter(PipelineState::Reconstructing, reporter);
        let image = tiler.patch_fragments();
        tiler.release();
        Ok(image)
    }

    fn set_state(&self, state: PipelineState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn enter(&self, state: PipelineState, reporter: &Reporter<'_>) {
        tracing::debug!("Pipeline state: {state:?}");
        self.set_state(state);
        reporter.stage(state);
    }
}

/// Reject sources with no pixels before any resampling touches them.
fn ensure_not_empty(role: &str, source: &dyn ImageSource) -> Result<()> {
    let (width, height) = source.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::InvalidParameter {
            name: role.to_string(),
            reason: format!("image is {width}x{height}, both sides must be non-zero"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use image::Rgba;
    use ndarray::{ArrayView4, Axis};

    use super::*;
    use crate::pipeline::progress::{progress_channel, ProgressEvent, ProgressReceiver};

    const EMBEDDING_LEN: usize = 8;

    /// Embedding filled with the mean red value of the encoder input.
    struct MeanRedEncoder;

    impl StyleEncoder for MeanRedEncoder {
        fn predict(&mut self, input: ArrayView4<'_, f32>) -> Result<Embedding> {
            let mean = input.index_axis(Axis(3), 0).mean().unwrap_or(0.0);
            Ok(Embedding::from_elem(EMBEDDING_LEN, mean))
        }
    }

    struct Identity;

    impl StyleTransformer for Identity {
        fn transform(
            &mut self,
            input: ArrayView4<'_, f32>,
            _style: ArrayView1<'_, f32>,
            output: &mut ImageTensor,
        ) -> Result<()> {
            output.assign(&input);
            Ok(())
        }
    }

    struct Invert;

    impl StyleTransformer for Invert {
        fn transform(
            &mut self,
            input: ArrayView4<'_, f32>,
            _style: ArrayView1<'_, f32>,
            output: &mut ImageTensor,
        ) -> Result<()> {
            output.zip_mut_with(&input, |o, &i| *o = 1.0 - i);
            Ok(())
        }
    }

    /// Identity that fails on the `fail_on`-th call (0-based).
    struct FailOn {
        fail_on: usize,
        calls: usize,
    }

    impl StyleTransformer for FailOn {
        fn transform(
            &mut self,
            input: ArrayView4<'_, f32>,
            _style: ArrayView1<'_, f32>,
            output: &mut ImageTensor,
        ) -> Result<()> {
            let call = self.calls;
            self.calls += 1;
            if call == self.fail_on {
                return Err(Error::inference("style transformer", "device lost"));
            }
            output.assign(&input);
            Ok(())
        }
    }

    /// Identity that records every style embedding it receives.
    struct Recording(Arc<Mutex<Vec<Embedding>>>);

    impl StyleTransformer for Recording {
        fn transform(
            &mut self,
            input: ArrayView4<'_, f32>,
            style: ArrayView1<'_, f32>,
            output: &mut ImageTensor,
        ) -> Result<()> {
            self.0.lock().unwrap().push(style.to_owned());
            output.assign(&input);
            Ok(())
        }
    }

    /// Identity that cancels `token` during its `cancel_on`-th call.
    struct CancelOn {
        token: CancellationToken,
        cancel_on: usize,
        calls: Arc<AtomicUsize>,
    }

    impl StyleTransformer for CancelOn {
        fn transform(
            &mut self,
            input: ArrayView4<'_, f32>,
            _style: ArrayView1<'_, f32>,
            output: &mut ImageTensor,
        ) -> Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == self.cancel_on {
                self.token.cancel();
            }
            output.assign(&input);
            Ok(())
        }
    }

    /// Identity that parks on its first call until released.
    struct Blocking {
        started: crossbeam_channel::Sender<()>,
        release: crossbeam_channel::Receiver<()>,
        first: bool,
    }

    impl StyleTransformer for Blocking {
        fn transform(
            &mut self,
            input: ArrayView4<'_, f32>,
            _style: ArrayView1<'_, f32>,
            output: &mut ImageTensor,
        ) -> Result<()> {
            if std::mem::take(&mut self.first) {
                self.started.send(()).unwrap();
                self.release.recv().unwrap();
            }
            output.assign(&input);
            Ok(())
        }
    }

    fn config(tile: u32, overlap: u32) -> Config {
        Config {
            tile_width: tile,
            tile_height: tile,
            overlap,
            encoder_size: 16,
            embedding_len: EMBEDDING_LEN,
            max_content_size: None,
            ..Config::default()
        }
    }

    fn orchestrator(config: Config, transformer: impl StyleTransformer + 'static) -> Orchestrator {
        Orchestrator::new(config, Box::new(MeanRedEncoder), Box::new(transformer)).unwrap()
    }

    fn numbered(width: u32, height: u32) -> Image {
        Image::from_fn(width, height, |x, y| {
            Rgba([(x % 251) as u8, (y % 241) as u8, ((x ^ y) % 256) as u8, 255])
        })
    }

    fn solid(value: u8) -> MemorySource {
        MemorySource::new(Image::from_pixel(32, 32, Rgba([value, value, value, 255])))
    }

    fn drain(rx: &ProgressReceiver) -> Vec<ProgressEvent> {
        std::iter::from_fn(|| rx.try_recv()).collect()
    }

    fn tile_percents(events: &[ProgressEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Tile { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_reference_scenario_identity_is_pixel_exact() {
        let orch = orchestrator(config(384, 40), Identity);
        let content = MemorySource::new(numbered(800, 600));
        let (tx, rx) = progress_channel();

        let out = orch.execute(&content, &solid(200), 0.5, Some(&tx)).unwrap();
        assert_eq!(out.dimensions(), (800, 600));
        assert_eq!(&out, &content.clone().into_inner());

        let events = drain(&rx);
        assert_eq!(tile_percents(&events), vec![16, 33, 50, 66, 83, 100]);
        assert_eq!(events.last(), Some(&ProgressEvent::Finished));
        assert_eq!(orch.state(), PipelineState::Done);
        assert!(!orch.holds_scratch());
    }

    #[test]
    fn test_state_sequence() {
        let orch = orchestrator(config(64, 8), Identity);
        let content = MemorySource::new(numbered(100, 100));
        let (tx, rx) = progress_channel();
        orch.execute(&content, &solid(0), 1.0, Some(&tx)).unwrap();

        let stages: Vec<PipelineState> = drain(&rx)
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Stage(state) => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            stages,
            vec![
                PipelineState::EncodingStyle,
                PipelineState::EncodingContent,
                PipelineState::Blending,
                PipelineState::Transferring { done: 0, total: 4 },
                PipelineState::Reconstructing,
                PipelineState::Done,
            ]
        );
    }

    #[test]
    fn test_overlap_larger_than_tile_rejected() {
        let config = Config {
            tile_width: 40,
            overlap: 50,
            ..config(384, 40)
        };
        let result = Orchestrator::new(config, Box::new(MeanRedEncoder), Box::new(Identity));
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_inference_failure_on_third_tile() {
        let orch = orchestrator(
            config(384, 40),
            FailOn {
                fail_on: 2,
                calls: 0,
            },
        );
        let content = MemorySource::new(numbered(800, 600));
        let (tx, rx) = progress_channel();

        let err = orch.execute(&content, &solid(9), 0.5, Some(&tx)).unwrap_err();
        assert!(matches!(err, Error::Inference { .. }));
        assert_eq!(orch.state(), PipelineState::Error);
        assert!(!orch.holds_scratch());
        assert!(!orch.is_busy());

        let events = drain(&rx);
        assert_eq!(tile_percents(&events), vec![16, 33]);
        assert!(matches!(events.last(), Some(ProgressEvent::Failed(_))));
        assert!(!events.contains(&ProgressEvent::Finished));

        // the operator only fails once, so the next run goes through
        let again = orch.execute(&content, &solid(9), 0.5, None).unwrap();
        assert_eq!(again, content.into_inner());
        assert_eq!(orch.state(), PipelineState::Done);
    }

    #[test]
    fn test_blend_ratio_weights_style_embedding() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let orch = orchestrator(config(32, 4), Recording(Arc::clone(&seen)));
        // style is all white (1.0), content all black (0.0)
        let content = solid(0);
        let style = solid(255);

        for (ratio, expected) in [(1.0, 1.0), (0.0, 0.0), (0.25, 0.25)] {
            seen.lock().unwrap().clear();
            orch.execute(&content, &style, ratio, None).unwrap();
            let recorded = seen.lock().unwrap();
            assert_eq!(recorded.len(), 1);
            assert!(recorded[0].iter().all(|v| (v - expected).abs() < 1e-3));
        }
    }

    #[test]
    fn test_invalid_ratio() {
        let orch = orchestrator(config(32, 4), Identity);
        let err = orch.execute(&solid(1), &solid(2), 1.5, None).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
        assert_eq!(orch.state(), PipelineState::Error);
    }

    #[test]
    fn test_undersized_content_tiles_eagerly() {
        let orch = orchestrator(config(128, 16), Identity);
        let img = numbered(100, 80);
        let out = orch
            .execute(&MemorySource::new(img.clone()), &solid(5), 0.5, None)
            .unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn test_forced_streaming_rejects_undersized_content() {
        let config = Config {
            tile_strategy: TileStrategy::Streaming,
            ..config(128, 16)
        };
        let orch = orchestrator(config, Identity);
        let err = orch
            .execute(&MemorySource::new(numbered(100, 80)), &solid(5), 0.5, None)
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_eager_and_streaming_agree() {
        let img = numbered(300, 200);
        let expected = Image::from_fn(300, 200, |x, y| {
            let p = img.get_pixel(x, y);
            Rgba([255 - p[0], 255 - p[1], 255 - p[2], 255])
        });
        let content = MemorySource::new(img);

        for strategy in [TileStrategy::Streaming, TileStrategy::Eager] {
            let config = Config {
                tile_strategy: strategy,
                ..config(96, 24)
            };
            let out = orchestrator(config, Invert)
                .execute(&content, &solid(5), 0.5, None)
                .unwrap();
            assert_eq!(out, expected, "{strategy:?}");
        }
    }

    #[test]
    fn test_large_content_is_downscaled() {
        let config = Config {
            max_content_size: Some(150),
            ..config(64, 8)
        };
        let orch = orchestrator(config, Identity);
        let out = orch
            .execute(&MemorySource::new(numbered(300, 200)), &solid(5), 0.5, None)
            .unwrap();
        assert_eq!(out.dimensions(), (150, 100));
    }

    #[test]
    fn test_cancel_stops_after_current_tile() {
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let orch = orchestrator(
            config(64, 8),
            CancelOn {
                token: token.clone(),
                cancel_on: 1,
                calls: Arc::clone(&calls),
            },
        );
        let content = MemorySource::new(numbered(200, 200));

        let err = orch
            .execute_cancellable(&content, &solid(5), 0.5, None, &token)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(orch.state(), PipelineState::Error);
        assert!(!orch.holds_scratch());
    }

    #[test]
    fn test_concurrent_execute_is_busy() {
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded(1);
        let orch = Arc::new(orchestrator(
            config(64, 8),
            Blocking {
                started: started_tx,
                release: release_rx,
                first: true,
            },
        ));
        let content = MemorySource::new(numbered(100, 100));

        let running = {
            let orch = Arc::clone(&orch);
            let content = content.clone();
            std::thread::spawn(move || orch.execute(&content, &content, 0.5, None))
        };

        started_rx.recv().unwrap();
        assert!(orch.is_busy());
        assert!(orch.holds_scratch());
        assert_eq!(
            orch.state(),
            PipelineState::Transferring { done: 0, total: 4 }
        );
        assert!(matches!(
            orch.execute(&content, &content, 0.5, None),
            Err(Error::Busy)
        ));

        release_tx.send(()).unwrap();
        let out = running.join().unwrap().unwrap();
        assert_eq!(out, content.into_inner());
        assert!(!orch.is_busy());
        assert_eq!(orch.state(), PipelineState::Done);
    }

    #[test]
    fn test_new_orchestrator_is_ready() {
        let orch = orchestrator(config(32, 4), Identity);
        assert_eq!(orch.state(), PipelineState::Ready);
        assert!(!orch.is_busy());
        assert!(!orch.holds_scratch());
    }

    #[test]
    fn test_empty_content_rejected() {
        let orch = orchestrator(config(32, 4), Identity);
        let err = orch
            .execute(&MemorySource::new(Image::new(0, 0)), &solid(5), 0.5, None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { ref name, .. } if name == "content"));
        assert_eq!(orch.state(), PipelineState::Error);
        assert!(!orch.holds_scratch());
    }

    #[test]
    fn test_empty_style_rejected() {
        let orch = orchestrator(config(32, 4), Identity);
        let content = MemorySource::new(numbered(64, 64));
        let err = orch
            .execute(&content, &MemorySource::new(Image::new(40, 0)), 0.5, None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { ref name, .. } if name == "style"));

        // a zero-width content strip is just as unusable
        let strip = MemorySource::new(Image::new(0, 64));
        assert!(orch.execute(&strip, &solid(5), 0.5, None).is_err());
    }

    #[test]
    fn test_content_decoded_once() {
        /// Counts full decodes and region reads of a wrapped image.
        struct Counting {
            inner: MemorySource,
            full: AtomicUsize,
            regions: AtomicUsize,
        }

        impl ImageSource for Counting {
            fn dimensions(&self) -> (u32, u32) {
                self.inner.dimensions()
            }
            fn read_region(&self, rect: crate::tiling::Rect, dst: &mut Image) -> Result<()> {
                self.regions.fetch_add(1, Ordering::SeqCst);
                self.inner.read_region(rect, dst)
            }
            fn read_full(&self) -> Result<Image> {
                self.full.fetch_add(1, Ordering::SeqCst);
                self.inner.read_full()
            }
        }

        let img = numbered(200, 150);
        let content = Counting {
            inner: MemorySource::new(img.clone()),
            full: AtomicUsize::new(0),
            regions: AtomicUsize::new(0),
        };
        let out = orchestrator(config(64, 8), Identity)
            .execute(&content, &solid(5), 0.5, None)
            .unwrap();

        assert_eq!(out, img);
        assert_eq!(content.full.load(Ordering::SeqCst), 1);
        assert_eq!(content.regions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_wrong_embedding_length() {
        struct Short;
        impl StyleEncoder for Short {
            fn predict(&mut self, _input: ArrayView4<'_, f32>) -> Result<Embedding> {
                Ok(Embedding::zeros(3))
            }
        }

        let orch = Orchestrator::new(config(32, 4), Box::new(Short), Box::new(Identity)).unwrap();
        let err = orch.execute(&solid(1), &solid(2), 0.5, None).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_unreadable_source_is_io_failure() {
        struct Broken;
        impl ImageSource for Broken {
            fn dimensions(&self) -> (u32, u32) {
                (64, 64)
            }
            fn read_region(&self, _rect: crate::tiling::Rect, _dst: &mut Image) -> Result<()> {
                Err(std::io::Error::other("truncated").into())
            }
            fn read_full(&self) -> Result<Image> {
                Err(std::io::Error::other("truncated").into())
            }
        }

        let orch = orchestrator(config(32, 4), Identity);
        let err = orch.execute(&Broken, &solid(2), 0.5, None).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
