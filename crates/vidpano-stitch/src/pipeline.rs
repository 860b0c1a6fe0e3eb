use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
        Arc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use vidpano_image::{Image, ImageError};
use vidpano_io::{functional::write_image_rgb8, store::KeyFrameStore, stream::FrameSource, IoError};

use crate::{
    compositor::{Compositor, HomographyCompositor, StitchError},
    config::{ConfigError, PipelineConfig},
    cropper::{crop_borders, crop_to_box, BoundingBox},
    overlap::{FeatureOverlapScorer, OverlapScorer},
    selector::{Frame, KeyFrameSelector, SelectorError, SinkError},
};

/// An error type for a full panorama run.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// Selection retained fewer than two key frames.
    #[error("Not enough key frames to stitch: {0}")]
    NotEnoughKeyFrames(usize),

    /// The compositor failed; its message is kept verbatim.
    #[error(transparent)]
    Stitch(#[from] StitchError),

    /// The run was cancelled between two phases.
    #[error("The run was cancelled")]
    Cancelled,

    /// The crop rectangle does not intersect the panorama.
    #[error("The crop rectangle {0:?} is empty once clamped to the panorama")]
    EmptyRoi([i64; 4]),

    /// Reading, writing or cleaning up files failed.
    #[error(transparent)]
    Io(#[from] IoError),

    /// Key-frame selection failed.
    #[error(transparent)]
    Selector(#[from] SelectorError),

    /// Image manipulation failed.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The stages of a run, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Reading the source and selecting key frames.
    SelectKeyFrames,
    /// Compositing the key frames.
    Stitch,
    /// Removing the black border and applying the crop rectangle.
    Crop,
    /// Writing the panorama.
    Save,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            Phase::SelectKeyFrames => "select key frames",
            Phase::Stitch => "stitch",
            Phase::Crop => "crop",
            Phase::Save => "save",
        };
        write!(f, "{name}")
    }
}

/// Progress notifications sent while a run advances.
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    /// A phase is about to start.
    PhaseStarted(Phase),
    /// A key frame was captured and written to disk.
    KeyFrameCaptured {
        /// Capture ordinal, also the number in the file name.
        ordinal: usize,
        /// Ordinal of the frame in the source.
        index: usize,
    },
    /// The run completed.
    Finished {
        /// Wall time of the whole run.
        elapsed: Duration,
    },
}

/// A cooperative cancellation flag shared between threads.
///
/// The pipeline polls it before each phase, so a request takes effect
/// at most one phase later.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The result of a successful run.
#[derive(Clone, Debug)]
pub struct PipelineOutput {
    /// The cropped panorama.
    pub panorama: Image<u8, 3>,
    /// Source ordinals of the key frames, in capture order.
    pub key_frame_indices: Vec<usize>,
    /// Total number of frames read from the source.
    pub frames_read: usize,
    /// Where the panorama was written, if anywhere.
    pub output_path: Option<PathBuf>,
    /// Where the key frames were left, when they are kept.
    pub key_frame_dir: Option<PathBuf>,
    /// Wall time of the run.
    pub elapsed: Duration,
}

fn emit(events: Option<&Sender<PipelineEvent>>, event: PipelineEvent) {
    if let Some(tx) = events {
        // a dropped receiver only means nobody is listening
        let _ = tx.send(event);
    }
}

/// Drives selection, stitching, cropping and saving.
pub struct PanoramaPipeline<S = FeatureOverlapScorer, C = HomographyCompositor> {
    config: PipelineConfig,
    selector: KeyFrameSelector<S>,
    compositor: C,
    roi: Option<[i64; 4]>,
    output: Option<PathBuf>,
}

impl PanoramaPipeline {
    /// A pipeline with the ORB scorer and the homography compositor.
    pub fn with_defaults(config: PipelineConfig) -> Result<Self, PipelineError> {
        let scorer = FeatureOverlapScorer::with_defaults(&config.selector);
        let compositor = HomographyCompositor::with_defaults(config.compositor.clone());
        Self::new(config, scorer, compositor)
    }
}

impl<S: OverlapScorer, C: Compositor> PanoramaPipeline<S, C> {
    /// Create a pipeline from its collaborators, validating the configuration.
    pub fn new(config: PipelineConfig, scorer: S, compositor: C) -> Result<Self, PipelineError> {
        config.validate()?;
        let selector = KeyFrameSelector::new(config.selector.clone(), scorer)?;
        Ok(Self {
            config,
            selector,
            compositor,
            roi: None,
            output: None,
        })
    }

    /// Crop the panorama to the rectangle `[x1, y1, x2, y2]` after border removal.
    ///
    /// Corners may come in any order and are clamped to the panorama.
    pub fn with_roi(mut self, roi: [i64; 4]) -> Self {
        self.roi = Some(roi);
        self
    }

    /// Write the panorama to `path`; the format follows the extension.
    pub fn with_output(mut self, path: impl AsRef<Path>) -> Self {
        self.output = Some(path.as_ref().to_path_buf());
        self
    }

    /// The run configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every phase over `source`.
    ///
    /// Key frames are written to the temporary directory as they are
    /// captured. The directory is removed after a successful run unless
    /// `keep_frames` is set, and left in place on failure.
    pub fn run<F: FrameSource + ?Sized>(
        &self,
        source: &mut F,
        cancel: &CancelToken,
        events: Option<&Sender<PipelineEvent>>,
    ) -> Result<PipelineOutput, PipelineError> {
        let start = Instant::now();

        let check = |phase: Phase| -> Result<(), PipelineError> {
            if cancel.is_cancelled() {
                log::warn!("cancelled before {phase}");
                return Err(PipelineError::Cancelled);
            }
            log::info!("starting {phase}");
            emit(events, PipelineEvent::PhaseStarted(phase));
            Ok(())
        };

        check(Phase::SelectKeyFrames)?;
        let mut store = KeyFrameStore::new(&self.config.temp_dir, self.config.jpeg_quality)?;
        let mut sink = |ordinal: usize, frame: &Frame| -> Result<(), SinkError> {
            store.save(ordinal, &frame.image)?;
            emit(
                events,
                PipelineEvent::KeyFrameCaptured {
                    ordinal,
                    index: frame.index,
                },
            );
            Ok(())
        };
        let key_frames = self.selector.select(source, &mut sink)?;
        log::info!(
            "selected {} key frames out of {} frames",
            key_frames.len(),
            key_frames.frames_read()
        );
        if key_frames.len() < 2 {
            return Err(PipelineError::NotEnoughKeyFrames(key_frames.len()));
        }
        let key_frame_indices = key_frames.indices();
        let frames_read = key_frames.frames_read();

        check(Phase::Stitch)?;
        let composite = self.compositor.stitch(&key_frames.into_images())?;
        log::info!("composite size {}", composite.size());

        check(Phase::Crop)?;
        let mut panorama = crop_borders(&composite)?;
        if let Some(roi) = self.roi {
            let [x1, y1, x2, y2] = roi;
            let bbox = BoundingBox::from_corners(x1, y1, x2, y2, panorama.size())
                .ok_or(PipelineError::EmptyRoi(roi))?;
            panorama = crop_to_box(&panorama, &bbox)?;
        }

        check(Phase::Save)?;
        if let Some(path) = &self.output {
            write_image_rgb8(path, &panorama, self.config.jpeg_quality)?;
            log::info!("panorama saved to {}", path.display());
        }

        let key_frame_dir = if self.config.keep_frames {
            Some(store.dir().to_path_buf())
        } else {
            store.remove()?;
            None
        };

        let elapsed = start.elapsed();
        log::info!("finished in {elapsed:.2?}");
        emit(events, PipelineEvent::Finished { elapsed });

        Ok(PipelineOutput {
            panorama,
            key_frame_indices,
            frames_read,
            output_path: self.output.clone(),
            key_frame_dir,
            elapsed,
        })
    }
}

/// Run a pipeline on a worker thread.
///
/// Returns the join handle, the progress receiver and a token that cancels
/// the run between phases.
pub fn spawn_pipeline<S, C, F>(
    pipeline: PanoramaPipeline<S, C>,
    mut source: F,
) -> (
    JoinHandle<Result<PipelineOutput, PipelineError>>,
    Receiver<PipelineEvent>,
    CancelToken,
)
where
    S: OverlapScorer + Send + 'static,
    C: Compositor + Send + 'static,
    F: FrameSource + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();

    let handle = std::thread::spawn(move || pipeline.run(&mut source, &worker_cancel, Some(&tx)));

    (handle, rx, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn emit_ignores_dropped_receiver() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        emit(Some(&tx), PipelineEvent::PhaseStarted(Phase::Stitch));
        emit(None, PipelineEvent::PhaseStarted(Phase::Crop));
    }

    #[test]
    fn stitch_message_is_verbatim() {
        let err = PipelineError::from(StitchError::HomographyEstimationFailed { index: 2 });
        assert_eq!(err.to_string(), "Homography estimation failed");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = PipelineConfig::default();
        config.jpeg_quality = 0;
        assert!(matches!(
            PanoramaPipeline::with_defaults(config),
            Err(PipelineError::Config(_))
        ));
    }
}
