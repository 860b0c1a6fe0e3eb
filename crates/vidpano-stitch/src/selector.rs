use vidpano_image::Image;
use vidpano_io::{store::KeyFrameStore, stream::FrameSource, IoError};

use crate::{
    config::{ConfigError, SelectorConfig},
    overlap::OverlapScorer,
};

/// Frames read between two progress messages.
const PROGRESS_INTERVAL: usize = 50;

/// Boxed error returned by a [`KeyFrameSink`].
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// An error type for the key-frame selection.
#[derive(thiserror::Error, Debug)]
pub enum SelectorError {
    /// The source produced no frame at all.
    #[error("The frame source is empty")]
    EmptySource,

    /// The source failed to produce a frame.
    #[error("Failed to read a frame. {0}")]
    Source(#[from] IoError),

    /// The sink rejected a captured frame.
    #[error("Failed to store a key frame. {0}")]
    Sink(#[source] SinkError),

    /// The selector parameters are out of range.
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

/// A decoded frame and its zero-based position in the source.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Ordinal of the frame in the source stream.
    pub index: usize,
    /// The RGB8 pixels.
    pub image: Image<u8, 3>,
}

/// The frames retained by a selection pass, in capture order.
///
/// The first element is always the first frame of the source.
#[derive(Clone, Debug, Default)]
pub struct KeyFrameSequence {
    frames: Vec<Frame>,
    frames_read: usize,
}

impl KeyFrameSequence {
    /// Number of key frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether no frame was captured.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The key frames in capture order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Source ordinals of the key frames.
    pub fn indices(&self) -> Vec<usize> {
        self.frames.iter().map(|f| f.index).collect()
    }

    /// Total number of frames read from the source.
    pub fn frames_read(&self) -> usize {
        self.frames_read
    }

    /// The most recent key frame.
    pub fn last(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Consume the sequence and return the key frame images.
    pub fn into_images(self) -> Vec<Image<u8, 3>> {
        self.frames.into_iter().map(|f| f.image).collect()
    }

    fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }
}

/// The outcome of evaluating one candidate frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchVerdict {
    /// Inliers found between the overlap strips, zero when not compared.
    pub inliers: usize,
    /// Whether the frame is captured.
    pub capture: bool,
    /// Whether the capture was forced by the elapsed frame count.
    pub forced: bool,
}

/// Receives every key frame as soon as it is captured.
pub trait KeyFrameSink {
    /// Called with the capture ordinal (0, 1, 2, ...) and the frame.
    fn on_capture(&mut self, ordinal: usize, frame: &Frame) -> Result<(), SinkError>;
}

impl KeyFrameSink for () {
    fn on_capture(&mut self, _ordinal: usize, _frame: &Frame) -> Result<(), SinkError> {
        Ok(())
    }
}

impl KeyFrameSink for KeyFrameStore {
    fn on_capture(&mut self, ordinal: usize, frame: &Frame) -> Result<(), SinkError> {
        self.save(ordinal, &frame.image)?;
        Ok(())
    }
}

impl<F> KeyFrameSink for F
where
    F: FnMut(usize, &Frame) -> Result<(), SinkError>,
{
    fn on_capture(&mut self, ordinal: usize, frame: &Frame) -> Result<(), SinkError> {
        self(ordinal, frame)
    }
}

/// Online key-frame selector.
///
/// Frames are consumed in a single forward pass. Every `step_interval`-th
/// frame is compared against the last captured frame and captured when the
/// inlier count falls strictly inside the configured window, or
/// unconditionally once `force_capture_interval` frames have elapsed since
/// the last capture.
///
/// # Example
///
/// ```
/// use vidpano_image::Image;
/// use vidpano_io::stream::IterFrameSource;
/// use vidpano_stitch::config::SelectorConfig;
/// use vidpano_stitch::overlap::FeatureOverlapScorer;
/// use vidpano_stitch::selector::KeyFrameSelector;
///
/// let config = SelectorConfig { step_interval: 1, force_capture_interval: 2, ..Default::default() };
/// let scorer = FeatureOverlapScorer::with_defaults(&config);
/// let selector = KeyFrameSelector::new(config, scorer).unwrap();
///
/// let frames = vec![Image::<u8, 3>::from_size_val([64, 48].into(), 0).unwrap(); 5];
/// let key_frames = selector.select(&mut IterFrameSource::new(frames), &mut ()).unwrap();
///
/// assert_eq!(key_frames.indices(), vec![0, 2, 4]);
/// ```
pub struct KeyFrameSelector<S> {
    config: SelectorConfig,
    scorer: S,
}

impl<S: OverlapScorer> KeyFrameSelector<S> {
    /// Create a selector, validating the configuration.
    pub fn new(config: SelectorConfig, scorer: S) -> Result<Self, SelectorError> {
        config.validate()?;
        Ok(Self { config, scorer })
    }

    /// The selector parameters.
    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Decide whether `current` becomes a key frame.
    ///
    /// Force capture takes precedence and skips the comparison. Scoring
    /// failures are logged and never capture.
    pub fn evaluate(
        &self,
        frames_since_capture: usize,
        last: &Image<u8, 3>,
        current: &Image<u8, 3>,
    ) -> MatchVerdict {
        if frames_since_capture >= self.config.force_capture_interval {
            return MatchVerdict {
                inliers: 0,
                capture: true,
                forced: true,
            };
        }

        match self.scorer.score(last, current) {
            Ok(inliers) => MatchVerdict {
                inliers,
                capture: self.config.in_match_window(inliers),
                forced: false,
            },
            Err(err) => {
                log::warn!("overlap scoring failed: {err}");
                MatchVerdict {
                    inliers: 0,
                    capture: false,
                    forced: false,
                }
            }
        }
    }

    /// Run the selection over `source`, handing every capture to `sink`.
    pub fn select<F, K>(
        &self,
        source: &mut F,
        sink: &mut K,
    ) -> Result<KeyFrameSequence, SelectorError>
    where
        F: FrameSource + ?Sized,
        K: KeyFrameSink + ?Sized,
    {
        let first = source.read()?.ok_or(SelectorError::EmptySource)?;
        let first = Frame {
            index: 0,
            image: first,
        };

        let mut sequence = KeyFrameSequence::default();
        sink.on_capture(0, &first).map_err(SelectorError::Sink)?;
        log::info!("captured key frame 0 (frame 0)");
        sequence.push(first);

        let mut count = 0;
        let mut last_capture = 0;

        loop {
            let image = match source.read() {
                Ok(Some(image)) => image,
                Ok(None) => break,
                Err(err) => {
                    log::warn!("failed to read frame {}, ending the stream: {err}", count + 1);
                    break;
                }
            };
            count += 1;

            if count % PROGRESS_INTERVAL == 0 {
                log::info!(
                    "processed {} frames, {} key frames",
                    count,
                    sequence.len()
                );
            }

            if count % self.config.step_interval != 0 {
                continue;
            }

            let last = sequence.last().ok_or(SelectorError::EmptySource)?;
            let verdict = self.evaluate(count - last_capture, &last.image, &image);
            log::debug!(
                "frame {}: {} inliers, capture: {}, forced: {}",
                count,
                verdict.inliers,
                verdict.capture,
                verdict.forced
            );

            if verdict.capture {
                let ordinal = sequence.len();
                let frame = Frame {
                    index: count,
                    image,
                };
                sink.on_capture(ordinal, &frame)
                    .map_err(SelectorError::Sink)?;
                log::info!("captured key frame {} (frame {})", ordinal, count);
                sequence.push(frame);
                last_capture = count;
            }
        }

        sequence.frames_read = count + 1;
        log::info!(
            "selection complete: {} key frames from {} frames",
            sequence.len(),
            sequence.frames_read
        );

        Ok(sequence)
    }
}
