use std::{
    cell::RefCell,
    path::Path,
    sync::mpsc,
};

use vidpano_image::{Image, ImageError, ImageSize};
use vidpano_io::{functional::read_image_any_rgb8, stream::IterFrameSource};
use vidpano_stitch::{
    compositor::{Compositor, StitchError},
    config::PipelineConfig,
    overlap::{OverlapError, OverlapScorer},
    pipeline::{spawn_pipeline, CancelToken, PanoramaPipeline, Phase, PipelineError, PipelineEvent},
};

const BORDER: usize = 2;

/// Replays a fixed list of inlier counts, then keeps returning the last one.
struct ScriptedScorer {
    scores: Vec<usize>,
    calls: RefCell<usize>,
}

impl ScriptedScorer {
    fn new(scores: Vec<usize>) -> Self {
        Self {
            scores,
            calls: RefCell::new(0),
        }
    }
}

impl OverlapScorer for ScriptedScorer {
    fn score(&self, _last: &Image<u8, 3>, _current: &Image<u8, 3>) -> Result<usize, OverlapError> {
        let mut calls = self.calls.borrow_mut();
        let score = self
            .scores
            .get(*calls)
            .or(self.scores.last())
            .copied()
            .unwrap_or(0);
        *calls += 1;
        Ok(score)
    }
}

/// Lays the frames side by side inside a black border.
struct SideBySide;

impl Compositor for SideBySide {
    fn stitch(&self, frames: &[Image<u8, 3>]) -> Result<Image<u8, 3>, StitchError> {
        if frames.len() < 2 {
            return Err(StitchError::NeedMoreImages);
        }
        let height = frames[0].height();
        let width = frames.iter().map(|f| f.width()).sum::<usize>();
        let size = ImageSize {
            width: width + 2 * BORDER,
            height: height + 2 * BORDER,
        };
        let mut canvas = Image::<u8, 3>::from_size_val(size, 0)?;

        let mut x0 = BORDER;
        for frame in frames {
            for y in 0..frame.height() {
                let src = &frame.as_slice()[y * frame.width() * 3..(y + 1) * frame.width() * 3];
                let start = ((y + BORDER) * size.width + x0) * 3;
                canvas.as_slice_mut()[start..start + src.len()].copy_from_slice(src);
            }
            x0 += frame.width();
        }
        Ok(canvas)
    }
}

struct FailingCompositor;

impl Compositor for FailingCompositor {
    fn stitch(&self, _frames: &[Image<u8, 3>]) -> Result<Image<u8, 3>, StitchError> {
        Err(StitchError::HomographyEstimationFailed { index: 1 })
    }
}

fn frames(n: usize) -> Result<Vec<Image<u8, 3>>, ImageError> {
    (0..n)
        .map(|i| Image::from_size_val([8, 6].into(), 10 * (i as u8 + 1)))
        .collect()
}

fn config(temp_dir: &Path, keep_frames: bool) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.selector.step_interval = 1;
    config.selector.force_capture_interval = 10;
    config.temp_dir = temp_dir.to_path_buf();
    config.keep_frames = keep_frames;
    config
}

#[test]
fn full_run_removes_key_frames() -> Result<(), Box<dyn std::error::Error>> {
    let _ = env_logger::builder().is_test(true).try_init();
    let tmp_dir = tempfile::tempdir()?;
    let temp_dir = tmp_dir.path().join("key_frames");

    // frames 2 and 4 fall outside the window
    let scorer = ScriptedScorer::new(vec![500, 50, 500, 1000]);
    let pipeline = PanoramaPipeline::new(config(&temp_dir, false), scorer, SideBySide)?;

    let (tx, rx) = mpsc::channel();
    let output = pipeline.run(
        &mut IterFrameSource::new(frames(5)?),
        &CancelToken::new(),
        Some(&tx),
    )?;

    assert_eq!(output.key_frame_indices, vec![0, 1, 3]);
    assert_eq!(output.frames_read, 5);
    assert_eq!(
        output.panorama.size(),
        ImageSize {
            width: 24,
            height: 6
        }
    );
    assert_eq!(output.panorama.pixel(0, 0), &[10, 10, 10]);
    assert_eq!(output.panorama.pixel(5, 23), &[40, 40, 40]);
    assert!(output.key_frame_dir.is_none());
    assert!(!temp_dir.exists());

    drop(tx);
    let events = rx.iter().collect::<Vec<_>>();
    let phases = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::PhaseStarted(phase) => Some(*phase),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(
        phases,
        vec![Phase::SelectKeyFrames, Phase::Stitch, Phase::Crop, Phase::Save]
    );

    let captures = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::KeyFrameCaptured { ordinal, index } => Some((*ordinal, *index)),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(captures, vec![(0, 0), (1, 1), (2, 3)]);
    assert!(matches!(events.last(), Some(PipelineEvent::Finished { .. })));

    Ok(())
}

#[test]
fn kept_key_frames_are_numbered_by_capture() -> Result<(), Box<dyn std::error::Error>> {
    let tmp_dir = tempfile::tempdir()?;
    let temp_dir = tmp_dir.path().join("key_frames");

    let pipeline = PanoramaPipeline::new(
        config(&temp_dir, true),
        ScriptedScorer::new(vec![0, 200, 0, 200]),
        SideBySide,
    )?;
    let output = pipeline.run(&mut IterFrameSource::new(frames(5)?), &CancelToken::new(), None)?;

    assert_eq!(output.key_frame_indices, vec![0, 2, 4]);
    assert_eq!(output.key_frame_dir.as_deref(), Some(temp_dir.as_path()));
    for ordinal in 0..3 {
        assert!(temp_dir.join(format!("frame{ordinal}.jpg")).exists());
    }
    assert!(!temp_dir.join("frame3.jpg").exists());

    let first = read_image_any_rgb8(temp_dir.join("frame0.jpg"))?;
    assert_eq!(first.size(), ImageSize::from([8, 6]));

    Ok(())
}

#[test]
fn single_key_frame_is_not_enough() -> Result<(), Box<dyn std::error::Error>> {
    let tmp_dir = tempfile::tempdir()?;
    let temp_dir = tmp_dir.path().join("key_frames");

    let pipeline = PanoramaPipeline::new(
        config(&temp_dir, false),
        ScriptedScorer::new(vec![0]),
        SideBySide,
    )?;
    let result = pipeline.run(&mut IterFrameSource::new(frames(5)?), &CancelToken::new(), None);

    assert!(matches!(result, Err(PipelineError::NotEnoughKeyFrames(1))));
    assert!(temp_dir.join("frame0.jpg").exists());

    Ok(())
}

#[test]
fn stitch_failure_is_reported_verbatim() -> Result<(), Box<dyn std::error::Error>> {
    let tmp_dir = tempfile::tempdir()?;

    let pipeline = PanoramaPipeline::new(
        config(tmp_dir.path(), false),
        ScriptedScorer::new(vec![500]),
        FailingCompositor,
    )?;
    let result = pipeline.run(&mut IterFrameSource::new(frames(3)?), &CancelToken::new(), None);

    match result {
        Err(err @ PipelineError::Stitch(_)) => {
            assert_eq!(err.to_string(), "Homography estimation failed")
        }
        other => panic!("unexpected result: {other:?}"),
    }

    Ok(())
}

#[test]
fn cancelled_before_start() -> Result<(), Box<dyn std::error::Error>> {
    let tmp_dir = tempfile::tempdir()?;
    let temp_dir = tmp_dir.path().join("key_frames");

    let pipeline = PanoramaPipeline::new(
        config(&temp_dir, false),
        ScriptedScorer::new(vec![500]),
        SideBySide,
    )?;
    let cancel = CancelToken::new();
    cancel.cancel();

    let result = pipeline.run(&mut IterFrameSource::new(frames(3)?), &cancel, None);
    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert!(!temp_dir.exists());

    Ok(())
}

#[test]
fn roi_and_output_file() -> Result<(), Box<dyn std::error::Error>> {
    let tmp_dir = tempfile::tempdir()?;
    let output_path = tmp_dir.path().join("panorama.png");

    let pipeline = PanoramaPipeline::new(
        config(&tmp_dir.path().join("key_frames"), false),
        ScriptedScorer::new(vec![500]),
        SideBySide,
    )?
    .with_roi([20, 5, 4, 1])
    .with_output(&output_path);

    let output = pipeline.run(&mut IterFrameSource::new(frames(3)?), &CancelToken::new(), None)?;
    assert_eq!(output.panorama.size(), ImageSize::from([16, 4]));
    assert_eq!(output.output_path.as_deref(), Some(output_path.as_path()));

    let saved = read_image_any_rgb8(&output_path)?;
    assert_eq!(saved, output.panorama);

    let empty = PanoramaPipeline::new(
        config(&tmp_dir.path().join("other"), false),
        ScriptedScorer::new(vec![500]),
        SideBySide,
    )?
    .with_roi([100, 0, 200, 10]);
    let result = empty.run(&mut IterFrameSource::new(frames(3)?), &CancelToken::new(), None);
    assert!(matches!(result, Err(PipelineError::EmptyRoi(_))));

    Ok(())
}

#[test]
fn spawned_run_reports_progress() -> Result<(), Box<dyn std::error::Error>> {
    let tmp_dir = tempfile::tempdir()?;

    let pipeline = PanoramaPipeline::new(
        config(&tmp_dir.path().join("key_frames"), false),
        ScriptedScorer::new(vec![500]),
        SideBySide,
    )?;
    let (handle, events, _cancel) = spawn_pipeline(pipeline, IterFrameSource::new(frames(4)?));

    let events = events.iter().collect::<Vec<_>>();
    let output = handle.join().map_err(|_| "pipeline thread panicked")??;

    assert_eq!(output.key_frame_indices, vec![0, 1, 2, 3]);
    assert_eq!(events.first(), Some(&PipelineEvent::PhaseStarted(Phase::SelectKeyFrames)));
    assert!(matches!(events.last(), Some(PipelineEvent::Finished { .. })));

    Ok(())
}
