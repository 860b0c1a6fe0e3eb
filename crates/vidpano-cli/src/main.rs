use argh::FromArgs;
use std::path::PathBuf;

use vidpano::io::stream::open_frame_source;
use vidpano::stitch::{
    config::PipelineConfig,
    pipeline::{spawn_pipeline, PanoramaPipeline, PipelineEvent},
};

fn parse_roi(value: &str) -> Result<[i64; 4], String> {
    let coords = value
        .split(',')
        .map(|v| v.trim().parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid crop rectangle '{value}': {e}"))?;
    coords
        .try_into()
        .map_err(|_| format!("expected x1,y1,x2,y2, got '{value}'"))
}

#[derive(FromArgs, Debug)]
/// Build a cropped panorama from a video file or a directory of frames
struct Args {
    /// path to the input video or image directory
    #[argh(positional)]
    input: PathBuf,

    /// path of the output panorama, .jpg or .png
    #[argh(option, short = 'o', default = "PathBuf::from(\"panorama.jpg\")")]
    output: PathBuf,

    /// directory where key frames are written while selecting
    #[argh(option)]
    temp_dir: Option<PathBuf>,

    /// keep the key frames after a successful run
    #[argh(switch)]
    keep_frames: bool,

    /// path to a JSON configuration file
    #[argh(option)]
    config: Option<PathBuf>,

    /// evaluate one frame out of this many
    #[argh(option)]
    step: Option<usize>,

    /// crop rectangle x1,y1,x2,y2 applied after the border removal
    #[argh(option, from_str_fn(parse_roi))]
    roi: Option<[i64; 4]>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(step) = args.step {
        config.selector.step_interval = step;
    }
    if let Some(temp_dir) = args.temp_dir {
        config.temp_dir = temp_dir;
    }
    config.keep_frames |= args.keep_frames;

    let mut pipeline = PanoramaPipeline::with_defaults(config)?.with_output(&args.output);
    if let Some(roi) = args.roi {
        pipeline = pipeline.with_roi(roi);
    }

    let source = open_frame_source(&args.input)?;
    let (handle, events, cancel) = spawn_pipeline(pipeline, source);

    ctrlc::set_handler({
        let cancel = cancel.clone();
        move || {
            println!("Received Ctrl-C signal. Stopping after the current phase !!");
            cancel.cancel();
        }
    })?;

    let mut key_frames = 0;
    for event in events {
        match event {
            PipelineEvent::PhaseStarted(phase) => log::debug!("phase: {phase}"),
            PipelineEvent::KeyFrameCaptured { .. } => key_frames += 1,
            PipelineEvent::Finished { elapsed } => log::debug!("done in {elapsed:?}"),
        }
    }

    let output = handle
        .join()
        .map_err(|_| "the pipeline thread panicked")??;

    println!(
        "Panorama {}x{} from {} key frames ({} frames read) saved to {}",
        output.panorama.width(),
        output.panorama.height(),
        key_frames,
        output.frames_read,
        args.output.display()
    );
    if let Some(dir) = output.key_frame_dir {
        println!("Key frames kept in {}", dir.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::parse_roi;

    #[test]
    fn roi_parsing() {
        assert_eq!(parse_roi("10, 20,300,400"), Ok([10, 20, 300, 400]));
        assert_eq!(parse_roi("-5,0,5,9"), Ok([-5, 0, 5, 9]));
        assert!(parse_roi("1,2,3").is_err());
        assert!(parse_roi("a,b,c,d").is_err());
    }
}
