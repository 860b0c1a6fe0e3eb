use std::path::Path;

use gstreamer::prelude::*;
use vidpano_image::{Image, ImageSize};

use super::FrameSource;
use crate::error::IoError;

fn stream_error(err: impl std::fmt::Display) -> IoError {
    IoError::StreamError(err.to_string())
}

/// Decodes a video file frame by frame with GStreamer.
///
/// Frames are pulled from an `appsink` without clock synchronisation, so the
/// file is decoded as fast as the consumer reads it.
pub struct VideoReader {
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    frames_read: usize,
}

impl VideoReader {
    /// Creates a new `VideoReader` and starts decoding.
    ///
    /// # Arguments
    ///
    /// * `path` - The path to the video file to be read.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(IoError::FileDoesNotExist(path.to_path_buf()));
        }

        gstreamer::init().map_err(stream_error)?;

        let location = if cfg!(windows) {
            path.to_string_lossy().replace('\\', "/")
        } else {
            path.to_string_lossy().into_owned()
        };

        let pipeline_desc = format!(
            "filesrc location=\"{location}\" ! \
            decodebin ! \
            videoconvert ! \
            video/x-raw,format=RGB ! \
            appsink name=sink sync=false max-buffers=4"
        );
        log::debug!("Reader pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(stream_error)?
            .dynamic_cast::<gstreamer::Pipeline>()
            .map_err(|_| stream_error("Failed to downcast pipeline"))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| stream_error("Failed to get an element by name"))?
            .dynamic_cast::<gstreamer_app::AppSink>()
            .map_err(|_| stream_error("Failed to downcast appsink"))?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(stream_error)?;

        Ok(Self {
            pipeline,
            appsink,
            frames_read: 0,
        })
    }

    /// Number of frames read so far.
    pub fn frames_read(&self) -> usize {
        self.frames_read
    }

    /// Drain the bus looking for a pipeline error.
    fn pending_error(&self) -> Option<IoError> {
        let bus = self.pipeline.bus()?;
        while let Some(msg) = bus.pop() {
            if let gstreamer::MessageView::Error(err) = msg.view() {
                return Some(stream_error(format!(
                    "{} ({:?})",
                    err.error(),
                    err.debug()
                )));
            }
        }
        None
    }

    fn extract_image_frame(sample: &gstreamer::Sample) -> Result<Image<u8, 3>, IoError> {
        let caps = sample
            .caps()
            .ok_or_else(|| stream_error("Failed to get the caps from the sample"))?;
        let structure = caps
            .structure(0)
            .ok_or_else(|| stream_error("Failed to get the caps structure"))?;

        let width = structure.get::<i32>("width").map_err(stream_error)? as usize;
        let height = structure.get::<i32>("height").map_err(stream_error)? as usize;

        let buffer = sample
            .buffer()
            .ok_or_else(|| stream_error("Failed to get the buffer from the sample"))?
            .map_readable()
            .map_err(stream_error)?;
        let data = buffer.as_slice();

        // rows may be padded to a 4 byte boundary
        let row_bytes = width * 3;
        let stride = if height > 0 { data.len() / height } else { 0 };
        if row_bytes == 0 || stride < row_bytes {
            return Err(stream_error(format!(
                "Buffer of {} bytes is too small for {}x{} RGB",
                data.len(),
                width,
                height
            )));
        }

        let mut pixels = Vec::with_capacity(row_bytes * height);
        for row in data.chunks_exact(stride).take(height) {
            pixels.extend_from_slice(&row[..row_bytes]);
        }

        Ok(Image::new(ImageSize { width, height }, pixels)?)
    }
}

impl FrameSource for VideoReader {
    fn read(&mut self) -> Result<Option<Image<u8, 3>>, IoError> {
        match self.appsink.pull_sample() {
            Ok(sample) => {
                let frame = Self::extract_image_frame(&sample)?;
                self.frames_read += 1;
                Ok(Some(frame))
            }
            Err(err) => {
                if let Some(bus_err) = self.pending_error() {
                    return Err(bus_err);
                }
                if self.appsink.is_eos() {
                    log::debug!("end of stream after {} frames", self.frames_read);
                    return Ok(None);
                }
                Err(stream_error(err))
            }
        }
    }
}

impl Drop for VideoReader {
    fn drop(&mut self) {
        if let Err(err) = self.pipeline.set_state(gstreamer::State::Null) {
            log::warn!("Failed to stop the video pipeline: {}", err);
        }
    }
}
