use std::path::Path;

use opencv::core::Mat;
use opencv::prelude::*;
use opencv::{imgproc, videoio};

use crate::error::{LoaderError, Result};
use crate::frame::VideoFrame;
use crate::source::{FrameSource, SourceOpener};

/// Decodes a video file through OpenCV's `VideoCapture`, yielding RGB frames.
pub struct OpenCvSource {
    cap: videoio::VideoCapture,
    fps: f64,
    width: u32,
    height: u32,
    next_idx: u64,
}

impl OpenCvSource {
    pub fn open(path: &Path) -> Result<Self> {
        let mut cap =
            videoio::VideoCapture::from_file(&path.to_string_lossy(), videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            let _ = cap.release();
            return Err(LoaderError::VideoOpen(path.display().to_string()));
        }

        let fps = cap.get(videoio::CAP_PROP_FPS)?;
        let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH)?;
        let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT)?;
        if width < 1.0 || height < 1.0 {
            let _ = cap.release();
            return Err(LoaderError::VideoOpen(format!(
                "{}: no video stream",
                path.display()
            )));
        }

        Ok(Self {
            cap,
            fps,
            width: width as u32,
            height: height as u32,
            next_idx: 0,
        })
    }
}

impl FrameSource for OpenCvSource {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read_frame(&mut self) -> Result<Option<VideoFrame>> {
        let mut frame = Mat::default();
        if !self.cap.read(&mut frame)? || frame.empty() {
            return Ok(None);
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color_def(&frame, &mut rgb, imgproc::COLOR_BGR2RGB)?;
        let rgb = if rgb.is_continuous() {
            rgb
        } else {
            rgb.try_clone()?
        };

        let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
        if (width, height) != (self.width, self.height) {
            return Err(LoaderError::FrameRead(format!(
                "frame {} is {}x{}, stream header says {}x{}",
                self.next_idx, width, height, self.width, self.height
            )));
        }

        let data = rgb.data_bytes()?.to_vec();
        let out = VideoFrame::new(data, width, height, rgb.channels() as u32, self.next_idx);
        self.next_idx += 1;
        Ok(Some(out))
    }
}

impl Drop for OpenCvSource {
    fn drop(&mut self) {
        let _ = self.cap.release();
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OpenCvOpener;

impl SourceOpener for OpenCvOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(OpenCvSource::open(path)?))
    }
}
