use std::path::Path;

use crate::error::Result;
use crate::frame::VideoFrame;

#[cfg(feature = "opencv")]
pub mod capture;
pub mod synthetic;

#[cfg(feature = "opencv")]
pub use self::capture::{OpenCvOpener, OpenCvSource};
pub use self::synthetic::{SyntheticOpener, SyntheticVideo};

/// An open decoder handle. Dropping it releases the underlying resources.
pub trait FrameSource: Send {
    /// Native frame rate as reported by the container. May be zero or NaN for broken files.
    fn fps(&self) -> f64;

    /// `(width, height)` of decoded frames.
    fn dimensions(&self) -> (u32, u32);

    /// Decodes the next frame, `Ok(None)` at end of stream.
    fn read_frame(&mut self) -> Result<Option<VideoFrame>>;
}

pub trait SourceOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>>;
}
