use std::path::PathBuf;
use std::sync::Arc;

use rand::Rng;

/// One decoded frame, packed row-major with interleaved channels.
#[derive(Clone, Debug)]
pub struct VideoFrame {
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub frame_idx: u64, // index of the decoded source frame
}

impl VideoFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u32, frame_idx: u64) -> Self {
        Self {
            data: Arc::new(data),
            width,
            height,
            channels,
            frame_idx,
        }
    }

    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    /// Copies `rect` out of this frame. The caller guarantees `rect` lies inside the frame.
    pub fn crop(&self, rect: &CropRect) -> VideoFrame {
        let channels = self.channels as usize;
        let src_row = self.row_bytes();
        let dst_row = rect.width as usize * channels;
        let mut out = Vec::with_capacity(dst_row * rect.height as usize);
        for y in rect.y..rect.y + rect.height {
            let start = y as usize * src_row + rect.x as usize * channels;
            out.extend_from_slice(&self.data[start..start + dst_row]);
        }
        VideoFrame::new(out, rect.width, rect.height, self.channels, self.frame_idx)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    /// Uniformly places a `width x height` rectangle inside a `frame_width x frame_height` frame.
    /// Returns `None` when the frame is smaller than the crop in either axis.
    pub fn random<R: Rng + ?Sized>(
        rng: &mut R,
        frame_width: u32,
        frame_height: u32,
        width: u32,
        height: u32,
    ) -> Option<Self> {
        if frame_width < width || frame_height < height {
            return None;
        }
        Some(Self {
            x: rng.gen_range(0..=frame_width - width),
            y: rng.gen_range(0..=frame_height - height),
            width,
            height,
        })
    }
}

/// A fixed-length stack of cropped frames: one training clip.
#[derive(Clone, Debug)]
pub struct Window {
    pub frames: Vec<VideoFrame>,
    pub source: PathBuf,
    pub crop: CropRect,
}

impl Window {
    /// `(frames, height, width, channels)`
    pub fn shape(&self) -> (usize, u32, u32, u32) {
        let (height, width, channels) = self
            .frames
            .first()
            .map(|f| (f.height, f.width, f.channels))
            .unwrap_or((self.crop.height, self.crop.width, 0));
        (self.frames.len(), height, width, channels)
    }

    /// First and last source frame index covered by this window.
    pub fn frame_range(&self) -> Option<(u64, u64)> {
        Some((self.frames.first()?.frame_idx, self.frames.last()?.frame_idx))
    }

    /// Contiguous THWC bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let total = self.frames.iter().map(|f| f.data.len()).sum();
        let mut out = Vec::with_capacity(total);
        for frame in &self.frames {
            out.extend_from_slice(&frame.data);
        }
        out
    }
}
