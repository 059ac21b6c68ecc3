//! In-memory videos with deterministic content, for tests and dry runs without decoders.
//!
//! Every byte of frame `i` equals `i as u8`, so a window's frames can be traced back to the
//! source frames they came from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{LoaderError, Result};
use crate::frame::VideoFrame;
use crate::source::{FrameSource, SourceOpener};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticVideo {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub fps: f64,
    pub frame_count: u64,
    /// Fail with a read error once this many frames were decoded.
    pub fail_after: Option<u64>,
}

impl SyntheticVideo {
    pub fn new(width: u32, height: u32, fps: f64, frame_count: u64) -> Self {
        Self {
            width,
            height,
            channels: 3,
            fps,
            frame_count,
            fail_after: None,
        }
    }

    pub fn failing_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }
}

struct SyntheticSource {
    video: SyntheticVideo,
    next_idx: u64,
    live: Arc<AtomicUsize>,
}

impl FrameSource for SyntheticSource {
    fn fps(&self) -> f64 {
        self.video.fps
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.video.width, self.video.height)
    }

    fn read_frame(&mut self) -> Result<Option<VideoFrame>> {
        if self.video.fail_after == Some(self.next_idx) {
            return Err(LoaderError::FrameRead(format!(
                "synthetic failure at frame {}",
                self.next_idx
            )));
        }
        if self.next_idx >= self.video.frame_count {
            return Ok(None);
        }
        let v = &self.video;
        let len = v.width as usize * v.height as usize * v.channels as usize;
        let frame = VideoFrame::new(
            vec![self.next_idx as u8; len],
            v.width,
            v.height,
            v.channels,
            self.next_idx,
        );
        self.next_idx += 1;
        Ok(Some(frame))
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Maps paths to synthetic videos and keeps count of open handles.
#[derive(Clone, Default)]
pub struct SyntheticOpener {
    videos: HashMap<PathBuf, SyntheticVideo>,
    fallback: Option<SyntheticVideo>,
    live: Arc<AtomicUsize>,
    opened: Arc<Mutex<Vec<PathBuf>>>,
}

impl SyntheticOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `video` for any path without an explicit entry.
    pub fn with_fallback(video: SyntheticVideo) -> Self {
        Self {
            fallback: Some(video),
            ..Self::default()
        }
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, video: SyntheticVideo) {
        self.videos.insert(path.into(), video);
    }

    /// Handles opened and not yet dropped.
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Every path successfully opened so far, in open order.
    pub fn opened_paths(&self) -> Vec<PathBuf> {
        self.opened
            .lock()
            .map(|paths| paths.clone())
            .unwrap_or_default()
    }
}

impl SourceOpener for SyntheticOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        let video = self
            .videos
            .get(path)
            .copied()
            .or(self.fallback)
            .ok_or_else(|| LoaderError::VideoOpen(path.display().to_string()))?;
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(path.to_path_buf());
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticSource {
            video,
            next_idx: 0,
            live: Arc::clone(&self.live),
        }))
    }
}
