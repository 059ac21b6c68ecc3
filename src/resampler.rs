//! Per-video producer: turns one video into a finite stream of fixed-size windows.
//!
//! Frames are resampled to the target rate by comparing two clocks. `video_time` is the
//! timestamp of the frame just decoded, `expected_time` the timestamp of the next frame the
//! target rate wants. A decoded frame is kept only once `expected_time` has caught up with it,
//! so faster sources are thinned out and slower ones pass through untouched. Kept frames go
//! into a ring buffer of `frame_size`; a full buffer is emitted as a window whenever the jump
//! countdown has run out.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::LoaderConfig;
use crate::frame::{CropRect, VideoFrame, Window};
use crate::source::{FrameSource, SourceOpener};

const TIME_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResamplerParams {
    pub frame_size: usize,
    pub crop_width: u32,
    pub crop_height: u32,
    pub fps: f64,
    pub augment: bool,
    pub max_samples_by_video: usize,
}

impl From<&LoaderConfig> for ResamplerParams {
    fn from(cfg: &LoaderConfig) -> Self {
        Self {
            frame_size: cfg.frame_size,
            crop_width: cfg.crop_width,
            crop_height: cfg.crop_height,
            fps: cfg.fps,
            augment: cfg.augment,
            max_samples_by_video: cfg.max_samples_by_video,
        }
    }
}

enum State {
    Pending,
    /// The crop is drawn once the source dimensions are known and re-drawn per window.
    Streaming {
        source: Box<dyn FrameSource>,
        crop: CropRect,
    },
    Finished,
}

pub struct Resampler {
    path: PathBuf,
    params: ResamplerParams,
    opener: Arc<dyn SourceOpener>,
    rng: StdRng,
    state: State,
    buffer: VecDeque<VideoFrame>,
    jump: i64,
    source_dims: (u32, u32),
    source_fps: f64,
    frames_decoded: u64,
    frames_accepted: u64,
    windows_emitted: usize,
}

impl Resampler {
    /// Creates an idle producer. The video is opened on the first pull.
    pub fn new(
        path: impl Into<PathBuf>,
        params: ResamplerParams,
        opener: Arc<dyn SourceOpener>,
        seed: u64,
    ) -> Self {
        Self {
            path: path.into(),
            buffer: VecDeque::with_capacity(params.frame_size),
            params,
            opener,
            rng: StdRng::seed_from_u64(seed),
            state: State::Pending,
            jump: 0,
            source_dims: (0, 0),
            source_fps: 0.0,
            frames_decoded: 0,
            frames_accepted: 0,
            windows_emitted: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished)
    }

    pub fn windows_emitted(&self) -> usize {
        self.windows_emitted
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn frames_accepted(&self) -> u64 {
        self.frames_accepted
    }

    /// Advances the decoder until a window is ready. `None` means this producer is exhausted
    /// and will stay so; the decoder is already released at that point.
    pub fn next_window(&mut self) -> Option<Window> {
        if self.windows_emitted >= self.params.max_samples_by_video {
            self.finish();
            return None;
        }
        if matches!(self.state, State::Pending) {
            self.start();
        }

        loop {
            let State::Streaming { source, crop } = &mut self.state else {
                return None;
            };
            let crop = *crop;
            let frame = match source.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    tracing::trace!(
                        path = %self.path.display(),
                        frames_decoded = self.frames_decoded,
                        windows = self.windows_emitted,
                        "video exhausted"
                    );
                    self.finish();
                    return None;
                }
                Err(err) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        frame = self.frames_decoded,
                        error = %err,
                        "decode failed, dropping video"
                    );
                    self.finish();
                    return None;
                }
            };
            if !self.fits(&frame) {
                tracing::warn!(
                    path = %self.path.display(),
                    frame = frame.frame_idx,
                    width = frame.width,
                    height = frame.height,
                    "malformed frame, dropping video"
                );
                self.finish();
                return None;
            }

            let idx = self.frames_decoded;
            self.frames_decoded += 1;
            if !self.accepts(idx) {
                continue;
            }
            self.frames_accepted += 1;

            if self.buffer.len() == self.params.frame_size {
                self.buffer.pop_front();
            }
            self.buffer.push_back(frame);
            self.jump -= 1;

            if self.buffer.len() == self.params.frame_size && self.jump <= 0 {
                return Some(self.emit(crop));
            }
        }
    }

    fn start(&mut self) {
        let source = match self.opener.open(&self.path) {
            Ok(source) => source,
            Err(err) => {
                tracing::debug!(path = %self.path.display(), error = %err, "skipping unreadable video");
                self.state = State::Finished;
                return;
            }
        };

        let (width, height) = source.dimensions();
        let Some(crop) = CropRect::random(
            &mut self.rng,
            width,
            height,
            self.params.crop_width,
            self.params.crop_height,
        ) else {
            tracing::debug!(
                path = %self.path.display(),
                width,
                height,
                crop_width = self.params.crop_width,
                crop_height = self.params.crop_height,
                "skipping video smaller than crop"
            );
            self.state = State::Finished;
            return;
        };

        self.source_dims = (width, height);
        self.source_fps = source.fps();
        self.state = State::Streaming { source, crop };
    }

    fn accepts(&self, idx: u64) -> bool {
        if !self.source_fps.is_finite() || self.source_fps <= 0.0 {
            return true;
        }
        let video_time = idx as f64 / self.source_fps;
        let expected_time = self.frames_accepted as f64 / self.params.fps;
        expected_time <= video_time + TIME_EPSILON
    }

    fn fits(&self, frame: &VideoFrame) -> bool {
        let expected_len = frame.width as usize * frame.height as usize * frame.channels as usize;
        (frame.width, frame.height) == self.source_dims && frame.data.len() == expected_len
    }

    fn emit(&mut self, crop: CropRect) -> Window {
        let frames = self.buffer.iter().map(|f| f.crop(&crop)).collect();
        self.windows_emitted += 1;

        self.jump = if self.params.augment {
            self.rng.gen_range(0..=2 * self.params.frame_size as i64)
        } else {
            0
        };
        let (width, height) = self.source_dims;
        let next = CropRect::random(
            &mut self.rng,
            width,
            height,
            self.params.crop_width,
            self.params.crop_height,
        );
        // Dimensions are fixed once streaming, so a crop that fit before still fits.
        if let (State::Streaming { crop: current, .. }, Some(next)) = (&mut self.state, next) {
            *current = next;
        }

        if self.windows_emitted >= self.params.max_samples_by_video {
            self.finish();
        }
        Window {
            frames,
            source: self.path.clone(),
            crop,
        }
    }

    fn finish(&mut self) {
        self.state = State::Finished;
        self.buffer.clear();
    }
}

impl Iterator for Resampler {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        self.next_window()
    }
}

impl std::iter::FusedIterator for Resampler {}

impl fmt::Debug for Resampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resampler")
            .field("path", &self.path)
            .field("finished", &self.is_finished())
            .field("frames_decoded", &self.frames_decoded)
            .field("windows_emitted", &self.windows_emitted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SyntheticOpener, SyntheticVideo};

    fn params(frame_size: usize, fps: f64, augment: bool, cap: usize) -> ResamplerParams {
        ResamplerParams {
            frame_size,
            crop_width: 8,
            crop_height: 6,
            fps,
            augment,
            max_samples_by_video: cap,
        }
    }

    fn producer(
        video: SyntheticVideo,
        params: ResamplerParams,
        seed: u64,
    ) -> (Resampler, SyntheticOpener) {
        let opener = SyntheticOpener::with_fallback(video);
        let resampler = Resampler::new("clip.mp4", params, Arc::new(opener.clone()), seed);
        (resampler, opener)
    }

    fn indices(window: &Window) -> Vec<u64> {
        window.frames.iter().map(|f| f.frame_idx).collect()
    }

    #[test]
    fn halves_a_source_at_twice_the_target_rate() {
        let video = SyntheticVideo::new(16, 12, 10.0, 40);
        let (mut r, _) = producer(video, params(4, 5.0, false, 100), 1);

        let first = r.next_window().expect("window");
        assert_eq!(indices(&first), vec![0, 2, 4, 6]);
        let second = r.next_window().expect("window");
        assert_eq!(indices(&second), vec![2, 4, 6, 8]);

        while r.next_window().is_some() {}
        assert_eq!(r.frames_decoded(), 40);
        assert_eq!(r.frames_accepted(), 20);
    }

    #[test]
    fn slower_source_passes_every_frame() {
        let video = SyntheticVideo::new(16, 12, 5.0, 10);
        let (mut r, _) = producer(video, params(4, 10.0, false, 100), 1);
        let first = r.next_window().expect("window");
        assert_eq!(indices(&first), vec![0, 1, 2, 3]);
        while r.next_window().is_some() {}
        assert_eq!(r.frames_accepted(), 10);
    }

    #[test]
    fn unknown_source_rate_keeps_every_frame() {
        for source_fps in [0.0, f64::NAN, -3.0] {
            let video = SyntheticVideo::new(16, 12, source_fps, 10);
            let (mut r, _) = producer(video, params(4, 5.0, false, 100), 1);
            let windows = r.by_ref().count();
            assert_eq!(windows, 7, "source fps {source_fps}");
            assert_eq!(r.frames_decoded(), 10);
            assert_eq!(r.frames_accepted(), r.frames_decoded());
        }
    }

    #[test]
    fn windows_have_fixed_shape() {
        let video = SyntheticVideo::new(31, 17, 30.0, 600);
        let (r, _) = producer(video, params(5, 12.0, true, 1000), 9);
        let mut count = 0;
        for window in r {
            assert_eq!(window.shape(), (5, 6, 8, 3));
            assert!(window.crop.x + window.crop.width <= 31);
            assert!(window.crop.y + window.crop.height <= 17);
            for frame in &window.frames {
                assert_eq!(frame.data.len(), 8 * 6 * 3);
                assert!(frame.data.iter().all(|b| *b == frame.frame_idx as u8));
            }
            count += 1;
        }
        assert!(count > 0);
    }

    #[test]
    fn undersized_video_yields_nothing() {
        let video = SyntheticVideo::new(7, 40, 10.0, 100);
        let (mut r, opener) = producer(video, params(4, 10.0, true, 10), 1);
        assert!(r.next_window().is_none());
        assert!(r.is_finished());
        assert_eq!(r.frames_decoded(), 0);
        assert_eq!(opener.live_handles(), 0);
    }

    #[test]
    fn unopenable_video_yields_nothing() {
        let opener = SyntheticOpener::new();
        let mut r = Resampler::new("missing.mp4", params(4, 10.0, true, 10), Arc::new(opener), 1);
        assert!(r.next_window().is_none());
        assert!(r.is_finished());
    }

    #[test]
    fn cap_stops_the_producer_and_releases_the_decoder() {
        let video = SyntheticVideo::new(16, 12, 10.0, 1000);
        let (mut r, opener) = producer(video, params(4, 10.0, false, 3), 1);
        for _ in 0..3 {
            assert!(r.next_window().is_some());
        }
        assert!(r.is_finished());
        assert_eq!(opener.live_handles(), 0);
        assert!(r.next_window().is_none());
        assert_eq!(r.windows_emitted(), 3);
    }

    #[test]
    fn zero_cap_never_opens_the_video() {
        let video = SyntheticVideo::new(16, 12, 10.0, 100);
        let (mut r, opener) = producer(video, params(4, 10.0, false, 0), 1);
        assert!(r.next_window().is_none());
        assert!(opener.opened_paths().is_empty());
    }

    #[test]
    fn read_error_ends_the_stream_after_valid_windows() {
        let video = SyntheticVideo::new(16, 12, 10.0, 100).failing_after(10);
        let (r, opener) = producer(video, params(4, 10.0, false, 100), 1);
        let windows: Vec<_> = r.collect();
        assert_eq!(windows.len(), 7);
        assert_eq!(windows.last().and_then(Window::frame_range), Some((6, 9)));
        assert_eq!(opener.live_handles(), 0);
    }

    #[test]
    fn plain_mode_slides_one_frame_at_a_time() {
        let video = SyntheticVideo::new(16, 12, 10.0, 30);
        let (r, _) = producer(video, params(16, 10.0, false, 100), 1);
        let starts: Vec<u64> = r.filter_map(|w| w.frame_range()).map(|(s, _)| s).collect();
        assert_eq!(starts, (0..15).collect::<Vec<u64>>());
    }

    #[test]
    fn jitter_overlaps_and_skips_within_range() {
        let video = SyntheticVideo::new(16, 12, 10.0, 20_000);
        let (r, _) = producer(video, params(16, 10.0, true, 1000), 42);
        let starts: Vec<u64> = r.filter_map(|w| w.frame_range()).map(|(s, _)| s).collect();
        assert!(starts.len() > 100);

        let strides: Vec<u64> = starts.windows(2).map(|p| p[1] - p[0]).collect();
        assert!(strides.iter().all(|s| (1..=32).contains(s)), "{strides:?}");
        assert!(strides.iter().any(|s| *s < 16), "no overlapping windows");
        assert!(strides.iter().any(|s| *s > 16), "no skipped frames");
    }

    #[test]
    fn crops_are_redrawn_between_windows() {
        let video = SyntheticVideo::new(64, 48, 10.0, 2000);
        let (r, _) = producer(video, params(4, 10.0, true, 50), 5);
        let crops: Vec<CropRect> = r.map(|w| w.crop).collect();
        assert_eq!(crops.len(), 50);
        assert!(crops.windows(2).any(|p| p[0] != p[1]));
    }

    #[test]
    fn same_seed_same_stream() {
        let video = SyntheticVideo::new(40, 30, 25.0, 500);
        let run = |seed| {
            let (r, _) = producer(video, params(8, 10.0, true, 20), seed);
            r.map(|w| (w.crop, w.frame_range())).collect::<Vec<_>>()
        };
        assert_eq!(run(11), run(11));
    }
}
