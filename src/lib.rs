#![cfg_attr(not(feature = "python"), forbid(unsafe_code))]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

pub mod catalog;
pub mod config;
pub mod error;
pub mod frame;
pub mod logging;
pub mod prefetch;
pub mod resampler;
pub mod scheduler;
pub mod source;

#[cfg(feature = "python")]
mod python;

pub use catalog::{get_partition, list_labels, list_videos, Partition, BACKGROUND_LABEL};
pub use config::{Dataset, ExhaustionPolicy, LoaderConfig};
pub use error::{LoaderError, Result};
pub use frame::{CropRect, VideoFrame, Window};
pub use prefetch::Prefetcher;
pub use resampler::{Resampler, ResamplerParams};
pub use scheduler::{LabelVector, Sample, SampleScheduler, SchedulerStats};
pub use source::{FrameSource, SourceOpener};
