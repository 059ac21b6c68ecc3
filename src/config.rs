use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LoaderError, Result};

pub const DEFAULT_FRAME_SIZE: usize = 16;
pub const DEFAULT_CROP_WIDTH: u32 = 112;
pub const DEFAULT_CROP_HEIGHT: u32 = 112;
pub const DEFAULT_FPS: f64 = 10.0;
pub const DEFAULT_SPLIT_RATIO: f64 = 0.8;
pub const DEFAULT_PRELOAD_SAMPLES: usize = 20;
pub const DEFAULT_MAX_SAMPLES_BY_VIDEO: usize = 10;
pub const DEFAULT_PREFETCH_DEPTH: usize = 8;

/// Dataset partition drawn from each label's sorted video list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Train,
    Validation,
    Test,
}

impl FromStr for Dataset {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train" => Ok(Dataset::Train),
            "validation" | "val" => Ok(Dataset::Validation),
            "test" => Ok(Dataset::Test),
            other => Err(LoaderError::InvalidConfig(format!(
                "unknown dataset {other:?} (expected train, validation or test)"
            ))),
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dataset::Train => "train",
            Dataset::Validation => "validation",
            Dataset::Test => "test",
        };
        f.write_str(name)
    }
}

/// When the scheduler stops once foreground labels start running dry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// End the run as soon as any one label has no paths and no active producers.
    FirstLabel,
    /// Keep sampling the remaining labels until every label is exhausted.
    AllLabels,
}

impl FromStr for ExhaustionPolicy {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "first_label" | "first" => Ok(ExhaustionPolicy::FirstLabel),
            "all_labels" | "all" => Ok(ExhaustionPolicy::AllLabels),
            other => Err(LoaderError::InvalidConfig(format!(
                "unknown exhaustion policy {other:?} (expected first-label or all-labels)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub frame_size: usize,
    pub crop_width: u32,
    pub crop_height: u32,
    pub fps: f64,
    pub split_ratio: f64,
    pub preload_samples: usize,
    pub max_samples_by_video: usize,
    pub augment: bool,
    pub seed: Option<u64>,
    /// `None` picks the mode default: `FirstLabel` when augmenting, `AllLabels` otherwise.
    pub exhaustion_policy: Option<ExhaustionPolicy>,
    pub prefetch_depth: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            crop_width: DEFAULT_CROP_WIDTH,
            crop_height: DEFAULT_CROP_HEIGHT,
            fps: DEFAULT_FPS,
            split_ratio: DEFAULT_SPLIT_RATIO,
            preload_samples: DEFAULT_PRELOAD_SAMPLES,
            max_samples_by_video: DEFAULT_MAX_SAMPLES_BY_VIDEO,
            augment: true,
            seed: None,
            exhaustion_policy: None,
            prefetch_depth: DEFAULT_PREFETCH_DEPTH,
        }
    }
}

impl LoaderConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let cfg: LoaderConfig = serde_json::from_slice(&bytes)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_size == 0 {
            return Err(LoaderError::InvalidConfig(
                "frame_size must be > 0".to_string(),
            ));
        }
        if self.crop_width == 0 || self.crop_height == 0 {
            return Err(LoaderError::InvalidConfig(format!(
                "crop must be non-empty, got {}x{}",
                self.crop_width, self.crop_height
            )));
        }
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(LoaderError::InvalidConfig(format!(
                "fps must be a positive number, got {}",
                self.fps
            )));
        }
        if !(0.0..=1.0).contains(&self.split_ratio) {
            return Err(LoaderError::InvalidConfig(format!(
                "split_ratio must be within [0, 1], got {}",
                self.split_ratio
            )));
        }
        if self.preload_samples == 0 {
            return Err(LoaderError::InvalidConfig(
                "preload_samples must be > 0".to_string(),
            ));
        }
        if self.prefetch_depth == 0 {
            return Err(LoaderError::InvalidConfig(
                "prefetch_depth must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of producers kept alive in each scheduler pool.
    pub fn pool_capacity(&self) -> usize {
        (self.preload_samples / 2).max(1)
    }

    pub fn effective_policy(&self) -> ExhaustionPolicy {
        self.exhaustion_policy.unwrap_or(if self.augment {
            ExhaustionPolicy::FirstLabel
        } else {
            ExhaustionPolicy::AllLabels
        })
    }
}
