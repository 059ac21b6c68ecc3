//! Multiplexes many per-video producers into one stream of labeled samples.
//!
//! The scheduler keeps a bounded pool of active foreground producers and pulls one window
//! per step from a randomly chosen producer. Foreground paths are drawn without replacement;
//! in augmented mode a second pool of background producers, drawn with replacement, supplies
//! a background window for every foreground sample.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::catalog::Partition;
use crate::config::{ExhaustionPolicy, LoaderConfig};
use crate::error::{LoaderError, Result};
use crate::frame::Window;
use crate::resampler::{Resampler, ResamplerParams};
use crate::source::SourceOpener;

/// Multi-hot label encoding. Index 0 flags "not pure background".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVector(Vec<u8>);

impl LabelVector {
    fn for_sample(len: usize, label_index: usize, augmented: bool) -> Self {
        let mut bits = vec![0u8; len];
        if augmented || label_index != 0 {
            bits[0] = 1;
        }
        if label_index != 0 {
            bits[label_index] = 1;
        }
        Self(bits)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_set(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(0) != 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn to_f32(&self) -> Vec<f32> {
        self.0.iter().map(|b| f32::from(*b)).collect()
    }
}

#[derive(Debug, Clone)]
pub struct Sample {
    pub clip: Window,
    /// Present iff the scheduler runs in augmented mode.
    pub background: Option<Window>,
    pub label_index: usize,
    pub labels: LabelVector,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub samples: u64,
    pub producers_started: u64,
    pub producers_exhausted: u64,
    pub background_producers_started: u64,
    pub labels_exhausted: u64,
}

struct ActiveProducer {
    label: usize,
    producer: Resampler,
}

pub struct SampleScheduler {
    config: LoaderConfig,
    params: ResamplerParams,
    policy: ExhaustionPolicy,
    opener: Arc<dyn SourceOpener>,
    rng: StdRng,
    labels: Vec<String>,
    remaining: Vec<Vec<PathBuf>>,
    active: Vec<ActiveProducer>,
    active_counts: Vec<usize>,
    background_paths: Vec<PathBuf>,
    background_pool: Vec<Resampler>,
    finished: bool,
    stats: SchedulerStats,
}

impl SampleScheduler {
    pub fn new(
        partition: Partition,
        config: LoaderConfig,
        opener: Arc<dyn SourceOpener>,
    ) -> Result<Self> {
        config.validate()?;
        let Partition { labels, mut paths } = partition;
        if labels.is_empty() || labels.len() != paths.len() {
            return Err(LoaderError::InvalidConfig(format!(
                "partition has {} labels but {} path lists",
                labels.len(),
                paths.len()
            )));
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let background_paths = if config.augment {
            let background = std::mem::take(&mut paths[0]);
            if background.is_empty() {
                return Err(LoaderError::NoBackgroundVideos);
            }
            background
        } else {
            Vec::new()
        };

        let label_count = labels.len();
        let mut scheduler = Self {
            params: ResamplerParams::from(&config),
            policy: config.effective_policy(),
            config,
            opener,
            rng,
            labels,
            remaining: paths,
            active: Vec::new(),
            active_counts: vec![0; label_count],
            background_paths,
            background_pool: Vec::new(),
            finished: false,
            stats: SchedulerStats::default(),
        };

        if scheduler.config.augment {
            for _ in 0..scheduler.config.pool_capacity() {
                let producer = scheduler.fresh_background();
                scheduler.background_pool.push(producer);
            }
        }

        tracing::info!(
            labels = scheduler.labels.len(),
            videos = scheduler.remaining.iter().map(Vec::len).sum::<usize>(),
            background_videos = scheduler.background_paths.len(),
            augment = scheduler.config.augment,
            policy = ?scheduler.policy,
            "sample scheduler ready"
        );
        Ok(scheduler)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn active_producers(&self) -> usize {
        self.active.len()
    }

    /// Paths of `label` not yet handed to a producer.
    pub fn remaining_paths(&self, label: usize) -> usize {
        self.remaining.get(label).map(Vec::len).unwrap_or(0)
    }

    /// Yields the next sample, or `None` once the run is over. Exhaustion is sticky.
    pub fn next_sample(&mut self) -> Option<Sample> {
        while !self.finished {
            self.replenish();
            if self.active.is_empty() {
                self.finish_run("all labels exhausted");
                break;
            }

            let slot = self.rng.gen_range(0..self.active.len());
            if let Some(clip) = self.active[slot].producer.next_window() {
                let label_index = self.active[slot].label;
                let background = if self.config.augment {
                    match self.next_background() {
                        Some(window) => Some(window),
                        None => {
                            self.finish_run("no usable background video");
                            break;
                        }
                    }
                } else {
                    None
                };
                self.stats.samples += 1;
                return Some(Sample {
                    clip,
                    background,
                    label_index,
                    labels: LabelVector::for_sample(
                        self.labels.len(),
                        label_index,
                        self.config.augment,
                    ),
                });
            }

            let ActiveProducer { label, producer } = self.active.swap_remove(slot);
            self.stats.producers_exhausted += 1;
            self.active_counts[label] = self.active_counts[label].saturating_sub(1);
            tracing::debug!(
                label = %self.labels[label],
                path = %producer.path().display(),
                windows = producer.windows_emitted(),
                "producer exhausted"
            );

            if self.remaining[label].is_empty() && self.active_counts[label] == 0 {
                self.stats.labels_exhausted += 1;
                tracing::info!(label = %self.labels[label], "label exhausted");
                if self.policy == ExhaustionPolicy::FirstLabel {
                    self.finish_run("first label exhausted");
                }
            }
        }
        None
    }

    fn replenish(&mut self) {
        let capacity = self.config.pool_capacity();
        while self.active.len() < capacity {
            let eligible: Vec<usize> = (0..self.remaining.len())
                .filter(|&i| !self.remaining[i].is_empty())
                .collect();
            if eligible.is_empty() {
                return;
            }
            let label = eligible[self.rng.gen_range(0..eligible.len())];
            let pick = self.rng.gen_range(0..self.remaining[label].len());
            let path = self.remaining[label].swap_remove(pick);

            tracing::trace!(label = %self.labels[label], path = %path.display(), "starting producer");
            let producer = Resampler::new(
                path,
                self.params,
                Arc::clone(&self.opener),
                self.rng.gen(),
            );
            self.active.push(ActiveProducer { label, producer });
            self.active_counts[label] += 1;
            self.stats.producers_started += 1;
        }
    }

    fn fresh_background(&mut self) -> Resampler {
        let pick = self.rng.gen_range(0..self.background_paths.len());
        let path = self.background_paths[pick].clone();
        self.stats.background_producers_started += 1;
        Resampler::new(path, self.params, Arc::clone(&self.opener), self.rng.gen())
    }

    /// Pulls a window from a random background producer, replacing producers that run dry.
    /// Gives up once too many fresh producers in a row come back empty.
    fn next_background(&mut self) -> Option<Window> {
        let max_dead = (4 * self.background_paths.len()).max(8);
        let mut dead = 0;
        loop {
            let slot = self.rng.gen_range(0..self.background_pool.len());
            if let Some(window) = self.background_pool[slot].next_window() {
                return Some(window);
            }
            if self.background_pool[slot].windows_emitted() == 0 {
                dead += 1;
                if dead > max_dead {
                    tracing::warn!(
                        background_videos = self.background_paths.len(),
                        attempts = dead,
                        "background videos yield no windows"
                    );
                    return None;
                }
            }
            self.background_pool[slot] = self.fresh_background();
        }
    }

    fn finish_run(&mut self, reason: &str) {
        self.finished = true;
        self.active.clear();
        self.background_pool.clear();
        tracing::info!(
            reason,
            samples = self.stats.samples,
            producers = self.stats.producers_started,
            background_producers = self.stats.background_producers_started,
            "sample scheduler finished"
        );
    }
}

impl Iterator for SampleScheduler {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        self.next_sample()
    }
}

impl std::iter::FusedIterator for SampleScheduler {}

impl fmt::Debug for SampleScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleScheduler")
            .field("labels", &self.labels)
            .field("active", &self.active.len())
            .field("background_pool", &self.background_pool.len())
            .field("finished", &self.finished)
            .field("stats", &self.stats)
            .finish()
    }
}
