use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use clip_loader::catalog::get_partition;
use clip_loader::config::{Dataset, ExhaustionPolicy, LoaderConfig};
use clip_loader::logging::init_tracing;
use clip_loader::prefetch::Prefetcher;
use clip_loader::scheduler::SampleScheduler;
use clip_loader::source::OpenCvOpener;

/// Generate random labeled video clips from foreground/background video directories.
#[derive(Debug, Parser)]
#[command(name = "clip-loader")]
struct Args {
    /// Foreground video directory, one sub-directory per label.
    #[arg(short = 'f', long)]
    foreground_video_dir: PathBuf,
    /// Background video directory.
    #[arg(short = 'b', long)]
    background_video_dir: PathBuf,
    /// Partition to sample: train, validation or test.
    #[arg(short = 'd', long, default_value = "train")]
    dataset: Dataset,
    /// JSON config file; explicit flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Fraction of each label's videos used for training.
    #[arg(short = 's', long)]
    split_ratio: Option<f64>,
    #[arg(long)]
    frame_size: Option<usize>,
    #[arg(long)]
    crop_width: Option<u32>,
    #[arg(long)]
    crop_height: Option<u32>,
    /// Target frame rate.
    #[arg(long)]
    fps: Option<f64>,
    /// Concurrently open videos (half foreground, half background).
    #[arg(long)]
    preload_samples: Option<usize>,
    #[arg(long)]
    max_samples_by_video: Option<usize>,
    /// Disable temporal jitter and background pairing.
    #[arg(long, default_value_t = false)]
    no_augment: bool,
    #[arg(long)]
    seed: Option<u64>,
    /// first-label or all-labels.
    #[arg(long)]
    exhaustion_policy: Option<ExhaustionPolicy>,
    /// Stop after this many samples.
    #[arg(long)]
    limit: Option<usize>,
}

impl Args {
    fn loader_config(&self) -> Result<LoaderConfig> {
        let mut cfg = match &self.config {
            Some(path) => LoaderConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => LoaderConfig::default(),
        };
        if let Some(v) = self.split_ratio {
            cfg.split_ratio = v;
        }
        if let Some(v) = self.frame_size {
            cfg.frame_size = v;
        }
        if let Some(v) = self.crop_width {
            cfg.crop_width = v;
        }
        if let Some(v) = self.crop_height {
            cfg.crop_height = v;
        }
        if let Some(v) = self.fps {
            cfg.fps = v;
        }
        if let Some(v) = self.preload_samples {
            cfg.preload_samples = v;
        }
        if let Some(v) = self.max_samples_by_video {
            cfg.max_samples_by_video = v;
        }
        if self.no_augment {
            cfg.augment = false;
        }
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
        if self.exhaustion_policy.is_some() {
            cfg.exhaustion_policy = self.exhaustion_policy;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = args.loader_config()?;
    tracing::debug!(?cfg, "loader config");

    let partition = get_partition(
        &args.foreground_video_dir,
        &args.background_video_dir,
        args.dataset,
        cfg.split_ratio,
    )
    .context("listing videos")?;

    let depth = cfg.prefetch_depth;
    let scheduler = SampleScheduler::new(partition, cfg, Arc::new(OpenCvOpener))?;
    let labels = scheduler.labels().to_vec();
    let mut prefetcher = Prefetcher::spawn(scheduler, depth)?;

    let limit = args.limit.unwrap_or(usize::MAX);
    let mut printed = 0usize;
    for sample in prefetcher.by_ref().take(limit) {
        let (frames, height, width, channels) = sample.clip.shape();
        let range = sample
            .clip
            .frame_range()
            .map(|(a, b)| format!("{a}..={b}"))
            .unwrap_or_default();
        let background = sample
            .background
            .as_ref()
            .map(|w| format!("{:?}", w.shape()))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{printed}\t{}\t{frames}x{height}x{width}x{channels}\t{}\t{range}\t{background}\t{:?}",
            labels[sample.label_index],
            sample.clip.source.display(),
            sample.labels.as_slice()
        );
        printed += 1;
    }

    let stats = prefetcher.finish()?;
    tracing::info!(
        printed,
        samples = stats.samples,
        producers = stats.producers_started,
        labels_exhausted = stats.labels_exhausted,
        "done"
    );
    Ok(())
}
