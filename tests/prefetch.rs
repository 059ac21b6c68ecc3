use std::path::PathBuf;
use std::sync::Arc;

use clip_loader::source::{SyntheticOpener, SyntheticVideo};
use clip_loader::{LoaderConfig, Partition, Prefetcher, SampleScheduler};

fn partition() -> Partition {
    let paths = |prefix: &str, n: usize| -> Vec<PathBuf> {
        (0..n)
            .map(|i| PathBuf::from(format!("{prefix}/{i}.mp4")))
            .collect()
    };
    Partition::new(
        paths("bg", 3),
        vec![
            ("jump".to_string(), paths("jump", 4)),
            ("kick".to_string(), paths("kick", 4)),
        ],
    )
}

fn config() -> LoaderConfig {
    LoaderConfig {
        frame_size: 4,
        crop_width: 8,
        crop_height: 8,
        fps: 10.0,
        preload_samples: 6,
        max_samples_by_video: 4,
        augment: true,
        seed: Some(99),
        exhaustion_policy: Some(clip_loader::ExhaustionPolicy::AllLabels),
        ..LoaderConfig::default()
    }
}

#[test]
fn prefetcher_delivers_the_whole_run() {
    let opener = SyntheticOpener::with_fallback(SyntheticVideo::new(16, 16, 10.0, 80));
    let scheduler = SampleScheduler::new(partition(), config(), Arc::new(opener.clone())).unwrap();
    let mut prefetcher = Prefetcher::spawn(scheduler, 2).unwrap();

    let delivered = prefetcher.by_ref().count();
    let stats = prefetcher.finish().unwrap();

    assert_eq!(delivered, 8 * 4);
    assert_eq!(stats.samples, delivered as u64);
    assert_eq!(stats.producers_started, 8);
    assert_eq!(opener.live_handles(), 0);
}

#[test]
fn prefetch_matches_inline_order() {
    let opener = SyntheticOpener::with_fallback(SyntheticVideo::new(16, 16, 10.0, 80));
    let inline: Vec<_> = SampleScheduler::new(partition(), config(), Arc::new(opener.clone()))
        .unwrap()
        .map(|s| (s.label_index, s.clip.source.clone(), s.clip.frame_range()))
        .collect();

    let scheduler = SampleScheduler::new(partition(), config(), Arc::new(opener)).unwrap();
    let prefetched: Vec<_> = Prefetcher::spawn(scheduler, 3)
        .unwrap()
        .map(|s| (s.label_index, s.clip.source.clone(), s.clip.frame_range()))
        .collect();

    assert_eq!(inline, prefetched);
}

#[test]
fn dropping_early_releases_every_decoder() {
    let opener = SyntheticOpener::with_fallback(SyntheticVideo::new(16, 16, 10.0, 10_000));
    let mut cfg = config();
    cfg.max_samples_by_video = 1_000;
    let scheduler = SampleScheduler::new(partition(), cfg, Arc::new(opener.clone())).unwrap();
    let mut prefetcher = Prefetcher::spawn(scheduler, 4).unwrap();

    for _ in 0..5 {
        assert!(prefetcher.next().is_some());
    }
    drop(prefetcher);
    assert_eq!(opener.live_handles(), 0);
}
