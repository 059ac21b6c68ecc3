//! Video discovery and deterministic train/validation/test partitioning.
//!
//! Foreground videos live in one sub-directory per label, background videos directly in the
//! background directory. Label index 0 is the synthetic background label; foreground labels
//! follow in sorted directory order.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::config::Dataset;
use crate::error::{LoaderError, Result};

pub const BACKGROUND_LABEL: &str = "Background";

/// Labels and their video paths for one dataset partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// `labels[0]` is always [`BACKGROUND_LABEL`].
    pub labels: Vec<String>,
    /// `paths[i]` belongs to `labels[i]`.
    pub paths: Vec<Vec<PathBuf>>,
}

impl Partition {
    /// Builds a partition from explicit foreground lists, in the order given.
    pub fn new(background: Vec<PathBuf>, foreground: Vec<(String, Vec<PathBuf>)>) -> Self {
        let mut labels = Vec::with_capacity(foreground.len() + 1);
        let mut paths = Vec::with_capacity(foreground.len() + 1);
        labels.push(BACKGROUND_LABEL.to_string());
        paths.push(background);
        for (label, label_paths) in foreground {
            labels.push(label);
            paths.push(label_paths);
        }
        Self { labels, paths }
    }

    pub fn num_foreground(&self) -> usize {
        self.labels.len().saturating_sub(1)
    }

    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn total_videos(&self) -> usize {
        self.paths.iter().map(Vec::len).sum()
    }
}

fn read_dir_sorted(dir: &Path, want_dirs: bool) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| LoaderError::Catalog {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| LoaderError::Catalog {
            path: dir.to_path_buf(),
            source,
        })?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden {
            continue;
        }
        let path = entry.path();
        let matches = if want_dirs {
            path.is_dir()
        } else {
            path.is_file()
        };
        if matches {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// Sorted names of the label sub-directories of `dir`.
pub fn list_labels(dir: &Path) -> Result<Vec<String>> {
    Ok(read_dir_sorted(dir, true)?
        .into_iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect())
}

/// Sorted video files directly inside `dir`.
pub fn list_videos(dir: &Path) -> Result<Vec<PathBuf>> {
    read_dir_sorted(dir, false)
}

/// Takes the slice of a sorted path list that belongs to `dataset`.
pub fn split_paths(mut paths: Vec<PathBuf>, dataset: Dataset, split_ratio: f64) -> Vec<PathBuf> {
    let n = paths.len();
    let split = ((n as f64 * split_ratio).floor() as usize).min(n);
    let mid = split + (n - split) / 2;
    let (start, end) = match dataset {
        Dataset::Train => (0, split),
        Dataset::Validation => (split, mid),
        Dataset::Test => (mid, n),
    };
    paths.truncate(end);
    paths.drain(..start);
    paths
}

pub fn get_partition(
    forgd_dir: &Path,
    backd_dir: &Path,
    dataset: Dataset,
    split_ratio: f64,
) -> Result<Partition> {
    if !(0.0..=1.0).contains(&split_ratio) {
        return Err(LoaderError::InvalidConfig(format!(
            "split_ratio must be within [0, 1], got {split_ratio}"
        )));
    }

    let labels = list_labels(forgd_dir)?;
    let foreground = labels
        .into_par_iter()
        .map(|label| -> Result<(String, Vec<PathBuf>)> {
            let videos = list_videos(&forgd_dir.join(&label))?;
            Ok((label, split_paths(videos, dataset, split_ratio)))
        })
        .collect::<Result<Vec<_>>>()?;
    let background = split_paths(list_videos(backd_dir)?, dataset, split_ratio);

    let partition = Partition::new(background, foreground);
    tracing::info!(
        dataset = %dataset,
        labels = partition.num_foreground(),
        background_videos = partition.paths[0].len(),
        total_videos = partition.total_videos(),
        "built video partition"
    );
    Ok(partition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(path: &Path) {
        File::create(path).expect("create file");
    }

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().expect("file name").to_string_lossy().into_owned())
            .collect()
    }

    fn scenario_a() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().expect("tempdir");
        let kick = tmp.path().join("fg/kick");
        fs::create_dir_all(&kick).expect("mkdir");
        touch(&kick.join("video_a.mp4"));
        touch(&kick.join("video_b.mp4"));
        let bg = tmp.path().join("bg");
        fs::create_dir_all(&bg).expect("mkdir");
        for name in ["v1.mp4", "v2.mp4", "v3.mp4"] {
            touch(&bg.join(name));
        }
        tmp
    }

    #[test]
    fn train_takes_the_leading_fraction() {
        let tmp = scenario_a();
        let p = get_partition(
            &tmp.path().join("fg"),
            &tmp.path().join("bg"),
            Dataset::Train,
            0.5,
        )
        .expect("partition");
        assert_eq!(p.labels, vec!["Background".to_string(), "kick".to_string()]);
        assert_eq!(names(&p.paths[0]), vec!["v1.mp4"]);
        assert_eq!(names(&p.paths[1]), vec!["video_a.mp4"]);
    }

    #[test]
    fn validation_and_test_halve_the_remainder() {
        let paths: Vec<PathBuf> = (0..10).map(|i| PathBuf::from(format!("{i}.mp4"))).collect();
        let train = split_paths(paths.clone(), Dataset::Train, 0.6);
        let val = split_paths(paths.clone(), Dataset::Validation, 0.6);
        let test = split_paths(paths.clone(), Dataset::Test, 0.6);
        assert_eq!(train.len(), 6);
        assert_eq!(names(&val), vec!["6.mp4", "7.mp4"]);
        assert_eq!(names(&test), vec!["8.mp4", "9.mp4"]);

        let mut all = train;
        all.extend(val);
        all.extend(test);
        assert_eq!(all, paths);
    }

    #[test]
    fn odd_remainder_goes_to_test() {
        let paths: Vec<PathBuf> = (0..4).map(|i| PathBuf::from(format!("{i}.mp4"))).collect();
        assert_eq!(names(&split_paths(paths.clone(), Dataset::Validation, 0.25)), vec!["1.mp4"]);
        assert_eq!(names(&split_paths(paths, Dataset::Test, 0.25)), vec!["2.mp4", "3.mp4"]);
    }

    #[test]
    fn labels_skip_files_and_hidden_entries() {
        let tmp = tempfile::tempdir().expect("tempdir");
        for dir in ["walk", "jump", ".cache"] {
            fs::create_dir_all(tmp.path().join(dir)).expect("mkdir");
        }
        touch(&tmp.path().join("notes.txt"));
        assert_eq!(list_labels(tmp.path()).expect("labels"), vec!["jump", "walk"]);
    }

    #[test]
    fn empty_label_keeps_its_index() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(tmp.path().join("fg/a")).expect("mkdir");
        fs::create_dir_all(tmp.path().join("fg/b")).expect("mkdir");
        touch(&tmp.path().join("fg/b/x.mp4"));
        fs::create_dir_all(tmp.path().join("bg")).expect("mkdir");
        let p = get_partition(
            &tmp.path().join("fg"),
            &tmp.path().join("bg"),
            Dataset::Train,
            1.0,
        )
        .expect("partition");
        assert_eq!(p.label_index("b"), Some(2));
        assert!(p.paths[1].is_empty());
        assert_eq!(p.paths[2].len(), 1);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let err = get_partition(
            &tmp.path().join("nope"),
            tmp.path(),
            Dataset::Train,
            0.5,
        )
        .expect_err("must fail");
        assert!(matches!(err, LoaderError::Catalog { .. }));
    }
}
