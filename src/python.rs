use std::path::PathBuf;
use std::sync::Arc;

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyList};

use crate::catalog::get_partition;
use crate::config::{
    Dataset, ExhaustionPolicy, LoaderConfig, DEFAULT_CROP_HEIGHT, DEFAULT_CROP_WIDTH,
    DEFAULT_FPS, DEFAULT_FRAME_SIZE, DEFAULT_MAX_SAMPLES_BY_VIDEO, DEFAULT_PREFETCH_DEPTH,
    DEFAULT_PRELOAD_SAMPLES, DEFAULT_SPLIT_RATIO,
};
use crate::error::LoaderError;
use crate::prefetch::Prefetcher;
use crate::scheduler::SampleScheduler;
use crate::source::OpenCvOpener;

impl From<LoaderError> for PyErr {
    fn from(err: LoaderError) -> PyErr {
        match err {
            LoaderError::InvalidConfig(_) | LoaderError::NoBackgroundVideos => {
                PyValueError::new_err(err.to_string())
            }
            other => PyRuntimeError::new_err(other.to_string()),
        }
    }
}

/// Python iterator over `(clip, shape, background | None, labels)` tuples.
///
/// `clip` and `background` are contiguous uint8 THWC buffers of the given `shape`.
#[pyclass(name = "SampleGenerator")]
pub struct PySampleGenerator {
    inner: Option<Prefetcher>,
    labels: Vec<String>,
}

#[pymethods]
impl PySampleGenerator {
    #[new]
    #[pyo3(signature = (
        forgd_dir,
        backd_dir,
        dataset = "train",
        frame_size = DEFAULT_FRAME_SIZE,
        crop_width = DEFAULT_CROP_WIDTH,
        crop_height = DEFAULT_CROP_HEIGHT,
        fps = DEFAULT_FPS,
        split_ratio = DEFAULT_SPLIT_RATIO,
        preload_samples = DEFAULT_PRELOAD_SAMPLES,
        max_samples_by_video = DEFAULT_MAX_SAMPLES_BY_VIDEO,
        augment = true,
        seed = None,
        exhaustion_policy = None,
        prefetch_depth = DEFAULT_PREFETCH_DEPTH
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        py: Python<'_>,
        forgd_dir: PathBuf,
        backd_dir: PathBuf,
        dataset: &str,
        frame_size: usize,
        crop_width: u32,
        crop_height: u32,
        fps: f64,
        split_ratio: f64,
        preload_samples: usize,
        max_samples_by_video: usize,
        augment: bool,
        seed: Option<u64>,
        exhaustion_policy: Option<&str>,
        prefetch_depth: usize,
    ) -> PyResult<Self> {
        let dataset: Dataset = dataset.parse()?;
        let exhaustion_policy = exhaustion_policy
            .map(str::parse::<ExhaustionPolicy>)
            .transpose()?;
        let config = LoaderConfig {
            frame_size,
            crop_width,
            crop_height,
            fps,
            split_ratio,
            preload_samples,
            max_samples_by_video,
            augment,
            seed,
            exhaustion_policy,
            prefetch_depth,
        };
        config.validate()?;

        let (prefetcher, labels) = py.allow_threads(|| -> Result<_, LoaderError> {
            let partition = get_partition(&forgd_dir, &backd_dir, dataset, config.split_ratio)?;
            let depth = config.prefetch_depth;
            let scheduler = SampleScheduler::new(partition, config, Arc::new(OpenCvOpener))?;
            let labels = scheduler.labels().to_vec();
            Ok((Prefetcher::spawn(scheduler, depth)?, labels))
        })?;

        Ok(Self {
            inner: Some(prefetcher),
            labels,
        })
    }

    #[getter]
    fn labels(&self) -> Vec<String> {
        self.labels.clone()
    }

    fn __iter__(slf: PyRef<'_, Self>) -> PyRef<'_, Self> {
        slf
    }

    fn __next__(mut slf: PyRefMut<'_, Self>, py: Python<'_>) -> PyResult<Option<PyObject>> {
        let next = match slf.inner.as_mut() {
            Some(prefetcher) => py.allow_threads(|| prefetcher.next()),
            None => return Ok(None),
        };
        let Some(sample) = next else {
            if let Some(prefetcher) = slf.inner.take() {
                let stats = py.allow_threads(|| prefetcher.finish())?;
                tracing::info!(samples = stats.samples, "python generator exhausted");
            }
            return Ok(None);
        };

        let clip = PyBytes::new(py, &sample.clip.to_bytes());
        let shape = sample.clip.shape();
        let background: PyObject = match &sample.background {
            Some(window) => PyBytes::new(py, &window.to_bytes()).into_py(py),
            None => py.None(),
        };
        let labels = PyList::new(py, sample.labels.to_f32());
        Ok(Some((clip, shape, background, labels).into_py(py)))
    }
}

#[pymodule]
fn clip_loader(_py: Python<'_>, m: &PyModule) -> PyResult<()> {
    crate::logging::init_tracing();
    m.add_class::<PySampleGenerator>()?;
    Ok(())
}
