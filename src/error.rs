use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Failed to open video file: {0}")]
    VideoOpen(String),

    #[error("Failed to read video frame: {0}")]
    FrameRead(String),

    #[error("Invalid loader config: {0}")]
    InvalidConfig(String),

    #[error("Augmentation requires at least one background video")]
    NoBackgroundVideos,

    #[error("Failed to list {path}: {source}")]
    Catalog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("OpenCV error: {0}")]
    OpenCv(String),

    #[error("Thread error: {0}")]
    Thread(String),
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for LoaderError {
    fn from(err: opencv::Error) -> Self {
        LoaderError::OpenCv(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LoaderError>;
