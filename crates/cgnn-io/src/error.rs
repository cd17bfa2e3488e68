use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: malformed record: {source}")]
    Record {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("record {index} out of range for a store of {len} records")]
    OutOfRange { index: usize, len: usize },

    #[error("dataset split {path} contains no records")]
    EmptySplit { path: PathBuf },

    #[error("batch size must be at least 1")]
    ZeroBatchSize,

    #[error("cannot start loader workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Core(#[from] cgnn_core::CoreError),

    #[error(transparent)]
    Polars(#[from] polars::error::PolarsError),
}

impl DataError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
