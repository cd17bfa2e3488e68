use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainError {
    #[error(transparent)]
    Tensor(#[from] candle_core::Error),

    #[error(transparent)]
    Data(#[from] cgnn_io::DataError),

    #[error(transparent)]
    Core(#[from] cgnn_core::CoreError),

    #[error("checkpoint {path}: {source}")]
    Safetensors {
        path: PathBuf,
        #[source]
        source: safetensors::SafeTensorError,
    },

    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint {path} lacks tensor {name}")]
    MissingTensor { path: PathBuf, name: String },

    #[error("checkpoint {path} has invalid metadata: {message}")]
    Metadata { path: PathBuf, message: String },

    #[error("{split} split yielded no batches")]
    EmptyEpoch { split: &'static str },

    #[error("non-finite training loss in epoch {epoch}")]
    NonFiniteLoss { epoch: usize },
}

pub type Result<T> = std::result::Result<T, TrainError>;
