//! cgnn-train
//!
//! Training loop shared by every task/model combination: epoch state machine,
//! plateau learning-rate schedule, correlation metrics and best-model
//! checkpointing.
//!
mod checkpoint;
pub mod correlation;
mod error;
mod optim;
mod scheduler;
mod trainer;

pub use checkpoint::{
    checkpoint_path, load_checkpoint, read_checkpoint_meta, save_checkpoint, CheckpointMeta, CHECKPOINT_FILE,
};
pub use correlation::{kendall, pearson, spearman, CorrelationReport};
pub use error::{Result, TrainError};
pub use optim::{Adam, ParamsAdam};
pub use scheduler::ReduceLrOnPlateau;
pub use trainer::{BestTracker, Evaluation, FitSummary, Trainer, TrainerConfig, RESULTS_FILE, SCATTER_FILE};
