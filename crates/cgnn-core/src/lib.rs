//! # cgnn-core
//!
//! Shared building blocks for the cgnn training pipelines.
//!
//! __cgnn-core__ provides:
//! * Structure records as they are stored on disk ([`StructureRecord`], [`PairRecord`])
//! * Featurization of records into padded, masked tensor batches ([`Featurizer`])
//! * Expansion of per-level hyperparameters ([`expand_var_list`])
//! * The [`Regressor`] trait implemented by every model the trainer can drive
//!
mod batch;
mod device;
mod elements;
mod error;
mod hyperparams;
mod model;
mod record;
mod transform;

pub use self::batch::{PairBatch, StructureBatch};
pub use self::device::device;
pub use self::elements::{atomic_number, ELEMENT_LIST};
pub use self::error::{CoreError, Result};
pub use self::hyperparams::{expand_int_list, expand_var_list};
pub use self::model::{LabeledBatch, Regressor};
pub use self::record::{target_name, AtomRecord, PairRecord, StructureRecord};
pub use self::transform::{
    Featurizer, PairSample, PairTransform, StructureSample, StructureTransform,
};
