//! cgnn-io
//!
//! Dataset access and result files:
//!
//! - [`JsonlStore`]: random access to the records of one split on disk.
//! - [`DataLoader`]: batches of featurized records, optionally shuffled.
//! - [`write_predictions`] / [`write_scatter_plot`]: test-time outputs.
//!
mod error;
mod loader;
mod results;
mod store;

pub use error::{DataError, Result};
pub use loader::{BatchIter, DataLoader};
pub use results::{write_predictions, write_scatter_plot, Prediction};
pub use store::{split_path, JsonlStore, RecordStore, Split, SPLIT_FILE};
