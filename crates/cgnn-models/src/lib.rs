//! cgnn-models
//!
//! Candle implementations of the models driven by the cgnn trainer:
//!
//! - [`Enn`]: rotation-invariant network built from spherical harmonics of
//!   relative positions, radial filters and Clebsch-Gordan style levels.
//! - [`Siamese`]: one scorer applied to two structures with a shared head.
//! - [`GnnPsr`]: dense graph convolution network for structure ranking.
//!
pub mod enn;
pub mod gnn;
pub mod init;
pub mod mlp;
pub mod siamese;

pub use enn::{AggNormalization, CutoffType, Enn, EnnConfig, OutputHead, RawEnnConfig};
pub use gnn::{GnnConfig, GnnPsr};
pub use init::{num_parameters, reinitialize, WeightInit};
pub use mlp::BasicMlp;
pub use siamese::{Scorer, Siamese, SiameseHead};
