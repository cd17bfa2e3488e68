//! Rotation-invariant network over spherical harmonics of relative positions.
//!
//! The model keeps per-atom scalar channels. Each level builds, for every order
//! `l`, the density `A_lm(i) = sum_j w(r_ij) R_l(r_ij) Y_lm(r_ij) h_j` and contracts
//! it with itself (the `l x l -> 0` Clebsch-Gordan path) before mixing.
mod cg;
mod config;
mod input;
mod model;
mod output;
mod radial;
mod sph;

pub use cg::CgLevel;
pub use config::{AggNormalization, CutoffType, EnnConfig, OutputHead, RawEnnConfig};
pub use input::{prepare_input, InputLinear};
pub use model::Enn;
pub use output::OutputLayer;
pub use radial::{linspace, Cutoff, RadialBasis};
pub use sph::{real_spherical_harmonics, SphericalHarmonicsRel};
