use super::config::OutputHead;
use crate::mlp::BasicMlp;
use candle_core::{Module, Result, Tensor, D};
use candle_nn::{linear, Linear, VarBuilder};

/// Reduces per-atom scalars to one vector per structure.
#[derive(Clone, Debug)]
pub enum OutputLayer {
    /// Masked sum over atoms, then a linear layer.
    Linear { lin: Linear },
    /// Per-atom MLP, masked sum, second MLP.
    Pmlp { mlp1: BasicMlp, mlp2: BasicMlp },
}

impl OutputLayer {
    pub fn new(
        head: OutputHead,
        num_scalars: usize,
        num_out: usize,
        num_mixed: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        match head {
            OutputHead::Linear => Ok(Self::Linear {
                lin: linear(num_scalars, num_out, vb.pp("lin"))?,
            }),
            OutputHead::Pmlp => Ok(Self::Pmlp {
                mlp1: BasicMlp::new(num_scalars, num_mixed, 1, num_mixed, vb.pp("mlp1"))?,
                mlp2: BasicMlp::new(num_mixed, num_out, 1, num_mixed, vb.pp("mlp2"))?,
            }),
        }
    }

    /// `atom_scalars`: `[B, N, F]`, `atom_mask`: `[B, N]` -> `[B, num_out]`.
    pub fn forward(&self, atom_scalars: &Tensor, atom_mask: &Tensor) -> Result<Tensor> {
        let mask = atom_mask.unsqueeze(D::Minus1)?;
        match self {
            Self::Linear { lin } => {
                let pooled = atom_scalars.broadcast_mul(&mask)?.sum(1)?;
                lin.forward(&pooled)
            }
            Self::Pmlp { mlp1, mlp2 } => {
                let pooled = mlp1.forward(atom_scalars)?.broadcast_mul(&mask)?.sum(1)?;
                mlp2.forward(&pooled)
            }
        }
    }
}
