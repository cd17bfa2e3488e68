use super::config::AggNormalization;
use candle_core::{Module, Result, Tensor, D};
use candle_nn::{linear, Linear, VarBuilder};

/// One Clebsch-Gordan level acting on per-atom scalar channels.
#[derive(Clone, Debug)]
pub struct CgLevel {
    radial: Linear,
    mix: Linear,
    order: usize,
    num_in: usize,
    gain: f64,
    agg_normalization: AggNormalization,
}

impl CgLevel {
    pub fn new(
        num_in: usize,
        num_out: usize,
        order: usize,
        num_basis: usize,
        gain: f64,
        agg_normalization: AggNormalization,
        vb: VarBuilder,
    ) -> Result<Self> {
        Ok(Self {
            radial: linear(num_basis, (order + 1) * num_in, vb.pp("radial"))?,
            mix: linear((order + 2) * num_in, num_out, vb.pp("mix"))?,
            order,
            num_in,
            gain,
            agg_normalization,
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// * `h`: `[B, N, C_in]` atom scalars of the previous level.
    /// * `sph`: per order `[B, N, N, 2l + 1]`, at least `order + 1` entries.
    /// * `rbf`: `[B, N, N, K]` radial basis of the pair norms.
    /// * `edge_weights`: `[B, N, N]`, zero for self pairs and padding.
    /// * `atom_mask`: `[B, N]`.
    ///
    /// Returns `[B, N, C_out]`.
    pub fn forward(
        &self,
        h: &Tensor,
        sph: &[Tensor],
        rbf: &Tensor,
        edge_weights: &Tensor,
        atom_mask: &Tensor,
    ) -> Result<Tensor> {
        let (b, n, _) = h.dims3()?;
        let radial = self
            .radial
            .forward(rbf)?
            .broadcast_mul(&edge_weights.unsqueeze(D::Minus1)?)?;
        let h_j = h.unsqueeze(1)?;
        let neighbors = match self.agg_normalization {
            AggNormalization::None => None,
            AggNormalization::Neighbors => Some(
                edge_weights
                    .sum_keepdim(D::Minus1)?
                    .maximum(1f64)?
                    .reshape((b, n, 1, 1))?,
            ),
        };

        let mut parts = Vec::with_capacity(self.order + 2);
        parts.push(h.clone());
        for (l, ylm) in sph.iter().take(self.order + 1).enumerate() {
            // [B, N, N, C_in]
            let msg = radial
                .narrow(D::Minus1, l * self.num_in, self.num_in)?
                .broadcast_mul(&h_j)?
                .contiguous()?;
            // [B, N, 2l + 1, C_in]
            let density = ylm.transpose(2, 3)?.contiguous()?.matmul(&msg)?;
            let density = match &neighbors {
                Some(count) => density.broadcast_div(count)?,
                None => density,
            };
            // l x l -> 0 contraction, squashed
            parts.push(density.sqr()?.sum(2)?.affine(1.0, 1.0)?.log()?);
        }

        let mixed = self.mix.forward(&Tensor::cat(&parts, D::Minus1)?)?;
        candle_nn::ops::silu(&mixed.affine(self.gain, 0.0)?)?
            .broadcast_mul(&atom_mask.unsqueeze(D::Minus1)?)
    }
}
