use candle_core::{Module, Result, Tensor, D};
use candle_nn::{linear, Linear, VarBuilder};

/// Concatenates `(charge / charge_scale)^k * one_hot` for `k = 0..=charge_power`.
///
/// `one_hot`: `[B, N, S]`, `charges`: `[B, N]` -> `[B, N, S * (charge_power + 1)]`.
pub fn prepare_input(
    one_hot: &Tensor,
    charges: &Tensor,
    charge_power: usize,
    charge_scale: f64,
) -> Result<Tensor> {
    let (b, n, s) = one_hot.dims3()?;
    let scaled = charges.affine(1.0 / charge_scale, 0.0)?.unsqueeze(D::Minus1)?;
    let mut powers = Vec::with_capacity(charge_power + 1);
    let mut current = scaled.ones_like()?;
    for k in 0..=charge_power {
        if k > 0 {
            current = current.mul(&scaled)?;
        }
        powers.push(current.clone());
    }
    // [B, N, 1, P]
    let powers = Tensor::cat(&powers, D::Minus1)?.unsqueeze(2)?;
    one_hot
        .unsqueeze(D::Minus1)?
        .broadcast_mul(&powers)?
        .reshape((b, n, s * (charge_power + 1)))
}

/// Projects the input scalars onto the first level's channels.
#[derive(Clone, Debug)]
pub struct InputLinear {
    lin: Linear,
}

impl InputLinear {
    pub fn new(num_in: usize, num_out: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            lin: linear(num_in, num_out, vb.pp("lin"))?,
        })
    }

    pub fn forward(&self, scalars: &Tensor, atom_mask: &Tensor) -> Result<Tensor> {
        self.lin
            .forward(scalars)?
            .broadcast_mul(&atom_mask.unsqueeze(D::Minus1)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_prepare_input() {
        // one structure, two atoms, species {0, 1}
        let one_hot = Tensor::new(&[[[1f32, 0.0], [0.0, 1.0]]], &Device::Cpu).unwrap();
        let charges = Tensor::new(&[[6f32, 8.0]], &Device::Cpu).unwrap();
        let scalars = prepare_input(&one_hot, &charges, 2, 8.0).unwrap();
        assert_eq!(scalars.dims(), &[1, 2, 6]);
        let v = scalars.to_vec3::<f32>().unwrap();
        // layout is species-major: [s0^0, s0^1, s0^2, s1^0, s1^1, s1^2]
        assert_eq!(v[0][0], vec![1.0, 0.75, 0.5625, 0.0, 0.0, 0.0]);
        assert_eq!(v[0][1], vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    }
}
