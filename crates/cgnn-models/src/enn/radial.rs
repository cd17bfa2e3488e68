use super::config::{CutoffType, EnnConfig};
use candle_core::{DType, Device, Result, Tensor, D};

pub fn linspace(start: f64, stop: f64, steps: usize, device: &Device) -> Result<Tensor> {
    if steps == 0 {
        Tensor::from_vec(Vec::<f64>::new(), steps, device)
    } else if steps == 1 {
        Tensor::from_vec(vec![start], steps, device)
    } else {
        let delta = (stop - start) / (steps - 1) as f64;
        let vs = (0..steps)
            .map(|step| start + step as f64 * delta)
            .collect::<Vec<_>>();
        Tensor::from_vec(vs, steps, device)
    }
}

/// Gaussian radial basis `exp(-((r - μ_k) / σ)^2)` over evenly spaced centres.
#[derive(Clone, Debug)]
pub struct RadialBasis {
    num_basis: usize,
    max_radius: f64,
}

impl RadialBasis {
    pub fn new(num_basis: usize, max_radius: f64) -> Self {
        Self {
            num_basis,
            max_radius,
        }
    }

    pub fn num_basis(&self) -> usize {
        self.num_basis
    }

    /// `norms`: `[B, N, N]` -> `[B, N, N, num_basis]`.
    pub fn forward(&self, norms: &Tensor) -> Result<Tensor> {
        let mu = linspace(0.0, self.max_radius, self.num_basis, norms.device())?
            .to_dtype(DType::F32)?
            .reshape((1, 1, 1, self.num_basis))?;
        let sigma = self.max_radius / self.num_basis as f64;
        norms
            .unsqueeze(D::Minus1)?
            .broadcast_sub(&mu)?
            .affine(1.0 / sigma, 0.0)?
            .sqr()?
            .neg()?
            .exp()
    }
}

/// Edge weights of one level: soft and/or hard cutoff applied to the pair norms.
#[derive(Clone, Debug)]
pub struct Cutoff {
    types: Vec<CutoffType>,
    hard_cut_rad: f64,
    soft_cut_rad: f64,
    soft_cut_width: f64,
}

impl Cutoff {
    pub fn for_level(config: &EnnConfig, level: usize) -> Self {
        Self {
            types: config.cutoff_type.clone(),
            hard_cut_rad: config.hard_cut_rad[level],
            soft_cut_rad: config.soft_cut_rad[level],
            soft_cut_width: config.soft_cut_width[level],
        }
    }

    /// `norms`, `edge_mask`: `[B, N, N]`. The mask is expected to already exclude
    /// zero-length pairs.
    pub fn forward(&self, norms: &Tensor, edge_mask: &Tensor) -> Result<Tensor> {
        let mut weights = edge_mask.clone();
        for cutoff in &self.types {
            let factor = match cutoff {
                CutoffType::Hard => norms.lt(self.hard_cut_rad)?.to_dtype(norms.dtype())?,
                CutoffType::Soft => candle_nn::ops::sigmoid(
                    &norms.affine(-1.0 / self.soft_cut_width, self.soft_cut_rad / self.soft_cut_width)?,
                )?,
            };
            weights = weights.mul(&factor)?;
        }
        Ok(weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linspace() {
        let t = linspace(0.0, 3.0, 4, &Device::Cpu).unwrap();
        assert_eq!(t.to_vec1::<f64>().unwrap(), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(linspace(2.0, 3.0, 1, &Device::Cpu).unwrap().to_vec1::<f64>().unwrap(), vec![2.0]);
    }

    #[test]
    fn test_radial_basis_peaks_at_centres() {
        let norms = Tensor::new(&[[[0f32, 2.0], [2.0, 0.0]]], &Device::Cpu).unwrap();
        let rbf = RadialBasis::new(3, 4.0).forward(&norms).unwrap();
        assert_eq!(rbf.dims(), &[1, 2, 2, 3]);
        let values = rbf.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        // pair (0, 1) at r = 2 sits on the middle centre
        assert!((values[4] - 1.0).abs() < 1e-6);
        assert!(values[3] < 0.1 && values[5] < 0.1);
    }

    #[test]
    fn test_cutoffs() {
        let norms = Tensor::new(&[[[0f32, 1.0, 3.0, 7.0]]], &Device::Cpu).unwrap();
        let mask = Tensor::new(&[[[0f32, 1.0, 1.0, 1.0]]], &Device::Cpu).unwrap();
        let hard = Cutoff {
            types: vec![CutoffType::Hard],
            hard_cut_rad: 5.0,
            soft_cut_rad: 0.0,
            soft_cut_width: 1.0,
        };
        let w = hard.forward(&norms, &mask).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(w, vec![0.0, 1.0, 1.0, 0.0]);

        let soft = Cutoff {
            types: vec![CutoffType::Soft],
            hard_cut_rad: 0.0,
            soft_cut_rad: 3.0,
            soft_cut_width: 0.5,
        };
        let w = soft.forward(&norms, &mask).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(w[0], 0.0);
        assert!(w[1] > 0.98);
        assert!((w[2] - 0.5).abs() < 1e-6);
        assert!(w[3] < 1e-3);
    }
}
