//! Seeded parameter initialisation.
//!
//! Candle draws initial weights from its own generator, which cannot be seeded on
//! every backend. Models are therefore built against a `VarMap` and then
//! overwritten here from a seeded `StdRng`, which makes runs reproducible.
use candle_core::{Error, Result, Tensor};
use candle_nn::VarMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightInit {
    /// Uniform in `[-1/sqrt(fan_in), 1/sqrt(fan_in)]`.
    #[default]
    Rand,
    /// Normal with standard deviation `1/sqrt(fan_in)`.
    Randn,
}

pub fn num_parameters(varmap: &VarMap) -> usize {
    varmap.all_vars().iter().map(|v| v.elem_count()).sum()
}

/// Overwrites every variable of `varmap`. Variables are visited in name order so
/// the result depends only on `seed` and the model layout.
pub fn reinitialize(varmap: &VarMap, init: WeightInit, seed: u64) -> Result<()> {
    let data = varmap
        .data()
        .lock()
        .map_err(|e| Error::Msg(format!("varmap lock poisoned: {e}")))?;
    let mut names = data.keys().cloned().collect::<Vec<_>>();
    names.sort();

    let mut rng = StdRng::seed_from_u64(seed);
    for name in names {
        let var = &data[&name];
        let dims = var.dims().to_vec();
        let fan_in = match name.strip_suffix("bias") {
            Some(prefix) => data
                .get(&format!("{prefix}weight"))
                .and_then(|w| w.dims().last().copied()),
            None => dims.last().copied(),
        }
        .unwrap_or(1)
        .max(1);
        let bound = 1.0 / (fan_in as f64).sqrt();
        let values = match init {
            WeightInit::Rand => (0..var.elem_count())
                .map(|_| rng.gen_range(-bound..bound) as f32)
                .collect::<Vec<_>>(),
            WeightInit::Randn => {
                let normal = Normal::new(0.0, bound)
                    .map_err(|e| Error::Msg(format!("invalid init scale for {name}: {e}")))?;
                (0..var.elem_count())
                    .map(|_| normal.sample(&mut rng) as f32)
                    .collect::<Vec<_>>()
            }
        };
        let fresh = Tensor::from_vec(values, dims, var.device())?.to_dtype(var.dtype())?;
        var.set(&fresh)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::{linear, VarBuilder};

    fn weights(seed: u64, init: WeightInit) -> Vec<f32> {
        layer_weights(4, 3, seed, init)
    }

    fn layer_weights(fan_in: usize, fan_out: usize, seed: u64, init: WeightInit) -> Vec<f32> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let _layer = linear(fan_in, fan_out, vb.pp("layer")).unwrap();
        reinitialize(&varmap, init, seed).unwrap();
        let data = varmap.data().lock().unwrap();
        data["layer.weight"]
            .as_tensor()
            .flatten_all()
            .unwrap()
            .to_vec1::<f32>()
            .unwrap()
    }

    #[test]
    fn test_reinitialize_is_seeded() {
        assert_eq!(weights(1, WeightInit::Rand), weights(1, WeightInit::Rand));
        assert_ne!(weights(1, WeightInit::Rand), weights(2, WeightInit::Rand));
    }

    #[test]
    fn test_uniform_bound() {
        let w = weights(5, WeightInit::Rand);
        assert_eq!(w.len(), 12);
        assert!(w.iter().all(|v| v.abs() <= 0.5));
        assert!(weights(5, WeightInit::Randn).iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_normal_scale() {
        // std 1/sqrt(64) = 0.125
        let w = layer_weights(64, 64, 9, WeightInit::Randn);
        assert_eq!(w, layer_weights(64, 64, 9, WeightInit::Randn));
        let n = w.len() as f64;
        let mean = w.iter().map(|v| *v as f64).sum::<f64>() / n;
        let std = (w.iter().map(|v| (*v as f64 - mean).powi(2)).sum::<f64>() / n).sqrt();
        assert!(mean.abs() < 0.01, "{mean}");
        assert!((std - 0.125).abs() < 0.01, "{std}");
        assert!(w.iter().any(|v| v.abs() > 0.125));
    }

    #[test]
    fn test_num_parameters() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let _layer = linear(4, 3, vb.pp("layer")).unwrap();
        assert_eq!(num_parameters(&varmap), 15);
    }
}
