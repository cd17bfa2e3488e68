use candle_core::backprop::GradStore;
use candle_core::{Result, Tensor, Var};
use candle_nn::{Optimizer, VarMap};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamsAdam {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
}

impl Default for ParamsAdam {
    fn default() -> Self {
        Self {
            lr: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

#[derive(Debug)]
struct AdamVar {
    name: String,
    var: Var,
    first_moment: Var,
    second_moment: Var,
}

/// Adam whose moment estimates are addressable by parameter name, so that they
/// can be stored next to the weights and restored later.
#[derive(Debug)]
pub struct Adam {
    vars: Vec<AdamVar>,
    step_t: usize,
    params: ParamsAdam,
}

impl Adam {
    fn from_named(vars: Vec<(String, Var)>, params: ParamsAdam) -> Result<Self> {
        let vars = vars
            .into_iter()
            .filter(|(_, var)| var.dtype().is_float())
            .map(|(name, var)| {
                let first_moment = Var::zeros(var.shape(), var.dtype(), var.device())?;
                let second_moment = Var::zeros(var.shape(), var.dtype(), var.device())?;
                Ok(AdamVar {
                    name,
                    var,
                    first_moment,
                    second_moment,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            vars,
            step_t: 0,
            params,
        })
    }

    /// Optimizes every variable of `varmap`, keyed by its name.
    pub fn from_varmap(varmap: &VarMap, params: ParamsAdam) -> Result<Self> {
        let mut named = {
            let data = varmap
                .data()
                .lock()
                .map_err(|e| candle_core::Error::Msg(format!("varmap lock poisoned: {e}")))?;
            data.iter()
                .map(|(name, var)| (name.clone(), var.clone()))
                .collect::<Vec<_>>()
        };
        named.sort_by(|a, b| a.0.cmp(&b.0));
        Self::from_named(named, params)
    }

    pub fn step_count(&self) -> usize {
        self.step_t
    }

    /// Moment tensors keyed `m.<name>` and `v.<name>`.
    pub fn state(&self) -> Vec<(String, Tensor)> {
        self.vars
            .iter()
            .flat_map(|v| {
                [
                    (format!("m.{}", v.name), v.first_moment.as_tensor().clone()),
                    (format!("v.{}", v.name), v.second_moment.as_tensor().clone()),
                ]
            })
            .collect()
    }

    /// Restores moments written by [`Adam::state`]. Names absent from `state`
    /// are reported back to the caller.
    pub fn load_state(&mut self, state: &HashMap<String, Tensor>, step_t: usize) -> Result<Vec<String>> {
        let mut missing = Vec::new();
        for v in &self.vars {
            for (key, moment) in [
                (format!("m.{}", v.name), &v.first_moment),
                (format!("v.{}", v.name), &v.second_moment),
            ] {
                match state.get(&key) {
                    Some(t) => moment.set(&t.to_device(moment.device())?.to_dtype(moment.dtype())?)?,
                    None => missing.push(key),
                }
            }
        }
        self.step_t = step_t;
        Ok(missing)
    }
}

impl Optimizer for Adam {
    type Config = ParamsAdam;

    fn new(vars: Vec<Var>, params: ParamsAdam) -> Result<Self> {
        let named = vars
            .into_iter()
            .enumerate()
            .map(|(idx, var)| (format!("param{idx}"), var))
            .collect();
        Self::from_named(named, params)
    }

    fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.params.lr = lr
    }

    fn step(&mut self, grads: &GradStore) -> Result<()> {
        self.step_t += 1;
        let lr = self.params.lr;
        let beta1 = self.params.beta1;
        let beta2 = self.params.beta2;
        let scale_m = 1f64 / (1f64 - beta1.powi(self.step_t as i32));
        let scale_v = 1f64 / (1f64 - beta2.powi(self.step_t as i32));
        for v in self.vars.iter() {
            let theta = &v.var;
            let m = &v.first_moment;
            let s = &v.second_moment;
            if let Some(g) = grads.get(theta) {
                let next_m = ((m.as_tensor() * beta1)? + (g * (1.0 - beta1))?)?;
                let next_v = ((s.as_tensor() * beta2)? + (g.sqr()? * (1.0 - beta2))?)?;
                let m_hat = (&next_m * scale_m)?;
                let v_hat = (&next_v * scale_v)?;
                let delta = (m_hat * lr)?.div(&(v_hat.sqrt()? + self.params.eps)?)?;
                theta.set(&theta.sub(&delta)?)?;
                m.set(&next_m)?;
                s.set(&next_v)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn test_minimizes_quadratic() {
        let w = Var::new(&[3f32, -2.0], &Device::Cpu).unwrap();
        let mut opt = Adam::new(
            vec![w.clone()],
            ParamsAdam {
                lr: 0.1,
                ..Default::default()
            },
        )
        .unwrap();
        for _ in 0..300 {
            let loss = w.as_tensor().sqr().unwrap().sum_all().unwrap();
            opt.backward_step(&loss).unwrap();
        }
        let w = w.as_tensor().to_vec1::<f32>().unwrap();
        assert!(w.iter().all(|v| v.abs() < 0.05), "{w:?}");
        assert_eq!(opt.step_count(), 300);
    }

    #[test]
    fn test_state_roundtrip() {
        let varmap = VarMap::new();
        let vb = candle_nn::VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let layer = candle_nn::linear(2, 1, vb.pp("lin")).unwrap();
        let mut opt = Adam::from_varmap(&varmap, ParamsAdam::default()).unwrap();
        let xs = Tensor::new(&[[1f32, 2.0]], &Device::Cpu).unwrap();
        let loss = candle_core::Module::forward(&layer, &xs).unwrap().sum_all().unwrap();
        opt.backward_step(&loss).unwrap();

        let state = opt.state();
        let keys = state.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["m.lin.bias", "v.lin.bias", "m.lin.weight", "v.lin.weight"]);

        let mut fresh = Adam::from_varmap(&varmap, ParamsAdam::default()).unwrap();
        let missing = fresh
            .load_state(&state.into_iter().collect::<HashMap<_, _>>(), 1)
            .unwrap();
        assert!(missing.is_empty());
        assert_eq!(fresh.step_count(), 1);
        let restored = fresh.state();
        let bias_m = restored[0].1.to_vec1::<f32>().unwrap();
        assert!(bias_m[0].abs() > 0.0);
    }
}
