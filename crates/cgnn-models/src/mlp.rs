use candle_core::{Module, Result, Tensor};
use candle_nn::{linear, Activation, Linear, VarBuilder};

/// Fully connected network with `num_hidden` hidden layers of equal width.
#[derive(Clone, Debug)]
pub struct BasicMlp {
    layers: Vec<Linear>,
    activation: Activation,
}

impl BasicMlp {
    pub fn new(
        num_in: usize,
        num_out: usize,
        num_hidden: usize,
        layer_width: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let mut layers = Vec::with_capacity(num_hidden + 1);
        let mut width_in = num_in;
        for idx in 0..num_hidden {
            layers.push(linear(width_in, layer_width, vb.pp(idx))?);
            width_in = layer_width;
        }
        layers.push(linear(width_in, num_out, vb.pp(num_hidden))?);
        Ok(Self {
            layers,
            activation: Activation::LeakyRelu(0.01),
        })
    }
}

impl Module for BasicMlp {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let last = self.layers.len() - 1;
        let mut xs = xs.clone();
        for (idx, layer) in self.layers.iter().enumerate() {
            xs = layer.forward(&xs)?;
            if idx < last {
                xs = self.activation.forward(&xs)?;
            }
        }
        Ok(xs)
    }
}
