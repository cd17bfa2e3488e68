//! Dense graph convolution network for protein structure ranking.
use candle_core::{Module, Result, Tensor, D};
use candle_nn::{linear, Dropout, Linear, VarBuilder};
use cgnn_core::{Regressor, StructureBatch};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GnnConfig {
    pub num_features: usize,
    pub hidden_dim: usize,
    pub num_layers: usize,
    pub dropout: f32,
    /// Length scale of the `exp(-d / scale)` edge weights.
    pub edge_scale: f64,
}

impl GnnConfig {
    pub fn new(num_features: usize, hidden_dim: usize) -> Self {
        Self {
            num_features,
            hidden_dim,
            num_layers: 5,
            dropout: 0.25,
            edge_scale: 4.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GnnPsr {
    convs: Vec<Linear>,
    fc1: Linear,
    fc2: Linear,
    dropout: Dropout,
    edge_scale: f64,
}

impl GnnPsr {
    pub fn new(config: &GnnConfig, vb: VarBuilder) -> Result<Self> {
        let mut convs = Vec::with_capacity(config.num_layers);
        let mut width = config.num_features;
        for idx in 0..config.num_layers {
            convs.push(linear(width, config.hidden_dim, vb.pp(format!("conv{}", idx + 1)))?);
            width = config.hidden_dim;
        }
        Ok(Self {
            convs,
            fc1: linear(width, 2 * config.hidden_dim, vb.pp("fc1"))?,
            fc2: linear(2 * config.hidden_dim, 1, vb.pp("fc2"))?,
            dropout: Dropout::new(config.dropout),
            edge_scale: config.edge_scale,
        })
    }

    /// `D^-1/2 A D^-1/2` with `A_ij = exp(-d_ij / scale)` on the edge mask.
    /// The diagonal of the mask provides the self loops.
    pub fn normalized_adjacency(&self, batch: &StructureBatch) -> Result<Tensor> {
        let pos = &batch.positions;
        let norms = pos
            .unsqueeze(2)?
            .broadcast_sub(&pos.unsqueeze(1)?)?
            .sqr()?
            .sum(D::Minus1)?
            .sqrt()?;
        let adj = norms
            .affine(-1.0 / self.edge_scale, 0.0)?
            .exp()?
            .mul(&batch.edge_mask)?;
        let inv_sqrt_deg = adj.sum(D::Minus1)?.maximum(1f64)?.sqrt()?.recip()?;
        adj.broadcast_mul(&inv_sqrt_deg.unsqueeze(2)?)?
            .broadcast_mul(&inv_sqrt_deg.unsqueeze(1)?)
    }
}

impl Regressor for GnnPsr {
    type Batch = StructureBatch;

    fn forward_t(&self, batch: &StructureBatch, train: bool) -> Result<Tensor> {
        let adj = self.normalized_adjacency(batch)?;
        let mask = batch.atom_mask.unsqueeze(D::Minus1)?;
        let mut h = batch.one_hot.clone();
        for conv in &self.convs {
            h = adj.matmul(&conv.forward(&h)?.contiguous()?)?.relu()?;
            h = h.broadcast_mul(&mask)?;
        }
        debug!("gnn node features: {:?}", h.shape());
        let pooled = h.sum(1)?;
        let x = self.fc1.forward(&pooled)?.relu()?;
        let x = self.dropout.forward(&x, train)?;
        self.fc2.forward(&x)?.squeeze(D::Minus1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;
    use cgnn_core::{Featurizer, StructureRecord, StructureTransform};
    use cgnn_test_data::TestFile;

    fn setup() -> (GnnPsr, StructureBatch) {
        let transform = StructureTransform::protein();
        let samples = std::str::from_utf8(TestFile::psr_01().contents())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str::<StructureRecord>(line).unwrap())
            .map(|record| transform.featurize(record).unwrap())
            .collect();
        let batch = transform.collate(samples, &Device::Cpu).unwrap();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = GnnPsr::new(&GnnConfig::new(transform.num_species(), 8), vb).unwrap();
        (model, batch)
    }

    #[test]
    fn test_forward_shape() {
        let (model, batch) = setup();
        assert_eq!(model.forward_t(&batch, false).unwrap().dims(), &[5]);
        assert_eq!(model.forward_t(&batch, true).unwrap().dims(), &[5]);
    }

    #[test]
    fn test_adjacency_is_symmetric_and_masked() {
        let (model, batch) = setup();
        let adj = model.normalized_adjacency(&batch).unwrap();
        let diff = adj
            .sub(&adj.transpose(1, 2).unwrap())
            .unwrap()
            .abs()
            .unwrap()
            .max_all()
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(diff < 1e-6);
        // the fourth structure has three atoms, the rest is padding
        let adj = adj.to_vec3::<f32>().unwrap();
        assert_eq!(adj[3][3], vec![0.0; 5]);
        assert!(adj[3][0][0] > 0.0);
    }

    #[test]
    fn test_eval_is_deterministic() {
        let (model, batch) = setup();
        let a = model.forward_t(&batch, false).unwrap().to_vec1::<f32>().unwrap();
        let b = model.forward_t(&batch, false).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(a, b);
    }
}
