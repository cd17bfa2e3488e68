use crate::error::{CoreError, Result};
use crate::model::LabeledBatch;
use crate::transform::{PairSample, StructureSample};
use candle_core::{Device, Tensor};

/// A padded batch of atomic systems.
///
/// `B` structures padded to `N` atoms, `S` species. Masks are `f32` with 1.0 for
/// real atoms / pairs; padded atoms have zero one-hot rows and zero charge so their
/// contributions vanish under the masks.
#[derive(Debug, Clone)]
pub struct StructureBatch {
    /// `[B, N, 3]`
    pub positions: Tensor,
    /// `[B, N, S]`
    pub one_hot: Tensor,
    /// `[B, N]`
    pub charges: Tensor,
    /// `[B, N]`
    pub atom_mask: Tensor,
    /// `[B, N, N]`, includes the diagonal.
    pub edge_mask: Tensor,
    /// `[B]`
    pub labels: Tensor,
    pub names: Vec<String>,
}

impl StructureBatch {
    pub fn from_samples(
        samples: &[StructureSample],
        num_species: usize,
        edge_cutoff: Option<f64>,
        device: &Device,
    ) -> Result<Self> {
        if samples.is_empty() {
            return Err(CoreError::EmptyBatch);
        }
        let b = samples.len();
        let n = samples.iter().map(|s| s.num_atoms()).max().unwrap_or(0);

        let mut positions = vec![0f32; b * n * 3];
        let mut one_hot = vec![0f32; b * n * num_species];
        let mut charges = vec![0f32; b * n];
        let mut atom_mask = vec![0f32; b * n];
        let mut edge_mask = vec![0f32; b * n * n];

        for (i, sample) in samples.iter().enumerate() {
            for (a, pos) in sample.positions.iter().enumerate() {
                let atom = i * n + a;
                positions[atom * 3..atom * 3 + 3].copy_from_slice(pos);
                one_hot[atom * num_species + sample.species[a].min(num_species - 1)] = 1.0;
                charges[atom] = sample.charges[a];
                atom_mask[atom] = 1.0;
                for (c, other) in sample.positions.iter().enumerate() {
                    let connected = match edge_cutoff {
                        Some(cutoff) => distance(pos, other) <= cutoff,
                        None => true,
                    };
                    if connected {
                        edge_mask[atom * n + c] = 1.0;
                    }
                }
            }
        }

        Ok(Self {
            positions: Tensor::from_vec(positions, (b, n, 3), device)?,
            one_hot: Tensor::from_vec(one_hot, (b, n, num_species), device)?,
            charges: Tensor::from_vec(charges, (b, n), device)?,
            atom_mask: Tensor::from_vec(atom_mask, (b, n), device)?,
            edge_mask: Tensor::from_vec(edge_mask, (b, n, n), device)?,
            labels: Tensor::from_vec(
                samples.iter().map(|s| s.label).collect::<Vec<_>>(),
                b,
                device,
            )?,
            names: samples.iter().map(|s| s.name.clone()).collect(),
        })
    }

    pub fn batch_size(&self) -> usize {
        self.names.len()
    }

    pub fn max_atoms(&self) -> Result<usize> {
        Ok(self.atom_mask.dim(1)?)
    }

    pub fn num_species(&self) -> Result<usize> {
        Ok(self.one_hot.dim(2)?)
    }

    pub fn device(&self) -> &Device {
        self.positions.device()
    }

    pub fn to_device(&self, device: &Device) -> Result<Self> {
        Ok(Self {
            positions: self.positions.to_device(device)?,
            one_hot: self.one_hot.to_device(device)?,
            charges: self.charges.to_device(device)?,
            atom_mask: self.atom_mask.to_device(device)?,
            edge_mask: self.edge_mask.to_device(device)?,
            labels: self.labels.to_device(device)?,
            names: self.names.clone(),
        })
    }

    /// Same batch with every position replaced by `f(position)`.
    pub fn map_positions(&self, f: impl Fn([f32; 3]) -> [f32; 3]) -> Result<Self> {
        let (b, n, _) = self.positions.dims3()?;
        let moved = self
            .positions
            .flatten_all()?
            .to_vec1::<f32>()?
            .chunks_exact(3)
            .flat_map(|p| f([p[0], p[1], p[2]]))
            .collect::<Vec<_>>();
        Ok(Self {
            positions: Tensor::from_vec(moved, (b, n, 3), self.device())?,
            ..self.clone()
        })
    }
}

impl LabeledBatch for StructureBatch {
    fn labels(&self) -> &Tensor {
        &self.labels
    }
    fn names(&self) -> &[String] {
        &self.names
    }
}

fn distance(a: &[f32; 3], b: &[f32; 3]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| ((x - y) as f64).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Two structure batches whose items are scored jointly.
#[derive(Debug, Clone)]
pub struct PairBatch {
    pub first: StructureBatch,
    pub second: StructureBatch,
    /// `[B]`
    pub labels: Tensor,
    pub names: Vec<String>,
}

impl PairBatch {
    pub fn from_samples(
        samples: Vec<PairSample>,
        num_species: usize,
        edge_cutoff: Option<f64>,
        device: &Device,
    ) -> Result<Self> {
        if samples.is_empty() {
            return Err(CoreError::EmptyBatch);
        }
        let labels = samples.iter().map(|s| s.label).collect::<Vec<_>>();
        let names = samples.iter().map(|s| s.name.clone()).collect();
        let (first, second): (Vec<_>, Vec<_>) =
            samples.into_iter().map(|s| (s.first, s.second)).unzip();
        Ok(Self {
            first: StructureBatch::from_samples(&first, num_species, edge_cutoff, device)?,
            second: StructureBatch::from_samples(&second, num_species, edge_cutoff, device)?,
            labels: Tensor::from_vec(labels.clone(), labels.len(), device)?,
            names,
        })
    }
}

impl LabeledBatch for PairBatch {
    fn labels(&self) -> &Tensor {
        &self.labels
    }
    fn names(&self) -> &[String] {
        &self.names
    }
}
