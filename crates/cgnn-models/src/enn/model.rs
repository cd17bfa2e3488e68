use super::cg::CgLevel;
use super::config::EnnConfig;
use super::input::{prepare_input, InputLinear};
use super::output::OutputLayer;
use super::radial::{Cutoff, RadialBasis};
use super::sph::SphericalHarmonicsRel;
use crate::siamese::Scorer;
use candle_core::{DType, Result, Tensor, D};
use candle_nn::VarBuilder;
use cgnn_core::{Regressor, StructureBatch};
use tracing::debug;

/// Equivariant network predicting `out_dim` values per structure.
///
/// With `out_dim == 1` it is a [`Regressor`] on its own; with a wider output it
/// serves as the [`Scorer`] of a [`crate::Siamese`] model.
#[derive(Clone, Debug)]
pub struct Enn {
    config: EnnConfig,
    sph: SphericalHarmonicsRel,
    rbf: RadialBasis,
    input: InputLinear,
    levels: Vec<CgLevel>,
    cutoffs: Vec<Cutoff>,
    output: OutputLayer,
    out_dim: usize,
}

impl Enn {
    pub fn new(config: &EnnConfig, out_dim: usize, vb: VarBuilder) -> Result<Self> {
        let channels = &config.num_channels;
        let input = InputLinear::new(config.num_input_scalars(), channels[0], vb.pp("input"))?;
        let mut levels = Vec::with_capacity(config.num_cg_levels);
        let mut cutoffs = Vec::with_capacity(config.num_cg_levels);
        for level in 0..config.num_cg_levels {
            levels.push(CgLevel::new(
                channels[level],
                channels[level + 1],
                config.level_order(level),
                config.num_basis,
                config.level_gain[level],
                config.agg_normalization,
                vb.pp(format!("levels.{level}")),
            )?);
            cutoffs.push(Cutoff::for_level(config, level));
        }
        let num_scalars = channels.iter().sum();
        let output = OutputLayer::new(
            config.output_head,
            num_scalars,
            out_dim,
            config.num_mixed,
            vb.pp("output"),
        )?;
        Ok(Self {
            config: config.clone(),
            sph: SphericalHarmonicsRel::new(config.max_order()),
            rbf: RadialBasis::new(config.num_basis, config.max_radius()),
            input,
            levels,
            cutoffs,
            output,
            out_dim,
        })
    }

    pub fn config(&self) -> &EnnConfig {
        &self.config
    }

    /// Scalars of the input projection and of every level, `[B, N, sum(num_channels)]`.
    pub fn atom_scalars(&self, batch: &StructureBatch) -> Result<Tensor> {
        let scalars = prepare_input(
            &batch.one_hot,
            &batch.charges,
            self.config.charge_power,
            self.config.charge_scale,
        )?;
        debug!("input scalars: {:?}", scalars.shape());

        let (sph, norms) = self.sph.forward(&batch.positions, &batch.positions)?;
        let rbf = self.rbf.forward(&norms)?;
        let edge_mask = batch.edge_mask.mul(&norms.gt(0f64)?.to_dtype(DType::F32)?)?;

        let mut h = self.input.forward(&scalars, &batch.atom_mask)?;
        let mut all = vec![h.clone()];
        for (level, cutoff) in self.levels.iter().zip(&self.cutoffs) {
            let edge_weights = cutoff.forward(&norms, &edge_mask)?;
            h = level.forward(&h, &sph, &rbf, &edge_weights, &batch.atom_mask)?;
            debug!("level order {}: {:?}", level.order(), h.shape());
            all.push(h.clone());
        }
        Tensor::cat(&all, D::Minus1)
    }

    /// `[B, out_dim]`
    pub fn embed(&self, batch: &StructureBatch) -> Result<Tensor> {
        let atom_scalars = self.atom_scalars(batch)?;
        self.output.forward(&atom_scalars, &batch.atom_mask)
    }
}

impl Regressor for Enn {
    type Batch = StructureBatch;

    fn forward_t(&self, batch: &StructureBatch, _train: bool) -> Result<Tensor> {
        self.embed(batch)?.squeeze(D::Minus1)
    }
}

impl Scorer for Enn {
    fn embedding_dim(&self) -> usize {
        self.out_dim
    }

    fn score(&self, batch: &StructureBatch, _train: bool) -> Result<Tensor> {
        self.embed(batch)
    }
}
