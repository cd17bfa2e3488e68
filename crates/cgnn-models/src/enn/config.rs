use crate::init::WeightInit;
use cgnn_core::{expand_int_list, expand_var_list, CoreError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CutoffType {
    /// Pairs beyond `hard_cut_rad` are dropped.
    Hard,
    /// Pairs are weighted by `sigmoid((soft_cut_rad - r) / soft_cut_width)`.
    Soft,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggNormalization {
    #[default]
    None,
    /// Divide aggregated densities by the weighted neighbour count.
    Neighbors,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputHead {
    /// Masked sum over atoms followed by one linear layer.
    #[default]
    Linear,
    /// Per-atom MLP, masked sum, second MLP.
    Pmlp,
}

/// ENN hyperparameters as written in a config file.
///
/// Per-level entries are kept as raw JSON so that either a number or a list can be
/// given; [`RawEnnConfig::resolve`] expands them once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawEnnConfig {
    pub maxl: Value,
    pub max_sh: Value,
    pub num_cg_levels: usize,
    pub num_channels: Value,
    pub level_gain: Value,
    pub hard_cut_rad: Value,
    pub soft_cut_rad: Value,
    pub soft_cut_width: Value,
    pub cutoff_type: Vec<CutoffType>,
    pub weight_init: WeightInit,
    pub charge_power: usize,
    pub charge_scale: Option<f64>,
    pub num_basis: usize,
    pub agg_normalization: AggNormalization,
    pub output_head: OutputHead,
    /// Hidden width of MLP heads.
    pub num_mixed: usize,
    /// Width of the per-structure embedding fed to the siamese head.
    pub siamese_embedding: usize,
    pub siamese_head: OutputHead,
}

impl Default for RawEnnConfig {
    fn default() -> Self {
        Self {
            maxl: json!(3),
            max_sh: json!(3),
            num_cg_levels: 4,
            num_channels: json!([16]),
            level_gain: json!([1.0]),
            hard_cut_rad: json!(6.0),
            soft_cut_rad: json!(5.0),
            soft_cut_width: json!(0.5),
            cutoff_type: vec![CutoffType::Soft, CutoffType::Hard],
            weight_init: WeightInit::Rand,
            charge_power: 2,
            charge_scale: None,
            num_basis: 16,
            agg_normalization: AggNormalization::None,
            output_head: OutputHead::Linear,
            num_mixed: 64,
            siamese_embedding: 36,
            siamese_head: OutputHead::Pmlp,
        }
    }
}

impl RawEnnConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> cgnn_core::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CoreError::Config(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Expands every per-level entry. `default_charge_scale` is used when the file
    /// does not set `charge_scale`.
    pub fn resolve(
        &self,
        num_species: usize,
        default_charge_scale: f64,
    ) -> cgnn_core::Result<EnnConfig> {
        let levels = self.num_cg_levels;
        if levels == 0 {
            return Err(CoreError::Config("num_cg_levels must be at least 1".into()));
        }
        if self.num_basis == 0 {
            return Err(CoreError::Config("num_basis must be at least 1".into()));
        }
        let config = EnnConfig {
            num_cg_levels: levels,
            maxl: expand_int_list("maxl", &self.maxl, levels)?,
            max_sh: expand_int_list("max_sh", &self.max_sh, levels)?,
            num_channels: expand_int_list("num_channels", &self.num_channels, levels + 1)?,
            level_gain: expand_var_list("level_gain", &self.level_gain, levels)?,
            hard_cut_rad: expand_var_list("hard_cut_rad", &self.hard_cut_rad, levels)?,
            soft_cut_rad: expand_var_list("soft_cut_rad", &self.soft_cut_rad, levels)?,
            soft_cut_width: expand_var_list("soft_cut_width", &self.soft_cut_width, levels)?,
            cutoff_type: self.cutoff_type.clone(),
            weight_init: self.weight_init,
            charge_power: self.charge_power,
            charge_scale: self.charge_scale.unwrap_or(default_charge_scale),
            num_species,
            num_basis: self.num_basis,
            agg_normalization: self.agg_normalization,
            output_head: self.output_head,
            num_mixed: self.num_mixed,
            siamese_embedding: self.siamese_embedding,
            siamese_head: self.siamese_head,
        };
        if config.num_channels.contains(&0) {
            return Err(CoreError::Config("num_channels must be positive".into()));
        }
        if config.soft_cut_width.iter().any(|w| *w <= 0.0) {
            return Err(CoreError::Config("soft_cut_width must be positive".into()));
        }
        if config.charge_scale == 0.0 {
            return Err(CoreError::Config("charge_scale must be non-zero".into()));
        }
        info!("hard_cut_rad: {:?}", config.hard_cut_rad);
        info!("soft_cut_rad: {:?}", config.soft_cut_rad);
        info!("soft_cut_width: {:?}", config.soft_cut_width);
        info!("maxl: {:?}", config.maxl);
        info!("max_sh: {:?}", config.max_sh);
        info!("num_channels: {:?}", config.num_channels);
        Ok(config)
    }
}

/// Resolved ENN hyperparameters, one entry per CG level.
#[derive(Debug, Clone, PartialEq)]
pub struct EnnConfig {
    pub num_cg_levels: usize,
    pub maxl: Vec<usize>,
    pub max_sh: Vec<usize>,
    /// `num_cg_levels + 1` entries: input projection, then each level.
    pub num_channels: Vec<usize>,
    pub level_gain: Vec<f64>,
    pub hard_cut_rad: Vec<f64>,
    pub soft_cut_rad: Vec<f64>,
    pub soft_cut_width: Vec<f64>,
    pub cutoff_type: Vec<CutoffType>,
    pub weight_init: WeightInit,
    pub charge_power: usize,
    pub charge_scale: f64,
    pub num_species: usize,
    pub num_basis: usize,
    pub agg_normalization: AggNormalization,
    pub output_head: OutputHead,
    pub num_mixed: usize,
    pub siamese_embedding: usize,
    pub siamese_head: OutputHead,
}

impl EnnConfig {
    /// Highest spherical harmonic order any level needs.
    pub fn max_order(&self) -> usize {
        self.max_sh.iter().copied().max().unwrap_or(0)
    }
    /// Orders kept by level `level`.
    pub fn level_order(&self, level: usize) -> usize {
        self.maxl[level].min(self.max_sh[level])
    }
    /// Largest radius at which an edge can still contribute.
    pub fn max_radius(&self) -> f64 {
        let hard = self.cutoff_type.contains(&CutoffType::Hard);
        let soft = self.cutoff_type.contains(&CutoffType::Soft);
        (0..self.num_cg_levels)
            .map(|l| match (hard, soft) {
                (true, _) => self.hard_cut_rad[l],
                (false, true) => self.soft_cut_rad[l] + 4.0 * self.soft_cut_width[l],
                (false, false) => self.hard_cut_rad[l],
            })
            .fold(0.0, f64::max)
    }
    pub fn num_input_scalars(&self) -> usize {
        self.num_species * (self.charge_power + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults() {
        let config = RawEnnConfig::default().resolve(11, 53.0).unwrap();
        assert_eq!(config.maxl, vec![3; 4]);
        assert_eq!(config.num_channels, vec![16; 5]);
        assert_eq!(config.level_gain, vec![1.0; 4]);
        assert_eq!(config.charge_scale, 53.0);
        assert_eq!(config.num_input_scalars(), 33);
        assert_eq!(config.max_radius(), 6.0);
    }

    #[test]
    fn test_resolve_from_json() {
        let raw: RawEnnConfig = serde_json::from_str(
            r#"{"num_cg_levels": 3, "maxl": [1, 2], "num_channels": [4, 8], "hard_cut_rad": [2.0, 3.5],
                "cutoff_type": ["hard"], "charge_scale": 9.0, "output_head": "pmlp"}"#,
        )
        .unwrap();
        let config = raw.resolve(5, 16.0).unwrap();
        assert_eq!(config.maxl, vec![1, 2, 2]);
        assert_eq!(config.num_channels, vec![4, 8, 8, 8]);
        assert_eq!(config.hard_cut_rad, vec![2.0, 3.5, 3.5]);
        assert_eq!(config.level_order(0), 1);
        assert_eq!(config.level_order(2), 2);
        assert_eq!(config.charge_scale, 9.0);
        assert_eq!(config.output_head, OutputHead::Pmlp);
        assert_eq!(config.max_radius(), 3.5);
    }

    #[test]
    fn test_resolve_rejects_bad_types() {
        let raw: RawEnnConfig = serde_json::from_str(r#"{"level_gain": "high"}"#).unwrap();
        assert!(matches!(
            raw.resolve(5, 16.0).unwrap_err(),
            CoreError::IncorrectType { .. }
        ));
        let raw: RawEnnConfig = serde_json::from_str(r#"{"num_cg_levels": 0}"#).unwrap();
        assert!(raw.resolve(5, 16.0).is_err());
    }
}
