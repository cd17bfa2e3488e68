use crate::enn::OutputHead;
use crate::mlp::BasicMlp;
use candle_core::{Module, Result, Tensor, D};
use candle_nn::{linear, Linear, VarBuilder};
use cgnn_core::{PairBatch, Regressor, StructureBatch};

/// A model embedding one structure batch as `[B, embedding_dim]`.
pub trait Scorer {
    fn embedding_dim(&self) -> usize;
    fn score(&self, batch: &StructureBatch, train: bool) -> Result<Tensor>;
}

/// Combines the two concatenated embeddings of a pair into one prediction.
#[derive(Clone, Debug)]
pub enum SiameseHead {
    Linear(Linear),
    Mlp { mlp1: BasicMlp, mlp2: BasicMlp },
}

impl SiameseHead {
    pub fn new(head: OutputHead, embedding_dim: usize, num_mixed: usize, vb: VarBuilder) -> Result<Self> {
        match head {
            OutputHead::Linear => Ok(Self::Linear(linear(2 * embedding_dim, 1, vb.pp("lin"))?)),
            OutputHead::Pmlp => Ok(Self::Mlp {
                mlp1: BasicMlp::new(2 * embedding_dim, num_mixed, 1, num_mixed, vb.pp("mlp1"))?,
                mlp2: BasicMlp::new(num_mixed, 1, 1, num_mixed, vb.pp("mlp2"))?,
            }),
        }
    }
}

impl Module for SiameseHead {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        match self {
            Self::Linear(lin) => lin.forward(xs),
            Self::Mlp { mlp1, mlp2 } => mlp2.forward(&mlp1.forward(xs)?),
        }
    }
}

/// Applies one scorer with shared weights to both halves of a pair.
#[derive(Clone, Debug)]
pub struct Siamese<S> {
    scorer: S,
    head: SiameseHead,
}

impl<S: Scorer> Siamese<S> {
    pub fn new(scorer: S, head: SiameseHead) -> Self {
        Self { scorer, head }
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }
}

impl<S: Scorer> Regressor for Siamese<S> {
    type Batch = PairBatch;

    fn forward_t(&self, batch: &PairBatch, train: bool) -> Result<Tensor> {
        let first = self.scorer.score(&batch.first, train)?;
        let second = self.scorer.score(&batch.second, train)?;
        let joint = Tensor::cat(&[first, second], D::Minus1)?;
        self.head.forward(&joint)?.squeeze(D::Minus1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enn::{Enn, RawEnnConfig};
    use candle_core::{DType, Device};
    use candle_nn::VarMap;
    use cgnn_core::{Featurizer, PairRecord, PairTransform, StructureTransform};
    use cgnn_test_data::TestFile;

    #[test]
    fn test_siamese_enn() {
        let transform = PairTransform::new(StructureTransform::ligand_binding());
        let samples = std::str::from_utf8(TestFile::lba_pairs_01().contents())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str::<PairRecord>(line).unwrap())
            .map(|record| transform.featurize(record).unwrap())
            .collect();
        let batch = transform.collate(samples, &Device::Cpu).unwrap();

        let raw = RawEnnConfig {
            num_cg_levels: 1,
            num_channels: serde_json::json!([4]),
            maxl: serde_json::json!(1),
            max_sh: serde_json::json!(1),
            num_basis: 4,
            ..RawEnnConfig::default()
        };
        let config = raw
            .resolve(transform.structure.num_species(), transform.structure.max_charge())
            .unwrap();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let enn = Enn::new(&config, config.siamese_embedding, vb.pp("enn")).unwrap();
        let head = SiameseHead::new(
            config.siamese_head,
            enn.embedding_dim(),
            config.num_mixed,
            vb.pp("head"),
        )
        .unwrap();
        let model = Siamese::new(enn, head);
        assert_eq!(model.scorer().embedding_dim(), 36);
        let preds = model.forward_t(&batch, true).unwrap();
        assert_eq!(preds.dims(), &[2]);
    }
}
