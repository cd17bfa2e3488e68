use candle_core::{Result, Tensor};

/// A batch that carries one regression label and one structure name per item.
pub trait LabeledBatch {
    /// Labels, shape `[B]`, `f32`.
    fn labels(&self) -> &Tensor;
    fn names(&self) -> &[String];
    fn len(&self) -> usize {
        self.names().len()
    }
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A model producing one scalar prediction per batch item.
pub trait Regressor {
    type Batch: LabeledBatch;

    /// Predictions of shape `[B]`. `train` toggles dropout and similar layers.
    fn forward_t(&self, batch: &Self::Batch, train: bool) -> Result<Tensor>;
}
