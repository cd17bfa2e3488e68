use crate::error::{DataError, Result};
use crate::store::RecordStore;
use candle_core::Device;
use cgnn_core::Featurizer;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

/// Batches records of a store through a featurizer.
///
/// Each batch is featurized on a pool of `num_workers` threads and collated
/// onto `device` by the calling thread.
pub struct DataLoader<S, F> {
    store: S,
    featurizer: F,
    batch_size: usize,
    shuffle: bool,
    seed: u64,
    /// `None` featurizes on the calling thread.
    pool: Option<ThreadPool>,
    device: Device,
}

impl<S, F> DataLoader<S, F>
where
    S: RecordStore,
    F: Featurizer<Record = S::Record>,
{
    pub fn new(store: S, featurizer: F, batch_size: usize, device: &Device) -> Result<Self> {
        if batch_size == 0 {
            return Err(DataError::ZeroBatchSize);
        }
        Ok(Self {
            store,
            featurizer,
            batch_size,
            shuffle: false,
            seed: 0,
            pool: None,
            device: device.clone(),
        })
    }

    /// Reshuffle every epoch from `seed + epoch`.
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle = true;
        self.seed = seed;
        self
    }

    pub fn with_num_workers(mut self, num_workers: usize) -> Result<Self> {
        self.pool = if num_workers > 1 {
            Some(ThreadPoolBuilder::new().num_threads(num_workers).build()?)
        } else {
            None
        };
        Ok(self)
    }

    pub fn num_workers(&self) -> usize {
        self.pool.as_ref().map_or(1, ThreadPool::current_num_threads)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn num_batches(&self) -> usize {
        self.store.len().div_ceil(self.batch_size)
    }

    pub fn featurizer(&self) -> &F {
        &self.featurizer
    }

    /// Iterates the batches of epoch `epoch`.
    pub fn iter(&self, epoch: usize) -> BatchIter<'_, S, F> {
        let mut order = (0..self.store.len()).collect::<Vec<_>>();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(epoch as u64));
            order.shuffle(&mut rng);
        }
        BatchIter {
            loader: self,
            order,
            position: 0,
        }
    }

    fn load(&self, indices: &[usize]) -> Result<Vec<F::Sample>> {
        let featurize =
            |&index: &usize| -> Result<F::Sample> { Ok(self.featurizer.featurize(self.store.get(index)?)?) };
        match &self.pool {
            Some(pool) => pool.install(|| indices.par_iter().map(featurize).collect()),
            None => indices.iter().map(featurize).collect(),
        }
    }
}

pub struct BatchIter<'a, S, F> {
    loader: &'a DataLoader<S, F>,
    order: Vec<usize>,
    position: usize,
}

impl<S, F> Iterator for BatchIter<'_, S, F>
where
    S: RecordStore,
    F: Featurizer<Record = S::Record>,
{
    type Item = Result<F::Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.order.len() {
            return None;
        }
        let end = (self.position + self.loader.batch_size).min(self.order.len());
        let indices = &self.order[self.position..end];
        self.position = end;
        debug!("loading batch of {} records", indices.len());
        let batch = self
            .loader
            .load(indices)
            .and_then(|samples| Ok(self.loader.featurizer.collate(samples, &self.loader.device)?));
        Some(batch)
    }
}
