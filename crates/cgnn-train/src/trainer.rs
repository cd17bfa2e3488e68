use crate::checkpoint::{checkpoint_path, load_checkpoint, save_checkpoint, CheckpointMeta};
use crate::correlation::CorrelationReport;
use crate::error::{Result, TrainError};
use crate::optim::{Adam, ParamsAdam};
use crate::scheduler::ReduceLrOnPlateau;
use candle_core::Device;
use candle_nn::{Optimizer, VarMap};
use cgnn_core::{Featurizer, LabeledBatch, Regressor};
use cgnn_io::{write_predictions, write_scatter_plot, DataLoader, Prediction, RecordStore};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const RESULTS_FILE: &str = "test_results.csv";
pub const SCATTER_FILE: &str = "test_scatter.svg";

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub num_epochs: usize,
    pub learning_rate: f64,
    /// Checkpoint and test outputs are written here.
    pub log_dir: PathBuf,
    /// Evaluation logs the running loss every this many batches.
    pub print_frequency: usize,
    pub progress: bool,
}

impl TrainerConfig {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            num_epochs: 20,
            learning_rate: 1e-4,
            log_dir: log_dir.into(),
            print_frequency: 10,
            progress: false,
        }
    }
}

/// Tracks the best global Spearman correlation seen on validation.
///
/// Starts at negative infinity, so the first defined value always improves.
/// Undefined values never do.
#[derive(Debug, Clone, Copy)]
pub struct BestTracker {
    best: f64,
}

impl Default for BestTracker {
    fn default() -> Self {
        Self {
            best: f64::NEG_INFINITY,
        }
    }
}

impl BestTracker {
    /// Records `value`; returns whether it is strictly better than every earlier one.
    pub fn update(&mut self, value: Option<f64>) -> bool {
        match value {
            Some(v) if v > self.best => {
                self.best = v;
                true
            }
            _ => false,
        }
    }

    pub fn best(&self) -> Option<f64> {
        self.best.is_finite().then_some(self.best)
    }
}

/// Loss, metrics and per-structure predictions of one pass over a split.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Mean of the per-batch MSE.
    pub loss: f64,
    pub report: CorrelationReport,
    pub predictions: Vec<Prediction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitSummary {
    pub epochs: usize,
    pub best_epoch: Option<usize>,
    pub best_spearman: Option<f64>,
    pub best_val_loss: f64,
    pub final_learning_rate: f64,
}

/// Runs the train / validate / checkpoint cycle for one model.
pub struct Trainer<'a, M> {
    model: &'a M,
    varmap: &'a VarMap,
    optimizer: Adam,
    scheduler: ReduceLrOnPlateau,
    tracker: BestTracker,
    /// Epoch of the checkpoint this trainer wrote, if any.
    best_epoch: Option<usize>,
    config: TrainerConfig,
    device: Device,
}

impl<'a, M: Regressor> Trainer<'a, M> {
    pub fn new(model: &'a M, varmap: &'a VarMap, config: TrainerConfig, device: &Device) -> Result<Self> {
        let optimizer = Adam::from_varmap(
            varmap,
            ParamsAdam {
                lr: config.learning_rate,
                ..Default::default()
            },
        )?;
        Ok(Self {
            model,
            varmap,
            optimizer,
            scheduler: ReduceLrOnPlateau::default(),
            tracker: BestTracker::default(),
            best_epoch: None,
            config,
            device: device.clone(),
        })
    }

    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        checkpoint_path(&self.config.log_dir)
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    /// Deletes a checkpoint this trainer did not write.
    fn remove_stale_checkpoint(&self) -> Result<()> {
        let path = self.checkpoint_path();
        if self.best_epoch.is_none() && path.exists() {
            warn!("removing stale checkpoint {}", path.display());
            std::fs::remove_file(&path).map_err(|source| TrainError::Io { path, source })?;
        }
        Ok(())
    }

    fn progress_bar(&self, len: usize, epoch: usize) -> ProgressBar {
        if !self.config.progress {
            return ProgressBar::hidden();
        }
        let style = ProgressStyle::with_template("{msg:<12} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .map(|s| s.progress_chars("━╸ "))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        let pb = ProgressBar::new(len as u64).with_style(style);
        pb.set_message(format!("epoch {epoch}"));
        pb
    }

    /// One optimisation pass; returns the root of the sample-weighted MSE.
    pub fn train_epoch<S, F>(&mut self, loader: &DataLoader<S, F>, epoch: usize) -> Result<f64>
    where
        S: RecordStore,
        F: Featurizer<Record = S::Record, Batch = M::Batch>,
    {
        let pb = self.progress_bar(loader.num_batches(), epoch);
        let mut loss_all = 0.0;
        let mut total = 0;
        for batch in loader.iter(epoch) {
            let batch = batch?;
            let preds = self.model.forward_t(&batch, true)?;
            let loss = candle_nn::loss::mse(&preds, batch.labels())?;
            self.optimizer.backward_step(&loss)?;
            let loss = loss.to_scalar::<f32>()? as f64;
            loss_all += loss * batch.len() as f64;
            total += batch.len();
            pb.inc(1);
        }
        pb.finish_and_clear();
        if total == 0 {
            return Err(TrainError::EmptyEpoch { split: "train" });
        }
        let rmse = (loss_all / total as f64).sqrt();
        if !rmse.is_finite() {
            return Err(TrainError::NonFiniteLoss { epoch });
        }
        Ok(rmse)
    }

    /// Predicts every item of `loader` without updating weights.
    pub fn evaluate<S, F>(&self, loader: &DataLoader<S, F>) -> Result<Evaluation>
    where
        S: RecordStore,
        F: Featurizer<Record = S::Record, Batch = M::Batch>,
    {
        let mut losses = Vec::with_capacity(loader.num_batches());
        let mut predictions = Vec::with_capacity(loader.len());
        for (it, batch) in loader.iter(0).enumerate() {
            let batch = batch?;
            let preds = self.model.forward_t(&batch, false)?.detach();
            let loss = candle_nn::loss::mse(&preds, batch.labels())?.to_scalar::<f32>()? as f64;
            losses.push(loss);
            let truth = batch.labels().to_vec1::<f32>()?;
            let preds = preds.to_vec1::<f32>()?;
            predictions.extend(
                batch
                    .names()
                    .iter()
                    .zip(truth.iter().zip(&preds))
                    .map(|(name, (t, p))| Prediction::new(name.as_str(), *t as f64, *p as f64)),
            );
            if it % self.config.print_frequency.max(1) == 0 {
                info!("iter {}, loss {:.6}", it, losses.iter().sum::<f64>() / losses.len() as f64);
            }
        }
        if losses.is_empty() {
            return Err(TrainError::EmptyEpoch { split: "evaluation" });
        }
        let loss = losses.iter().sum::<f64>() / losses.len() as f64;
        let report = CorrelationReport::compute(&predictions);
        Ok(Evaluation {
            loss,
            report,
            predictions,
        })
    }

    /// Trains for `num_epochs`, checkpointing whenever the global validation
    /// Spearman correlation improves.
    pub fn fit<S1, F1, S2, F2>(
        &mut self,
        train_loader: &DataLoader<S1, F1>,
        val_loader: &DataLoader<S2, F2>,
    ) -> Result<FitSummary>
    where
        S1: RecordStore,
        F1: Featurizer<Record = S1::Record, Batch = M::Batch>,
        S2: RecordStore,
        F2: Featurizer<Record = S2::Record, Batch = M::Batch>,
    {
        std::fs::create_dir_all(&self.config.log_dir).map_err(|source| TrainError::Io {
            path: self.config.log_dir.clone(),
            source,
        })?;
        self.remove_stale_checkpoint()?;
        let mut best_val_loss = f64::INFINITY;
        for epoch in 1..=self.config.num_epochs {
            let start = Instant::now();
            let train_loss = self.train_epoch(train_loader, epoch)?;
            info!("validating...");
            let val = self.evaluate(val_loader)?;
            best_val_loss = best_val_loss.min(val.loss);

            let lr = self.scheduler.step(val.loss, self.optimizer.learning_rate());
            self.optimizer.set_learning_rate(lr);

            if self.tracker.update(val.report.all.spearman) {
                save_checkpoint(
                    self.checkpoint_path(),
                    self.varmap,
                    &self.optimizer,
                    CheckpointMeta {
                        epoch,
                        loss: train_loss,
                        learning_rate: lr,
                        step: self.optimizer.step_count(),
                    },
                )?;
                self.best_epoch = Some(epoch);
            } else {
                debug!("epoch {epoch} did not improve on {:?}", self.tracker.best());
            }

            info!("Epoch: {:03}, Time: {:.3} s", epoch, start.elapsed().as_secs_f64());
            info!(
                "train rmse: {:.6}, val loss: {:.6}, lr: {:.3e}",
                train_loss, val.loss, lr
            );
            info!("Val {}", val.report);
        }
        Ok(FitSummary {
            epochs: self.config.num_epochs,
            best_epoch: self.best_epoch,
            best_spearman: self.tracker.best(),
            best_val_loss,
            final_learning_rate: self.optimizer.learning_rate(),
        })
    }

    /// Evaluates `loader` with the best checkpoint written by [`Trainer::fit`] and
    /// writes the prediction table and scatter plot into the log directory.
    pub fn test<S, F>(&mut self, loader: &DataLoader<S, F>) -> Result<Evaluation>
    where
        S: RecordStore,
        F: Featurizer<Record = S::Record, Batch = M::Batch>,
    {
        let path = self.checkpoint_path();
        match self.best_epoch {
            Some(_) => {
                load_checkpoint(&path, self.varmap, Some(&mut self.optimizer), &self.device)?;
            }
            None => warn!("no checkpoint was written, testing the current weights"),
        }
        let evaluation = self.evaluate(loader)?;
        info!("Test loss: {:.6}", evaluation.loss);
        info!("Test {}", evaluation.report);
        write_predictions(
            self.config.log_dir.join(RESULTS_FILE),
            &evaluation.predictions,
        )?;
        write_scatter_plot(
            self.config.log_dir.join(SCATTER_FILE),
            &evaluation.predictions,
            "test",
        )?;
        Ok(evaluation)
    }
}
