//! Best-model checkpoints as a single safetensors file.
//!
//! Layout: `model.<var>` weights, `optim.m.<var>` / `optim.v.<var>` Adam
//! moments, and string metadata `epoch`, `loss`, `learning_rate`, `step`.
use crate::error::{Result, TrainError};
use crate::optim::Adam;
use candle_core::{Device, Tensor};
use candle_nn::{Optimizer, VarMap};
use safetensors::SafeTensors;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CHECKPOINT_FILE: &str = "best_weights.safetensors";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckpointMeta {
    pub epoch: usize,
    /// Training loss of the checkpointed epoch.
    pub loss: f64,
    pub learning_rate: f64,
    pub step: usize,
}

impl CheckpointMeta {
    fn to_metadata(self) -> HashMap<String, String> {
        HashMap::from([
            ("epoch".to_string(), self.epoch.to_string()),
            ("loss".to_string(), self.loss.to_string()),
            ("learning_rate".to_string(), self.learning_rate.to_string()),
            ("step".to_string(), self.step.to_string()),
        ])
    }

    fn from_metadata(path: &Path, metadata: Option<&HashMap<String, String>>) -> Result<Self> {
        let field = |key: &str| -> Result<&String> {
            metadata
                .and_then(|m| m.get(key))
                .ok_or_else(|| TrainError::Metadata {
                    path: path.to_path_buf(),
                    message: format!("missing {key}"),
                })
        };
        let invalid = |key: &str| TrainError::Metadata {
            path: path.to_path_buf(),
            message: format!("unparsable {key}"),
        };
        Ok(Self {
            epoch: field("epoch")?.parse().map_err(|_| invalid("epoch"))?,
            loss: field("loss")?.parse().map_err(|_| invalid("loss"))?,
            learning_rate: field("learning_rate")?
                .parse()
                .map_err(|_| invalid("learning_rate"))?,
            step: field("step")?.parse().map_err(|_| invalid("step"))?,
        })
    }
}

/// Overwrites `path` with the current weights and optimizer state.
pub fn save_checkpoint(
    path: impl AsRef<Path>,
    varmap: &VarMap,
    optimizer: &Adam,
    meta: CheckpointMeta,
) -> Result<()> {
    let path = path.as_ref();
    let mut tensors: Vec<(String, Tensor)> = {
        let data = varmap
            .data()
            .lock()
            .map_err(|e| candle_core::Error::Msg(format!("varmap lock poisoned: {e}")))?;
        data.iter()
            .map(|(name, var)| (format!("model.{name}"), var.as_tensor().clone()))
            .collect()
    };
    tensors.extend(
        optimizer
            .state()
            .into_iter()
            .map(|(name, tensor)| (format!("optim.{name}"), tensor)),
    );
    safetensors::tensor::serialize_to_file(tensors, &Some(meta.to_metadata()), path).map_err(
        |source| TrainError::Safetensors {
            path: path.to_path_buf(),
            source,
        },
    )?;
    info!(
        "saved checkpoint of epoch {} to {}",
        meta.epoch,
        path.display()
    );
    Ok(())
}

/// Restores weights into `varmap` and, when given, the optimizer state and
/// learning rate.
pub fn load_checkpoint(
    path: impl AsRef<Path>,
    varmap: &VarMap,
    optimizer: Option<&mut Adam>,
    device: &Device,
) -> Result<CheckpointMeta> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| TrainError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let meta = parse_meta(path, &bytes)?;
    let tensors = candle_core::safetensors::load_buffer(&bytes, device)?;

    {
        let data = varmap
            .data()
            .lock()
            .map_err(|e| candle_core::Error::Msg(format!("varmap lock poisoned: {e}")))?;
        for (name, var) in data.iter() {
            let key = format!("model.{name}");
            let tensor = tensors.get(&key).ok_or_else(|| TrainError::MissingTensor {
                path: path.to_path_buf(),
                name: key.clone(),
            })?;
            var.set(&tensor.to_dtype(var.dtype())?)?;
        }
    }

    if let Some(optimizer) = optimizer {
        let state = tensors
            .iter()
            .filter_map(|(name, t)| {
                name.strip_prefix("optim.")
                    .map(|rest| (rest.to_string(), t.clone()))
            })
            .collect::<HashMap<_, _>>();
        let missing = optimizer.load_state(&state, meta.step)?;
        if !missing.is_empty() {
            warn!("{} optimizer moments missing from {}", missing.len(), path.display());
        }
        optimizer.set_learning_rate(meta.learning_rate);
    }
    info!("loaded checkpoint of epoch {} from {}", meta.epoch, path.display());
    Ok(meta)
}

/// Metadata of the checkpoint at `path`, without touching any weights.
pub fn read_checkpoint_meta(path: impl AsRef<Path>) -> Result<CheckpointMeta> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| TrainError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_meta(path, &bytes)
}

fn parse_meta(path: &Path, bytes: &[u8]) -> Result<CheckpointMeta> {
    let (_, metadata) = SafeTensors::read_metadata(bytes).map_err(|source| TrainError::Safetensors {
        path: path.to_path_buf(),
        source,
    })?;
    CheckpointMeta::from_metadata(path, metadata.metadata().as_ref())
}

pub fn checkpoint_path(log_dir: impl AsRef<Path>) -> PathBuf {
    log_dir.as_ref().join(CHECKPOINT_FILE)
}
