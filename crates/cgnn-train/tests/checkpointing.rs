use candle_core::{DType, Device, Tensor};
use candle_nn::{Init, VarBuilder, VarMap};
use cgnn_core::{AtomRecord, LabeledBatch, Regressor, StructureBatch, StructureRecord, StructureTransform};
use cgnn_io::{split_path, DataLoader, JsonlStore, Split};
use cgnn_train::{
    read_checkpoint_meta, save_checkpoint, Adam, CheckpointMeta, ParamsAdam, Trainer, TrainerConfig,
    CHECKPOINT_FILE,
};
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};

// Predicted ranks of the validation labels 1..=5. Spearman is 1 - sum(d^2) / 20
// and the validation MSE is sum(d^2) / 5.
const RHO_02: [f32; 5] = [1.0, 4.0, 5.0, 2.0, 3.0];
const RHO_05: [f32; 5] = [1.0, 3.0, 5.0, 2.0, 4.0];
const RHO_03: [f32; 5] = [1.0, 3.0, 5.0, 4.0, 2.0];
const RHO_09: [f32; 5] = [1.0, 2.0, 3.0, 5.0, 4.0];

/// Replays one fixed ranking of the labels per epoch.
struct ScriptedRanker {
    bias: Tensor,
    rankings: Vec<[f32; 5]>,
    epoch: Cell<usize>,
    checkpoint: PathBuf,
    /// Epoch stored in the checkpoint file when each evaluation starts.
    seen: RefCell<Vec<Option<usize>>>,
}

impl ScriptedRanker {
    fn new(varmap: &VarMap, rankings: Vec<[f32; 5]>, log_dir: &Path) -> Self {
        let vb = VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu);
        Self {
            bias: vb.get_with_hints(1, "bias", Init::Const(0.0)).unwrap(),
            rankings,
            epoch: Cell::new(0),
            checkpoint: log_dir.join(CHECKPOINT_FILE),
            seen: RefCell::new(Vec::new()),
        }
    }
}

impl Regressor for ScriptedRanker {
    type Batch = StructureBatch;

    fn forward_t(&self, batch: &StructureBatch, train: bool) -> candle_core::Result<Tensor> {
        let labels = batch.labels();
        if train {
            self.epoch.set(self.epoch.get() + 1);
            return labels.broadcast_add(&self.bias.affine(0.0, 0.0)?);
        }
        self.seen
            .borrow_mut()
            .push(read_checkpoint_meta(&self.checkpoint).ok().map(|meta| meta.epoch));
        let ranking = self.rankings[self.epoch.get().clamp(1, self.rankings.len()) - 1];
        let preds = labels
            .to_vec1::<f32>()?
            .iter()
            .map(|label| ranking[*label as usize - 1])
            .collect::<Vec<_>>();
        Tensor::new(preds, labels.device())
    }
}

fn write_ranked_splits(dir: &Path) {
    for split in [Split::Train, Split::Val] {
        let path = split_path(dir, split);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let lines = (1..=5)
            .map(|i| {
                let record = StructureRecord {
                    id: format!("s{i}"),
                    target: None,
                    label: i as f64,
                    atoms: vec![AtomRecord {
                        element: "C".to_string(),
                        x: i as f64,
                        y: 0.0,
                        z: 0.0,
                        charge: None,
                    }],
                };
                serde_json::to_string(&record).unwrap()
            })
            .collect::<Vec<_>>();
        std::fs::write(path, lines.join("\n")).unwrap();
    }
}

fn loader(dir: &Path, split: Split) -> DataLoader<JsonlStore<StructureRecord>, StructureTransform> {
    let store = JsonlStore::open_split(dir, split).unwrap();
    DataLoader::new(store, StructureTransform::protein(), 8, &Device::Cpu).unwrap()
}

#[test]
fn test_fit_checkpoints_only_on_improvement() {
    let data = tempfile::tempdir().unwrap();
    write_ranked_splits(data.path());
    let logs = tempfile::tempdir().unwrap();

    let varmap = VarMap::new();
    // four more epochs without a better validation loss exceed the patience of 3
    let rankings = vec![RHO_02, RHO_05, RHO_03, RHO_09, RHO_02, RHO_02, RHO_02, RHO_02];
    let model = ScriptedRanker::new(&varmap, rankings, logs.path());
    let mut config = TrainerConfig::new(logs.path());
    config.num_epochs = 8;
    config.learning_rate = 1e-3;
    let mut trainer = Trainer::new(&model, &varmap, config, &Device::Cpu).unwrap();

    let summary = trainer
        .fit(&loader(data.path(), Split::Train), &loader(data.path(), Split::Val))
        .unwrap();

    // the file is rewritten after epochs 1, 2 and 4 and left alone otherwise
    assert_eq!(
        *model.seen.borrow(),
        vec![None, Some(1), Some(2), Some(2), Some(4), Some(4), Some(4), Some(4)]
    );
    let meta = read_checkpoint_meta(logs.path().join(CHECKPOINT_FILE)).unwrap();
    assert_eq!(meta.epoch, 4);
    assert_eq!(meta.step, 4);
    assert!((meta.learning_rate - 1e-3).abs() < 1e-12);

    assert_eq!(summary.best_epoch, Some(4));
    assert_eq!(trainer.best_epoch(), Some(4));
    assert!((summary.best_spearman.unwrap() - 0.9).abs() < 1e-6);
    assert!((summary.best_val_loss - 0.4).abs() < 1e-6);
    assert!((summary.final_learning_rate - 7e-4).abs() < 1e-12);
}

#[test]
fn test_stale_checkpoint_is_not_tested() {
    let data = tempfile::tempdir().unwrap();
    write_ranked_splits(data.path());
    let logs = tempfile::tempdir().unwrap();
    let path = logs.path().join(CHECKPOINT_FILE);

    // an earlier run with another architecture left its best weights behind
    let earlier = VarMap::new();
    let vb = VarBuilder::from_varmap(&earlier, DType::F32, &Device::Cpu);
    let _layer = candle_nn::linear(3, 2, vb.pp("head")).unwrap();
    let optimizer = Adam::from_varmap(&earlier, ParamsAdam::default()).unwrap();
    let meta = CheckpointMeta {
        epoch: 7,
        loss: 0.1,
        learning_rate: 1e-4,
        step: 70,
    };
    save_checkpoint(&path, &earlier, &optimizer, meta).unwrap();

    // constant predictions leave the Spearman correlation undefined
    let varmap = VarMap::new();
    let model = ScriptedRanker::new(&varmap, vec![[3.0; 5]], logs.path());
    let mut config = TrainerConfig::new(logs.path());
    config.num_epochs = 2;
    let mut trainer = Trainer::new(&model, &varmap, config, &Device::Cpu).unwrap();

    let summary = trainer
        .fit(&loader(data.path(), Split::Train), &loader(data.path(), Split::Val))
        .unwrap();
    assert_eq!(summary.best_epoch, None);
    assert_eq!(*model.seen.borrow(), vec![None, None]);
    assert!(!path.exists());

    let evaluation = trainer.test(&loader(data.path(), Split::Val)).unwrap();
    assert_eq!(evaluation.predictions.len(), 5);
    assert_eq!(evaluation.report.all.spearman, None);
    assert_eq!(trainer.best_epoch(), None);
}
