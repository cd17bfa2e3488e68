use crate::cli::{Cli, ModelKind, Task};
use crate::logging::RunLog;
use anyhow::{bail, Context, Result};
use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use cgnn_core::{Featurizer, PairTransform, Regressor, StructureTransform};
use cgnn_io::{DataLoader, JsonlStore, Split};
use cgnn_models::{
    num_parameters, reinitialize, Enn, GnnConfig, GnnPsr, RawEnnConfig, Siamese, SiameseHead, WeightInit,
};
use cgnn_train::{FitSummary, Trainer, TrainerConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use tracing::info;

const LOGS_ROOT: &str = "logs";
const NUM_TEST_SEEDS: usize = 3;
/// Angstrom; the GNN works on a distance graph rather than a complete one.
const GNN_EDGE_CUTOFF: f64 = 4.5;

pub fn train(cli: &Cli, run_log: &RunLog) -> Result<()> {
    let name = cli
        .log_dir
        .clone()
        .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d-%H-%M-%S").to_string());
    let log_dir = prepare_log_dir(Path::new(LOGS_ROOT).join(name), run_log)?;
    run(cli, &log_dir, cli.seed.unwrap_or(0), false)?;
    Ok(())
}

pub fn test(cli: &Cli, run_log: &RunLog) -> Result<()> {
    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let seeds = (0..NUM_TEST_SEEDS)
        .map(|_| rng.gen_range(0..1000u64))
        .collect::<Vec<_>>();
    for seed in seeds {
        info!("seed: {seed}");
        let log_dir = prepare_log_dir(Path::new(LOGS_ROOT).join(format!("test_{seed}")), run_log)?;
        run(cli, &log_dir, seed, true)?;
    }
    Ok(())
}

fn prepare_log_dir(log_dir: PathBuf, run_log: &RunLog) -> Result<PathBuf> {
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;
    run_log.attach(&log_dir.join("train.log"))?;
    info!("logging to {}", log_dir.display());
    Ok(log_dir)
}

fn structure_transform(cli: &Cli) -> StructureTransform {
    let mut transform = match cli.task {
        Task::Psr => StructureTransform::protein(),
        Task::Lba => StructureTransform::ligand_binding(),
    };
    let edge_cutoff = cli
        .edge_cutoff
        .or((cli.model_kind() == ModelKind::Gnn).then_some(GNN_EDGE_CUTOFF));
    if let Some(cutoff) = edge_cutoff {
        info!("edge cutoff {cutoff} A");
        transform = transform.with_edge_cutoff(cutoff);
    }
    if let Some(max_atoms) = cli.max_atoms {
        transform = transform.with_max_atoms(max_atoms);
    }
    transform
}

fn enn_config(cli: &Cli) -> Result<RawEnnConfig> {
    match &cli.config {
        Some(path) => RawEnnConfig::from_json_file(path)
            .with_context(|| format!("reading ENN config {}", path.display())),
        None => Ok(RawEnnConfig::default()),
    }
}

/// Builds the requested model and runs one seeded training run in `log_dir`.
fn run(cli: &Cli, log_dir: &Path, seed: u64, test_mode: bool) -> Result<FitSummary> {
    let device = cgnn_core::device(cli.cpu)?;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let transform = structure_transform(cli);
    info!("task {}, model {}, seed {}", cli.task, cli.model_kind(), seed);

    match cli.model_kind() {
        ModelKind::Gnn => {
            let config = GnnConfig::new(transform.num_species(), cli.hidden_dim);
            let model = GnnPsr::new(&config, vb)?;
            reinitialize(&varmap, WeightInit::Rand, seed)?;
            fit_model(cli, &model, &varmap, transform, log_dir, seed, test_mode, &device)
        }
        ModelKind::Enn => {
            let config = enn_config(cli)?.resolve(transform.num_species(), transform.max_charge())?;
            let model = Enn::new(&config, 1, vb)?;
            reinitialize(&varmap, config.weight_init, seed)?;
            fit_model(cli, &model, &varmap, transform, log_dir, seed, test_mode, &device)
        }
        ModelKind::EnnSiamese => {
            if cli.task != Task::Lba {
                bail!("the siamese model needs paired records and is only available for --task lba");
            }
            let config = enn_config(cli)?.resolve(transform.num_species(), transform.max_charge())?;
            let enn = Enn::new(&config, config.siamese_embedding, vb.pp("enn"))?;
            let head = SiameseHead::new(
                config.siamese_head,
                config.siamese_embedding,
                config.num_mixed,
                vb.pp("head"),
            )?;
            let model = Siamese::new(enn, head);
            reinitialize(&varmap, config.weight_init, seed)?;
            let transform = PairTransform::new(transform);
            fit_model(cli, &model, &varmap, transform, log_dir, seed, test_mode, &device)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn fit_model<M, F>(
    cli: &Cli,
    model: &M,
    varmap: &VarMap,
    featurizer: F,
    log_dir: &Path,
    seed: u64,
    test_mode: bool,
    device: &Device,
) -> Result<FitSummary>
where
    M: Regressor,
    F: Featurizer<Batch = M::Batch> + Clone,
{
    info!("{} parameters", num_parameters(varmap));
    let loader = |split: Split| -> Result<DataLoader<JsonlStore<F::Record>, F>> {
        let store = JsonlStore::open_split(&cli.data_dir, split)
            .with_context(|| format!("loading {split} split"))?;
        Ok(DataLoader::new(store, featurizer.clone(), cli.batch_size, device)?
            .with_num_workers(cli.num_workers)?)
    };
    let train_loader = loader(Split::Train)?.with_shuffle(seed);
    let val_loader = loader(Split::Val)?;

    let mut config = TrainerConfig::new(log_dir);
    config.num_epochs = cli.num_epochs;
    config.learning_rate = cli.learning_rate;
    config.progress = cli.progress && !cli.quiet;
    let mut trainer = Trainer::new(model, varmap, config, device)?;

    let summary = trainer.fit(&train_loader, &val_loader)?;
    info!(
        "best validation spearman {:?} at epoch {:?}",
        summary.best_spearman, summary.best_epoch
    );
    if test_mode {
        let test_loader = loader(Split::Test)?;
        trainer.test(&test_loader)?;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(["cgnn", "--data-dir", "d"].into_iter().chain(args.iter().copied()))
    }

    #[test]
    fn test_structure_transform_graph_options() {
        let transform = structure_transform(&cli(&[]));
        assert_eq!(transform.edge_cutoff(), Some(GNN_EDGE_CUTOFF));
        assert_eq!(transform.max_atoms(), None);

        let transform = structure_transform(&cli(&["--task", "lba"]));
        assert_eq!(transform.edge_cutoff(), None);

        let transform = structure_transform(&cli(&["--edge-cutoff", "6", "--max-atoms", "300"]));
        assert_eq!(transform.edge_cutoff(), Some(6.0));
        assert_eq!(transform.max_atoms(), Some(300));
        assert_eq!(transform.num_species(), 5);
    }
}
