use crate::commands;
use crate::logging;
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Mode {
    /// Train, checkpointing the best validation epoch.
    Train,
    /// Train and test three times with fresh seeds.
    Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Task {
    /// Protein structure ranking.
    Psr,
    /// Ligand binding affinity.
    Lba,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ModelKind {
    Gnn,
    Enn,
    EnnSiamese,
}

impl Task {
    pub fn default_model(self) -> ModelKind {
        match self {
            Task::Psr => ModelKind::Gnn,
            Task::Lba => ModelKind::Enn,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Dataset root holding `train/`, `val/` and `test/` splits.
    #[arg(long)]
    pub data_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = Mode::Train)]
    pub mode: Mode,

    #[arg(long, value_enum, default_value_t = Task::Psr)]
    pub task: Task,

    /// Defaults to `gnn` for PSR and `enn` for LBA.
    #[arg(long, value_enum)]
    pub model: Option<ModelKind>,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 64)]
    pub hidden_dim: usize,

    #[arg(long, default_value_t = 20)]
    pub num_epochs: usize,

    #[arg(long, default_value_t = 1e-4)]
    pub learning_rate: f64,

    /// Run directory name under `logs/`; a timestamp when omitted.
    #[arg(long)]
    pub log_dir: Option<String>,

    /// Connect only atoms closer than this many Angstrom. The GNN defaults to 4.5,
    /// the ENN to a complete graph.
    #[arg(long)]
    pub edge_cutoff: Option<f64>,

    /// Keep only the first atoms of each structure.
    #[arg(long)]
    pub max_atoms: Option<usize>,

    /// ENN hyperparameters as JSON.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, default_value_t = 4)]
    pub num_workers: usize,

    /// Run on the CPU even when an accelerator is available.
    #[arg(long)]
    pub cpu: bool,

    /// Show a progress bar during training passes.
    #[arg(long)]
    pub progress: bool,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    pub fn model_kind(&self) -> ModelKind {
        self.model.unwrap_or_else(|| self.task.default_model())
    }

    pub fn execute(self) -> anyhow::Result<()> {
        let run_log = logging::setup_logging(self.verbose, self.quiet)?;
        match self.mode {
            Mode::Train => commands::run::train(&self, &run_log),
            Mode::Test => commands::run::test(&self, &run_log),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["cgnn", "--data-dir", "data"]);
        assert_eq!(cli.mode, Mode::Train);
        assert_eq!(cli.batch_size, 32);
        assert_eq!(cli.hidden_dim, 64);
        assert_eq!(cli.num_epochs, 20);
        assert_eq!(cli.learning_rate, 1e-4);
        assert_eq!(cli.num_workers, 4);
        assert_eq!(cli.model_kind(), ModelKind::Gnn);
        assert_eq!(cli.edge_cutoff, None);
        assert_eq!(cli.max_atoms, None);

        let cli = Cli::parse_from(["cgnn", "--data-dir", "d", "--task", "lba", "-vv", "--mode", "test"]);
        assert_eq!(cli.model_kind(), ModelKind::Enn);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.mode, Mode::Test);
        assert_eq!(ModelKind::EnnSiamese.to_string(), "enn-siamese");
    }

    #[test]
    fn test_graph_flags() {
        let cli = Cli::parse_from(["cgnn", "--data-dir", "d", "--edge-cutoff", "3.5", "--max-atoms", "200"]);
        assert_eq!(cli.edge_cutoff, Some(3.5));
        assert_eq!(cli.max_atoms, Some(200));
        assert!(Cli::try_parse_from(["cgnn", "--data-dir", "d", "--max-atoms", "-1"]).is_err());
    }
}
