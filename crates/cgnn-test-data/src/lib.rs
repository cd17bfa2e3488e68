//! cgnn-test-data
//!
//! Test fixtures for the cgnn crates.
//!
//! Small hand-written JSON-lines datasets are embedded in the crate and exposed as
//! `TestFile` objects, which create temporary files for programs to operate on.
//! Larger datasets are generated on the fly by [`SyntheticDataset`], which writes a
//! full `train/val/test` layout into a temporary directory.
use cgnn_io::{split_path, Split};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use strum::IntoEnumIterator;
use tempfile::{Builder, NamedTempFile, TempDir};

const ELEMENTS: [&str; 5] = ["C", "N", "O", "S", "C"];

#[derive(Debug)]
/// Test File
///
/// Example usage:
///
/// ```ignore
/// // returns (filepath, _tempfile_handle).
/// // _handle ensures the tempfile remains in scope
/// use cgnn_test_data::TestFile;
/// let (psr_file, _temp) = TestFile::psr_01().create_temp().unwrap();
/// ```
pub struct TestFile {
    filebinary: &'static [u8],
    suffix: &'static str,
}

impl TestFile {
    /// Two targets: `T0001` with three decoys and `T0002` with two.
    pub fn psr_01() -> Self {
        Self {
            filebinary: include_bytes!("../data/psr_mini.jsonl"),
            suffix: "jsonl",
        }
    }
    /// Three ligand-pocket complexes, no target groups.
    pub fn lba_01() -> Self {
        Self {
            filebinary: include_bytes!("../data/lba_mini.jsonl"),
            suffix: "jsonl",
        }
    }
    /// Two paired complexes for the siamese model.
    pub fn lba_pairs_01() -> Self {
        Self {
            filebinary: include_bytes!("../data/lba_pairs_mini.jsonl"),
            suffix: "jsonl",
        }
    }
    pub fn contents(&self) -> &'static [u8] {
        self.filebinary
    }
    pub fn create_temp(&self) -> std::io::Result<(String, NamedTempFile)> {
        let temp = Builder::new()
            .suffix(&format!(".{}", self.suffix))
            .tempfile()?;

        fs::write(&temp, self.filebinary)?;
        let path = temp.path().to_string_lossy().into_owned();

        Ok((path, temp))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyntheticKind {
    /// Decoys grouped under targets, label in `[0, 1]`.
    Psr { targets: usize, decoys: usize },
    /// Independent complexes with a `-log(K)`-like label.
    Lba { complexes: usize },
    /// Pairs of complexes labelled by their affinity difference.
    LbaPairs { pairs: usize },
}

/// Seeded generator of small random structure datasets.
///
/// Labels are a smooth function of the geometry so a model can pick up signal
/// within a few epochs.
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    pub kind: SyntheticKind,
    pub min_atoms: usize,
    pub max_atoms: usize,
    pub seed: u64,
}

impl SyntheticDataset {
    pub fn psr(targets: usize, decoys: usize) -> Self {
        Self {
            kind: SyntheticKind::Psr { targets, decoys },
            min_atoms: 3,
            max_atoms: 7,
            seed: 0,
        }
    }
    pub fn lba(complexes: usize) -> Self {
        Self {
            kind: SyntheticKind::Lba { complexes },
            min_atoms: 3,
            max_atoms: 7,
            seed: 0,
        }
    }
    pub fn lba_pairs(pairs: usize) -> Self {
        Self {
            kind: SyntheticKind::LbaPairs { pairs },
            min_atoms: 3,
            max_atoms: 6,
            seed: 0,
        }
    }
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Records for one split; `salt` keeps the splits distinct.
    pub fn records(&self, salt: u64) -> Vec<Value> {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_mul(7919).wrapping_add(salt));
        match self.kind {
            SyntheticKind::Psr { targets, decoys } => (0..targets)
                .flat_map(|t| (0..decoys).map(move |d| (t, d)))
                .map(|(t, d)| {
                    let atoms = self.atoms(&mut rng);
                    let label = 1.0 / (1.0 + radius_of_gyration(&atoms));
                    json!({
                        "id": format!("decoy_{d}"),
                        "target": format!("T{:04}", salt * 1000 + t as u64),
                        "label": label,
                        "atoms": atoms_json(&atoms),
                    })
                })
                .collect(),
            SyntheticKind::Lba { complexes } => (0..complexes)
                .map(|i| {
                    let atoms = self.atoms(&mut rng);
                    json!({
                        "id": format!("c{salt}{i:03}"),
                        "label": affinity(&atoms),
                        "atoms": atoms_json(&atoms),
                    })
                })
                .collect(),
            SyntheticKind::LbaPairs { pairs } => (0..pairs)
                .map(|i| {
                    let first = self.atoms(&mut rng);
                    let second = self.atoms(&mut rng);
                    json!({
                        "id": format!("p{salt}{i:03}"),
                        "label": affinity(&first) - affinity(&second),
                        "first": atoms_json(&first),
                        "second": atoms_json(&second),
                    })
                })
                .collect(),
        }
    }

    /// Writes the record file of `split` under `dir` and returns its path.
    pub fn write_split(&self, dir: &Path, split: Split, salt: u64) -> std::io::Result<PathBuf> {
        let path = split_path(dir, split);
        if let Some(split_dir) = path.parent() {
            fs::create_dir_all(split_dir)?;
        }
        let mut file = fs::File::create(&path)?;
        for record in self.records(salt) {
            writeln!(file, "{record}")?;
        }
        Ok(path)
    }

    /// Materialises `train`, `val` and `test` splits in a fresh temporary directory.
    pub fn create_temp_dir(&self) -> std::io::Result<TempDir> {
        let dir = Builder::new().prefix("cgnn-data").tempdir()?;
        for (salt, split) in Split::iter().enumerate() {
            self.write_split(dir.path(), split, salt as u64 + 1)?;
        }
        Ok(dir)
    }

    fn atoms(&self, rng: &mut StdRng) -> Vec<(&'static str, [f64; 3])> {
        let n = rng.gen_range(self.min_atoms..=self.max_atoms);
        let spread = rng.gen_range(0.8..2.5);
        (0..n)
            .map(|_| {
                let element = ELEMENTS[rng.gen_range(0..ELEMENTS.len())];
                let pos = [
                    rng.gen_range(-spread..spread),
                    rng.gen_range(-spread..spread),
                    rng.gen_range(-spread..spread),
                ];
                (element, pos)
            })
            .collect()
    }
}

fn atoms_json(atoms: &[(&str, [f64; 3])]) -> Value {
    Value::Array(
        atoms
            .iter()
            .map(|(element, [x, y, z])| json!({"element": element, "x": x, "y": y, "z": z}))
            .collect(),
    )
}

fn radius_of_gyration(atoms: &[(&str, [f64; 3])]) -> f64 {
    let n = atoms.len() as f64;
    let mut centroid = [0.0; 3];
    for (_, pos) in atoms {
        for k in 0..3 {
            centroid[k] += pos[k] / n;
        }
    }
    let sq: f64 = atoms
        .iter()
        .map(|(_, pos)| (0..3).map(|k| (pos[k] - centroid[k]).powi(2)).sum::<f64>())
        .sum();
    (sq / n).sqrt()
}

fn affinity(atoms: &[(&str, [f64; 3])]) -> f64 {
    let polar = atoms
        .iter()
        .filter(|(element, _)| matches!(*element, "N" | "O"))
        .count() as f64;
    4.0 + 0.8 * polar - 0.5 * radius_of_gyration(atoms)
}
