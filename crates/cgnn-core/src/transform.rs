//! Record to tensor featurization.
//!
//! A [`Featurizer`] turns one decoded record into a host-side sample and collates
//! a list of samples into a device batch. Featurization runs on loader worker
//! threads, collation on the thread that owns the device.
use crate::batch::{PairBatch, StructureBatch};
use crate::elements::atomic_number;
use crate::error::{CoreError, Result};
use crate::model::LabeledBatch;
use crate::record::{AtomRecord, PairRecord, StructureRecord};
use candle_core::Device;
use serde::de::DeserializeOwned;
use tracing::debug;

pub trait Featurizer: Sync {
    type Record: DeserializeOwned + Send;
    type Sample: Send;
    type Batch: LabeledBatch;

    fn featurize(&self, record: Self::Record) -> Result<Self::Sample>;
    fn collate(&self, samples: Vec<Self::Sample>, device: &Device) -> Result<Self::Batch>;
}

/// Host-side features of one structure.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureSample {
    pub name: String,
    pub label: f32,
    /// Index into the species vocabulary, one per atom.
    pub species: Vec<usize>,
    pub charges: Vec<f32>,
    pub positions: Vec<[f32; 3]>,
}

impl StructureSample {
    pub fn num_atoms(&self) -> usize {
        self.species.len()
    }
}

/// Maps atoms onto a fixed species vocabulary.
///
/// Elements outside the vocabulary share a trailing "other" slot, so the one-hot
/// width is `species.len() + 1`.
#[derive(Debug, Clone)]
pub struct StructureTransform {
    species: Vec<String>,
    edge_cutoff: Option<f64>,
    max_atoms: Option<usize>,
}

impl StructureTransform {
    pub fn new<S: Into<String>>(species: impl IntoIterator<Item = S>) -> Self {
        Self {
            species: species.into_iter().map(Into::into).collect(),
            edge_cutoff: None,
            max_atoms: None,
        }
    }
    /// Ligand and pocket elements of the binding affinity data.
    pub fn ligand_binding() -> Self {
        Self::new(["H", "C", "N", "O", "F", "P", "S", "Cl", "Br", "I"])
    }
    /// Protein heavy atoms.
    pub fn protein() -> Self {
        Self::new(["C", "N", "O", "S"])
    }
    /// Only pairs closer than `cutoff` Angstrom are connected in the edge mask.
    pub fn with_edge_cutoff(mut self, cutoff: f64) -> Self {
        self.edge_cutoff = Some(cutoff);
        self
    }
    /// Structures are truncated to their first `max_atoms` atoms.
    pub fn with_max_atoms(mut self, max_atoms: usize) -> Self {
        self.max_atoms = Some(max_atoms);
        self
    }
    pub fn num_species(&self) -> usize {
        self.species.len() + 1
    }
    pub fn edge_cutoff(&self) -> Option<f64> {
        self.edge_cutoff
    }
    pub fn max_atoms(&self) -> Option<usize> {
        self.max_atoms
    }
    /// Largest atomic number in the vocabulary, the natural charge scale.
    pub fn max_charge(&self) -> f64 {
        self.species
            .iter()
            .filter_map(|s| atomic_number(s))
            .max()
            .unwrap_or(1) as f64
    }
    pub fn species_index(&self, element: &str) -> usize {
        let element = element.trim();
        self.species
            .iter()
            .position(|s| s.eq_ignore_ascii_case(element))
            .unwrap_or(self.species.len())
    }

    pub fn featurize_atoms(
        &self,
        name: String,
        label: f64,
        atoms: &[AtomRecord],
    ) -> Result<StructureSample> {
        let atoms = match self.max_atoms {
            Some(max) if atoms.len() > max => {
                debug!("truncating {} from {} to {} atoms", name, atoms.len(), max);
                &atoms[..max]
            }
            _ => atoms,
        };
        if atoms.is_empty() {
            return Err(CoreError::EmptyStructure { name });
        }
        let species = atoms.iter().map(|a| self.species_index(&a.element)).collect();
        let charges = atoms
            .iter()
            .map(|a| {
                a.charge
                    .or_else(|| atomic_number(&a.element).map(f64::from))
                    .unwrap_or(0.0) as f32
            })
            .collect();
        let positions = atoms
            .iter()
            .map(|a| a.position().map(|c| c as f32))
            .collect();
        Ok(StructureSample {
            name,
            label: label as f32,
            species,
            charges,
            positions,
        })
    }
}

impl Featurizer for StructureTransform {
    type Record = StructureRecord;
    type Sample = StructureSample;
    type Batch = StructureBatch;

    fn featurize(&self, record: StructureRecord) -> Result<StructureSample> {
        let name = record.structure_name();
        self.featurize_atoms(name, record.label, &record.atoms)
    }

    fn collate(&self, samples: Vec<StructureSample>, device: &Device) -> Result<StructureBatch> {
        StructureBatch::from_samples(&samples, self.num_species(), self.edge_cutoff, device)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairSample {
    pub name: String,
    pub label: f32,
    pub first: StructureSample,
    pub second: StructureSample,
}

/// Featurizes both halves of a [`PairRecord`] with the same vocabulary.
#[derive(Debug, Clone)]
pub struct PairTransform {
    pub structure: StructureTransform,
}

impl PairTransform {
    pub fn new(structure: StructureTransform) -> Self {
        Self { structure }
    }
}

impl Featurizer for PairTransform {
    type Record = PairRecord;
    type Sample = PairSample;
    type Batch = PairBatch;

    fn featurize(&self, record: PairRecord) -> Result<PairSample> {
        let first =
            self.structure
                .featurize_atoms(format!("{}:1", record.id), record.label, &record.first)?;
        let second =
            self.structure
                .featurize_atoms(format!("{}:2", record.id), record.label, &record.second)?;
        Ok(PairSample {
            name: record.id,
            label: record.label as f32,
            first,
            second,
        })
    }

    fn collate(&self, samples: Vec<PairSample>, device: &Device) -> Result<PairBatch> {
        PairBatch::from_samples(
            samples,
            self.structure.num_species(),
            self.structure.edge_cutoff(),
            device,
        )
    }
}
