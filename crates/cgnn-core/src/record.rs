//! On-disk structure records.
//!
//! One record per line in a JSON-lines store. Positions are in Angstrom.
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomRecord {
    pub element: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Overrides the atomic number as the atom's charge feature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge: Option<f64>,
}

impl AtomRecord {
    pub fn position(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// A single structure with its regression label.
///
/// Decoys of the structure-ranking task carry the `target` they were generated for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub label: f64,
    pub atoms: Vec<AtomRecord>,
}

impl StructureRecord {
    /// `"{target}/{id}.pdb"` for decoys, the bare id otherwise.
    pub fn structure_name(&self) -> String {
        match &self.target {
            Some(target) => format!("{}/{}.pdb", target, self.id),
            None => self.id.clone(),
        }
    }
}

/// Two structures scored together by a siamese model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairRecord {
    pub id: String,
    pub label: f64,
    pub first: Vec<AtomRecord>,
    pub second: Vec<AtomRecord>,
}

/// Target group of a structure name: the enclosing directory, or the name itself
/// when it has none.
pub fn target_name(structure: &str) -> &str {
    Path::new(structure)
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or(structure)
}
