use crate::error::{DataError, Result};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use strum::{Display, EnumIter, EnumString};
use tracing::info;

/// File holding the records of one split inside `<data_dir>/<split>/`.
pub const SPLIT_FILE: &str = "data.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

pub fn split_path(data_dir: impl AsRef<Path>, split: Split) -> PathBuf {
    data_dir.as_ref().join(split.to_string()).join(SPLIT_FILE)
}

/// Indexed, random-access collection of records.
pub trait RecordStore: Sync {
    type Record;

    fn len(&self) -> usize;
    fn get(&self, index: usize) -> Result<Self::Record>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Records stored one JSON document per line.
///
/// The file is read once and line boundaries are indexed up front; records are
/// decoded lazily by [`RecordStore::get`].
#[derive(Debug)]
pub struct JsonlStore<T> {
    path: PathBuf,
    bytes: Vec<u8>,
    /// `(start, end, line number)` of every non-blank line.
    lines: Vec<(usize, usize, usize)>,
    _record: PhantomData<fn() -> T>,
}

impl<T> JsonlStore<T> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = std::fs::read(&path).map_err(|e| DataError::io(&path, e))?;
        let mut lines = Vec::new();
        let mut start = 0;
        let ends = memchr::memchr_iter(b'\n', &bytes).chain(std::iter::once(bytes.len()));
        for (number, end) in ends.enumerate() {
            if start > end {
                break;
            }
            if bytes[start..end].iter().any(|b| !b.is_ascii_whitespace()) {
                lines.push((start, end, number + 1));
            }
            start = end + 1;
        }
        info!("{}: {} records", path.display(), lines.len());
        Ok(Self {
            path,
            bytes,
            lines,
            _record: PhantomData,
        })
    }

    /// Opens `<data_dir>/<split>/data.jsonl`, rejecting empty splits.
    pub fn open_split(data_dir: impl AsRef<Path>, split: Split) -> Result<Self> {
        let store = Self::open(split_path(data_dir, split))?;
        if store.lines.is_empty() {
            return Err(DataError::EmptySplit { path: store.path });
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T: DeserializeOwned> RecordStore for JsonlStore<T> {
    type Record = T;

    fn len(&self) -> usize {
        self.lines.len()
    }

    fn get(&self, index: usize) -> Result<T> {
        let (start, end, line) = *self.lines.get(index).ok_or(DataError::OutOfRange {
            index,
            len: self.lines.len(),
        })?;
        serde_json::from_slice(&self.bytes[start..end]).map_err(|source| DataError::Record {
            path: self.path.clone(),
            line,
            source,
        })
    }
}
