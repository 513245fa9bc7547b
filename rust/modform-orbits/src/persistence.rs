//! Snapshots of spaces and the stores that keep them.
//!
//! A snapshot is plain data: the decomposition, the oldspace bookkeeping and
//! the frozen state of every lazy field. Records are rebuilt from snapshots
//! with `from_snapshot` and written back with `to_snapshot`; loading and
//! re-encoding a snapshot reproduces the same bytes.

use crate::characters::DirichletCharacter;
use crate::cm::CmInfo;
use crate::coefficients::CoefficientSnapshot;
use crate::error::PersistenceError;
use crate::invariants::{CmPointValue, EmbeddingRow, SatakeParameters};
use crate::labels::SpaceKey;
use crate::lazy::LazyField;
use crate::oracle::Orbit;
use crate::space::OldspaceComponent;
use crate::twist::TwistInfo;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrbitSnapshot {
    pub label: String,
    /// Handed back to the Oracle on restore; see [`Orbit::id`].
    pub orbit: Orbit,
    pub coefficients: CoefficientSnapshot,
    pub atkin_lehner: LazyField<BTreeMap<u64, i8>>,
    pub twist: LazyField<TwistInfo>,
    pub cm: LazyField<CmInfo>,
    pub satake: LazyField<SatakeParameters>,
    pub cm_points: LazyField<Vec<CmPointValue>>,
    pub embeddings: LazyField<Vec<EmbeddingRow>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceSnapshot {
    pub key: SpaceKey,
    pub character: DirichletCharacter,
    pub total_dimension: u64,
    pub new_dimension: u64,
    pub oldspace: Vec<OldspaceComponent>,
    pub orbits: Vec<OrbitSnapshot>,
}

pub fn encode(snapshot: &SpaceSnapshot) -> Result<Vec<u8>, PersistenceError> {
    Ok(serde_json::to_vec_pretty(snapshot)?)
}

pub fn decode(bytes: &[u8]) -> Result<SpaceSnapshot, PersistenceError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Where snapshots live between processes.
pub trait Persistence: Send + Sync {
    fn load(&self, key: &SpaceKey) -> Result<Option<SpaceSnapshot>, PersistenceError>;
    fn store(&self, key: &SpaceKey, snapshot: &SpaceSnapshot) -> Result<(), PersistenceError>;
}

/// Keeps encoded snapshots in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<SpaceKey, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// The encoded bytes stored under `key`.
    pub fn raw(&self, key: &SpaceKey) -> Option<Vec<u8>> {
        self.entries.lock().get(key).cloned()
    }

    /// Replace the stored bytes directly.
    pub fn put_raw(&self, key: SpaceKey, bytes: Vec<u8>) {
        self.entries.lock().insert(key, bytes);
    }
}

impl Persistence for MemoryStore {
    fn load(&self, key: &SpaceKey) -> Result<Option<SpaceSnapshot>, PersistenceError> {
        self.entries
            .lock()
            .get(key)
            .map(|bytes| decode(bytes))
            .transpose()
    }

    fn store(&self, key: &SpaceKey, snapshot: &SpaceSnapshot) -> Result<(), PersistenceError> {
        let bytes = encode(snapshot)?;
        self.entries.lock().insert(*key, bytes);
        Ok(())
    }
}

/// One JSON file per space, named `{level}.{weight}.{characterIndex}.json`.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonDirStore { dir: dir.into() }
    }

    pub fn path_for(&self, key: &SpaceKey) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Persistence for JsonDirStore {
    fn load(&self, key: &SpaceKey) -> Result<Option<SpaceSnapshot>, PersistenceError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        let snapshot = decode(&bytes)?;
        log::info!("Loaded snapshot for {} from {}", key, path.display());
        Ok(Some(snapshot))
    }

    fn store(&self, key: &SpaceKey, snapshot: &SpaceSnapshot) -> Result<(), PersistenceError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        std::fs::write(&path, encode(snapshot)?)?;
        log::info!("Saved snapshot for {} to {}", key, path.display());
        Ok(())
    }
}

/// A store that never holds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStore;

impl Persistence for NoStore {
    fn load(&self, _key: &SpaceKey) -> Result<Option<SpaceSnapshot>, PersistenceError> {
        Ok(None)
    }

    fn store(&self, _key: &SpaceKey, _snapshot: &SpaceSnapshot) -> Result<(), PersistenceError> {
        Ok(())
    }
}
