//! Process-wide get-or-build access to spaces.
//!
//! Each key has its own slot lock, so two requests for the same space wait on
//! one construction while other spaces proceed. A stored snapshot is read
//! once, the first time its key is requested; a snapshot that cannot be read
//! or fails the dimension check is logged and the space is rebuilt.

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::labels::{FormLabel, SpaceKey};
use crate::oracle::Oracle;
use crate::orbit::OrbitRecord;
use crate::persistence::Persistence;
use crate::space::SpaceRecord;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

type Slot = Arc<Mutex<Option<Arc<SpaceRecord>>>>;

pub struct SpaceRegistry {
    oracle: Arc<dyn Oracle>,
    store: Arc<dyn Persistence>,
    config: CacheConfig,
    slots: Mutex<HashMap<SpaceKey, Slot>>,
}

impl SpaceRegistry {
    pub fn new(oracle: Arc<dyn Oracle>, store: Arc<dyn Persistence>, config: CacheConfig) -> Self {
        SpaceRegistry {
            oracle,
            store,
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn slot(&self, key: SpaceKey) -> Slot {
        Arc::clone(self.slots.lock().entry(key).or_default())
    }

    fn load_or_build(&self, key: SpaceKey) -> Result<SpaceRecord> {
        match self.store.load(&key) {
            Ok(Some(snapshot)) => {
                if snapshot.key != key {
                    log::warn!("Snapshot for {} is keyed {}, rebuilding", key, snapshot.key);
                } else {
                    match SpaceRecord::from_snapshot(snapshot, Arc::clone(&self.oracle), &self.config) {
                        Ok(space) => {
                            log::info!("Restored space {} from snapshot", key);
                            return Ok(space);
                        }
                        Err(e) => log::warn!("Snapshot for {} rejected: {}, rebuilding", key, e),
                    }
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("Failed to load snapshot for {}: {}, rebuilding", key, e),
        }
        SpaceRecord::build(key, Arc::clone(&self.oracle), &self.config)
    }

    /// The space for `key`, built at most once per process.
    pub fn space(&self, key: SpaceKey) -> Result<Arc<SpaceRecord>> {
        let slot = self.slot(key);
        let mut guard = slot.lock();
        if let Some(space) = guard.as_ref() {
            return Ok(Arc::clone(space));
        }
        let space = Arc::new(self.load_or_build(key)?);
        *guard = Some(Arc::clone(&space));
        Ok(space)
    }

    /// The orbit named by a full label `{level}.{weight}.{characterIndex}.{label}`.
    pub fn orbit(&self, label: &str) -> Result<Arc<OrbitRecord>> {
        let label: FormLabel = label.parse()?;
        self.space(label.key)?.orbit(&label.orbit)
    }

    /// Write the current state of a space, including frozen lazy fields.
    pub fn persist(&self, key: SpaceKey) -> Result<()> {
        let space = self.space(key)?;
        self.store
            .store(&key, &space.to_snapshot())
            .map_err(CacheError::from)
    }

    /// Persist every space built so far.
    pub fn persist_all(&self) -> Result<usize> {
        let keys: Vec<SpaceKey> = {
            let slots = self.slots.lock();
            slots
                .iter()
                .filter(|(_, slot)| slot.lock().is_some())
                .map(|(key, _)| *key)
                .collect()
        };
        for key in &keys {
            self.persist(*key)?;
        }
        Ok(keys.len())
    }
}
