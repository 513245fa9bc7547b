//! One space S_k(N, chi): its newform orbits and old-space bookkeeping.
//!
//! The old subspace is assembled from newspaces at levels M = N/d for every
//! d > 1 dividing N; each contributes tau(d) copies of S_k^new(M, psi), where
//! psi is chi restricted to modulus M. The result must satisfy
//!
//!   dim S_k(N, chi) = dim S_k^new(N, chi) + sum tau(d) dim S_k^new(M, psi)
//!
//! exactly. A mismatch means the Oracle or the character matching is wrong,
//! and the space is not built.

use crate::arith::{divisors, num_divisors};
use crate::characters::{restrict_to_modulus, DirichletCharacter};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::labels::{label_orbits, SpaceKey};
use crate::oracle::Oracle;
use crate::orbit::OrbitRecord;
use crate::persistence::SpaceSnapshot;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// tau(d) copies of the newspace at a lower level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OldspaceComponent {
    pub source_level: u64,
    pub source_character_index: usize,
    pub multiplicity: u64,
    pub new_dimension: u64,
}

#[derive(Debug)]
pub struct SpaceRecord {
    key: SpaceKey,
    character: DirichletCharacter,
    total_dimension: u64,
    new_dimension: u64,
    oldspace: Vec<OldspaceComponent>,
    orbits: Vec<Arc<OrbitRecord>>,
}

/// The old-space decomposition of S_k(N, chi).
pub fn oldspace_decomposition(
    oracle: &dyn Oracle,
    key: &SpaceKey,
    character: &DirichletCharacter,
) -> Result<Vec<OldspaceComponent>> {
    let mut components = Vec::new();
    for d in divisors(key.level).into_iter().filter(|&d| d > 1) {
        let source_level = key.level / d;
        let table = oracle.characters_of_modulus(source_level)?;
        let Some(source_character_index) = restrict_to_modulus(character, &table, source_level) else {
            continue;
        };
        let source_key = SpaceKey::new(source_level, key.weight, source_character_index);
        let new_dimension = oracle.newspace_dimension(&source_key)?;
        if new_dimension > 0 {
            components.push(OldspaceComponent {
                source_level,
                source_character_index,
                multiplicity: num_divisors(d),
                new_dimension,
            });
        }
    }
    Ok(components)
}

fn check_dimensions(
    key: &SpaceKey,
    total: u64,
    new: u64,
    oldspace: &[OldspaceComponent],
) -> Result<()> {
    let old: u64 = oldspace.iter().map(|c| c.multiplicity * c.new_dimension).sum();
    if new + old != total {
        return Err(CacheError::DimensionConsistency {
            key: *key,
            new,
            old,
            total,
        });
    }
    Ok(())
}

impl SpaceRecord {
    /// Build the space from the Oracle.
    pub fn build(key: SpaceKey, oracle: Arc<dyn Oracle>, config: &CacheConfig) -> Result<Self> {
        let character = oracle
            .characters_of_modulus(key.level)?
            .into_iter()
            .nth(key.character_index)
            .ok_or(CacheError::UnknownCharacter {
                modulus: key.level,
                index: key.character_index,
            })?;

        let total_dimension = oracle.cuspidal_dimension(&key)?;
        let new_dimension = oracle.newspace_dimension(&key)?;
        let oldspace = oldspace_decomposition(oracle.as_ref(), &key, &character)?;
        check_dimensions(&key, total_dimension, new_dimension, &oldspace)?;

        let decomposition = oracle.decompose(&key)?;
        let orbit_total: u64 = decomposition.iter().map(|o| o.dimension).sum();
        if orbit_total != new_dimension {
            log::warn!(
                "Orbits of {} have total dimension {} but the newspace has dimension {}",
                key,
                orbit_total,
                new_dimension
            );
        }
        let labels = label_orbits(&decomposition);
        let orbits = decomposition
            .into_iter()
            .zip(labels)
            .map(|(orbit, label)| {
                Arc::new(OrbitRecord::new(
                    key,
                    label,
                    orbit,
                    character.clone(),
                    Arc::clone(&oracle),
                    config.clone(),
                ))
            })
            .collect::<Vec<_>>();

        log::info!(
            "Built space {}: dim {} (new {}), {} orbits, {} old components",
            key,
            total_dimension,
            new_dimension,
            orbits.len(),
            oldspace.len()
        );
        Ok(SpaceRecord {
            key,
            character,
            total_dimension,
            new_dimension,
            oldspace,
            orbits,
        })
    }

    /// Rebuild a space from a snapshot, without calling the Oracle.
    pub fn from_snapshot(
        snapshot: SpaceSnapshot,
        oracle: Arc<dyn Oracle>,
        config: &CacheConfig,
    ) -> Result<Self> {
        check_dimensions(
            &snapshot.key,
            snapshot.total_dimension,
            snapshot.new_dimension,
            &snapshot.oldspace,
        )?;
        let key = snapshot.key;
        let character = snapshot.character;
        let orbits = snapshot
            .orbits
            .into_iter()
            .map(|o| {
                Arc::new(OrbitRecord::from_snapshot(
                    key,
                    character.clone(),
                    o,
                    Arc::clone(&oracle),
                    config.clone(),
                ))
            })
            .collect();
        Ok(SpaceRecord {
            key,
            character,
            total_dimension: snapshot.total_dimension,
            new_dimension: snapshot.new_dimension,
            oldspace: snapshot.oldspace,
            orbits,
        })
    }

    pub fn to_snapshot(&self) -> SpaceSnapshot {
        SpaceSnapshot {
            key: self.key,
            character: self.character.clone(),
            total_dimension: self.total_dimension,
            new_dimension: self.new_dimension,
            oldspace: self.oldspace.clone(),
            orbits: self.orbits.iter().map(|o| o.to_snapshot()).collect(),
        }
    }

    pub fn key(&self) -> &SpaceKey {
        &self.key
    }

    pub fn character(&self) -> &DirichletCharacter {
        &self.character
    }

    pub fn total_dimension(&self) -> u64 {
        self.total_dimension
    }

    pub fn new_dimension(&self) -> u64 {
        self.new_dimension
    }

    /// Orbits in decomposition order.
    pub fn orbits(&self) -> &[Arc<OrbitRecord>] {
        &self.orbits
    }

    pub fn oldspace(&self) -> &[OldspaceComponent] {
        &self.oldspace
    }

    pub fn orbit(&self, label: &str) -> Result<Arc<OrbitRecord>> {
        self.orbits
            .iter()
            .find(|o| o.label() == label)
            .cloned()
            .ok_or_else(|| CacheError::UnknownOrbit {
                key: self.key,
                label: label.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table_oracle::TableOracle;

    const SAMPLE: &str = include_str!("../data/sample_oracle.json");

    fn sample() -> Arc<TableOracle> {
        Arc::new(TableOracle::from_json(SAMPLE).unwrap())
    }

    #[test]
    fn test_level_39() {
        let oracle = sample();
        let space = SpaceRecord::build(SpaceKey::new(39, 2, 0), oracle.clone(), &CacheConfig::default()).unwrap();
        let labels: Vec<&str> = space.orbits().iter().map(|o| o.label()).collect();
        assert_eq!(labels, vec!["a", "b"]);
        assert_eq!(space.orbits()[1].dimension(), 2);
        assert_eq!(space.total_dimension(), 3);
        assert_eq!(space.new_dimension(), 3);
        // S_2(13) and S_2(3) are both zero.
        assert!(space.oldspace().is_empty());
        assert_eq!(oracle.calls().decompose, 1);
    }

    #[test]
    fn test_oldspace_level_44() {
        let oracle = sample();
        let space = SpaceRecord::build(SpaceKey::new(44, 2, 0), oracle, &CacheConfig::default()).unwrap();
        // Only level 11 contributes, with tau(4) = 3 copies.
        assert_eq!(space.total_dimension(), 4);
        assert_eq!(
            space.oldspace(),
            &[OldspaceComponent {
                source_level: 11,
                source_character_index: 0,
                multiplicity: 3,
                new_dimension: 1,
            }]
        );
    }

    #[test]
    fn test_oldspace_level_176() {
        let oracle = sample();
        let space = SpaceRecord::build(SpaceKey::new(176, 2, 0), oracle, &CacheConfig::default()).unwrap();
        let old: u64 = space
            .oldspace()
            .iter()
            .map(|c| c.multiplicity * c.new_dimension)
            .sum();
        assert_eq!(space.new_dimension() + old, space.total_dimension());
        assert_eq!(space.total_dimension(), 19);
    }

    #[test]
    fn test_dimension_mismatch_is_fatal() {
        let json = r#"{"spaces": [{"level": 11, "weight": 2, "cuspidal_dimension": 2, "new_dimension": 1,
            "orbits": [{"dimension": 1, "prime_eigenvalues": [-2]}]}]}"#;
        let oracle = Arc::new(TableOracle::from_json(json).unwrap());
        let err = SpaceRecord::build(SpaceKey::new(11, 2, 0), oracle.clone(), &CacheConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            CacheError::DimensionConsistency { new: 1, old: 0, total: 2, .. }
        ));
        assert_eq!(oracle.calls().decompose, 0, "nothing is decomposed after a mismatch");
    }

    #[test]
    fn test_unknown_character() {
        let oracle = sample();
        let err = SpaceRecord::build(SpaceKey::new(11, 2, 10), oracle, &CacheConfig::default()).unwrap_err();
        assert!(matches!(err, CacheError::UnknownCharacter { modulus: 11, index: 10 }));
    }

    #[test]
    fn test_missing_space_is_construction_error() {
        let oracle = sample();
        let err = SpaceRecord::build(SpaceKey::new(37, 2, 0), oracle, &CacheConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            CacheError::Oracle(crate::error::OracleError::SpaceConstruction { .. })
        ));
    }

    #[test]
    fn test_nontrivial_character_oldspace() {
        let oracle = sample();
        let space = SpaceRecord::build(SpaceKey::new(7, 3, 3), oracle, &CacheConfig::default()).unwrap();
        // chi_{-7} is primitive, so nothing comes from level 1.
        assert!(space.oldspace().is_empty());
        assert_eq!(space.orbits().len(), 1);
        assert!(space.character().is_quadratic());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let oracle = sample();
        let config = CacheConfig::default();
        let space = SpaceRecord::build(SpaceKey::new(39, 2, 0), oracle.clone(), &config).unwrap();
        let _ = space.orbits()[1].atkin_lehner();
        let snapshot = space.to_snapshot();
        let restored = SpaceRecord::from_snapshot(snapshot.clone(), oracle, &config).unwrap();
        assert_eq!(restored.to_snapshot(), snapshot);
        assert!(restored.orbits()[1].peek(crate::orbit::LazyFieldKind::AtkinLehner).computed().is_some());
    }
}
