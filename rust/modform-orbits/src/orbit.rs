//! A labelled Galois orbit of newforms with its lazily computed invariants.

use crate::arith::{divisors, euler_phi, primes_up_to};
use crate::characters::DirichletCharacter;
use crate::cm::{self, CmInfo};
use crate::coefficients::CoefficientCache;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::field::FieldElement;
use crate::invariants::{self, CmPointValue, EmbeddingRow, SatakeParameters};
use crate::labels::{FormLabel, SpaceKey};
use crate::lazy::{LazyField, LazySlot};
use crate::numeric::real_embedding_count;
use crate::oracle::{Orbit, Oracle};
use crate::persistence::OrbitSnapshot;
use crate::twist::{self, TwistInfo};
use num_integer::Integer;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The lazily computed fields of an orbit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LazyFieldKind {
    AtkinLehner,
    Twist,
    Cm,
    Satake,
    CmPoints,
    Embeddings,
}

impl LazyFieldKind {
    pub const ALL: [LazyFieldKind; 6] = [
        LazyFieldKind::AtkinLehner,
        LazyFieldKind::Twist,
        LazyFieldKind::Cm,
        LazyFieldKind::Satake,
        LazyFieldKind::CmPoints,
        LazyFieldKind::Embeddings,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LazyFieldKind::AtkinLehner => "atkin_lehner",
            LazyFieldKind::Twist => "twist",
            LazyFieldKind::Cm => "cm",
            LazyFieldKind::Satake => "satake",
            LazyFieldKind::CmPoints => "cm_points",
            LazyFieldKind::Embeddings => "embeddings",
        }
    }
}

/// Value of any lazy field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    AtkinLehner(BTreeMap<u64, i8>),
    Twist(TwistInfo),
    Cm(CmInfo),
    Satake(SatakeParameters),
    CmPoints(Vec<CmPointValue>),
    Embeddings(Vec<EmbeddingRow>),
}

/// Degrees attached to the coefficient field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub field_label: String,
    pub absolute_degree: usize,
    /// Degree of Q(chi), i.e. phi(order of chi).
    pub character_field_degree: u64,
    /// Degree of the coefficient field over Q(chi).
    pub relative_degree: usize,
    pub real_embeddings: usize,
}

pub struct OrbitRecord {
    key: SpaceKey,
    label: String,
    orbit: Orbit,
    character: DirichletCharacter,
    oracle: Arc<dyn Oracle>,
    config: CacheConfig,
    coefficients: Mutex<CoefficientCache>,
    atkin_lehner: LazySlot<BTreeMap<u64, i8>>,
    twist: LazySlot<TwistInfo>,
    cm: LazySlot<CmInfo>,
    satake: LazySlot<SatakeParameters>,
    cm_points: LazySlot<Vec<CmPointValue>>,
    embeddings: LazySlot<Vec<EmbeddingRow>>,
}

impl fmt::Debug for OrbitRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrbitRecord")
            .field("label", &self.full_label().to_string())
            .field("dimension", &self.orbit.dimension)
            .field("field", &self.orbit.field.label())
            .finish_non_exhaustive()
    }
}

impl OrbitRecord {
    pub fn new(
        key: SpaceKey,
        label: String,
        orbit: Orbit,
        character: DirichletCharacter,
        oracle: Arc<dyn Oracle>,
        config: CacheConfig,
    ) -> Self {
        let coefficients = CoefficientCache::new(orbit.clone(), config.working_precision);
        OrbitRecord {
            key,
            label,
            orbit,
            character,
            oracle,
            config,
            coefficients: Mutex::new(coefficients),
            atkin_lehner: LazySlot::new("atkin_lehner"),
            twist: LazySlot::new("twist"),
            cm: LazySlot::new("cm"),
            satake: LazySlot::new("satake"),
            cm_points: LazySlot::new("cm_points"),
            embeddings: LazySlot::new("embeddings"),
        }
    }

    pub fn from_snapshot(
        key: SpaceKey,
        character: DirichletCharacter,
        snapshot: OrbitSnapshot,
        oracle: Arc<dyn Oracle>,
        config: CacheConfig,
    ) -> Self {
        let coefficients = CoefficientCache::from_snapshot(
            snapshot.orbit.clone(),
            config.working_precision,
            snapshot.coefficients,
        );
        OrbitRecord {
            key,
            label: snapshot.label,
            orbit: snapshot.orbit,
            character,
            oracle,
            config,
            coefficients: Mutex::new(coefficients),
            atkin_lehner: LazySlot::from_state("atkin_lehner", snapshot.atkin_lehner),
            twist: LazySlot::from_state("twist", snapshot.twist),
            cm: LazySlot::from_state("cm", snapshot.cm),
            satake: LazySlot::from_state("satake", snapshot.satake),
            cm_points: LazySlot::from_state("cm_points", snapshot.cm_points),
            embeddings: LazySlot::from_state("embeddings", snapshot.embeddings),
        }
    }

    pub fn to_snapshot(&self) -> OrbitSnapshot {
        OrbitSnapshot {
            label: self.label.clone(),
            orbit: self.orbit.clone(),
            coefficients: self.coefficients.lock().to_snapshot(),
            atkin_lehner: self.atkin_lehner.peek(),
            twist: self.twist.peek(),
            cm: self.cm.peek(),
            satake: self.satake.peek(),
            cm_points: self.cm_points.peek(),
            embeddings: self.embeddings.peek(),
        }
    }

    pub fn key(&self) -> &SpaceKey {
        &self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn full_label(&self) -> FormLabel {
        FormLabel {
            key: self.key,
            orbit: self.label.clone(),
        }
    }

    pub fn orbit(&self) -> &Orbit {
        &self.orbit
    }

    /// Dimension of the orbit as reported by the Oracle. With a nontrivial
    /// character this is not the degree of the field over the character
    /// field; see [`OrbitRecord::field_info`].
    pub fn dimension(&self) -> u64 {
        self.orbit.dimension
    }

    pub fn character(&self) -> &DirichletCharacter {
        &self.character
    }

    pub fn oracle(&self) -> &dyn Oracle {
        self.oracle.as_ref()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn field_info(&self) -> FieldInfo {
        let absolute_degree = self.orbit.field.degree();
        let character_field_degree = euler_phi(self.character.order());
        FieldInfo {
            field_label: self.orbit.field.label().to_string(),
            absolute_degree,
            character_field_degree,
            relative_degree: absolute_degree / character_field_degree.max(1) as usize,
            real_embeddings: real_embedding_count(&self.orbit.field),
        }
    }

    pub fn coefficient(&self, n: u64) -> Result<FieldElement> {
        self.coefficients.lock().coefficient(self.oracle.as_ref(), n)
    }

    pub fn coefficients(&self, indices: &[u64]) -> Result<BTreeMap<u64, FieldElement>> {
        self.coefficients.lock().coefficients(self.oracle.as_ref(), indices)
    }

    /// a_0, ..., a_bound.
    pub fn q_expansion(&self, bound: u64) -> Result<Vec<FieldElement>> {
        self.coefficients.lock().q_expansion(self.oracle.as_ref(), bound)
    }

    /// Any lazy field, computed on first access.
    pub fn get(&self, kind: LazyFieldKind) -> LazyField<FieldValue> {
        match kind {
            LazyFieldKind::AtkinLehner => self.atkin_lehner().map(FieldValue::AtkinLehner),
            LazyFieldKind::Twist => self.twist_info().map(FieldValue::Twist),
            LazyFieldKind::Cm => self.cm_info().map(FieldValue::Cm),
            LazyFieldKind::Satake => self.satake_parameters().map(FieldValue::Satake),
            LazyFieldKind::CmPoints => self.cm_point_values().map(FieldValue::CmPoints),
            LazyFieldKind::Embeddings => self.embeddings().map(FieldValue::Embeddings),
        }
    }

    /// State of a lazy field without computing it.
    pub fn peek(&self, kind: LazyFieldKind) -> LazyField<FieldValue> {
        match kind {
            LazyFieldKind::AtkinLehner => self.atkin_lehner.peek().map(FieldValue::AtkinLehner),
            LazyFieldKind::Twist => self.twist.peek().map(FieldValue::Twist),
            LazyFieldKind::Cm => self.cm.peek().map(FieldValue::Cm),
            LazyFieldKind::Satake => self.satake.peek().map(FieldValue::Satake),
            LazyFieldKind::CmPoints => self.cm_points.peek().map(FieldValue::CmPoints),
            LazyFieldKind::Embeddings => self.embeddings.peek().map(FieldValue::Embeddings),
        }
    }

    /// Clear a `Failed` field so the next access computes it again.
    pub fn retry(&self, kind: LazyFieldKind) -> bool {
        let reset = match kind {
            LazyFieldKind::AtkinLehner => self.atkin_lehner.reset_failed(),
            LazyFieldKind::Twist => self.twist.reset_failed(),
            LazyFieldKind::Cm => self.cm.reset_failed(),
            LazyFieldKind::Satake => self.satake.reset_failed(),
            LazyFieldKind::CmPoints => self.cm_points.reset_failed(),
            LazyFieldKind::Embeddings => self.embeddings.reset_failed(),
        };
        if reset {
            log::info!("Retrying {} for {}", kind.name(), self.full_label());
        }
        reset
    }

    /// W_Q eigenvalue for every Q > 1 with Q || N. Empty for nontrivial
    /// characters.
    pub fn atkin_lehner(&self) -> LazyField<BTreeMap<u64, i8>> {
        self.atkin_lehner.get_or_compute(|| {
            let mut signs = BTreeMap::new();
            if !self.character.is_trivial() {
                return Ok(signs);
            }
            let level = self.key.level;
            for q in divisors(level).into_iter().filter(|&q| q > 1) {
                if q.gcd(&(level / q)) != 1 {
                    continue;
                }
                let values = self.oracle.atkin_lehner_eigenvalues(&self.orbit, q)?;
                if values.len() != 1 {
                    return Err(CacheError::AtkinLehnerAmbiguity {
                        q,
                        signs: values.into_iter().collect(),
                    });
                }
                signs.extend(values.into_iter().map(|sign| (q, sign)));
            }
            Ok(signs)
        })
    }

    pub fn twist_info(&self) -> LazyField<TwistInfo> {
        self.twist.get_or_compute(|| twist::detect(self))
    }

    pub fn cm_info(&self) -> LazyField<CmInfo> {
        self.cm.get_or_compute(|| cm::detect(self))
    }

    pub fn satake_parameters(&self) -> LazyField<SatakeParameters> {
        self.satake.get_or_compute(|| {
            let primes: Vec<u64> = primes_up_to(self.config.satake_bound)
                .into_iter()
                .filter(|p| self.key.level % p != 0)
                .collect();
            let values = self.coefficients(&primes)?;
            let prime_coefficients: Vec<(u64, FieldElement)> = values.into_iter().collect();
            invariants::satake_parameters(
                &self.key,
                &self.character,
                &self.orbit.field,
                &prime_coefficients,
            )
        })
    }

    pub fn cm_point_values(&self) -> LazyField<Vec<CmPointValue>> {
        self.cm_points.get_or_compute(|| {
            let expansion = self.q_expansion(self.config.working_precision)?;
            Ok(invariants::cm_point_values(
                self.key.level,
                &self.orbit.field,
                &expansion,
                self.config.cm_point_count,
            ))
        })
    }

    pub fn embeddings(&self) -> LazyField<Vec<EmbeddingRow>> {
        self.embeddings.get_or_compute(|| {
            let expansion = self.q_expansion(self.config.embedding_precision)?;
            Ok(invariants::embedding_table(&self.orbit.field, &expansion[1..]))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::characters::characters_of_modulus;
    use crate::table_oracle::{OracleTable, TableOracle};

    const SAMPLE: &str = include_str!("../data/sample_oracle.json");

    fn record(oracle: &Arc<TableOracle>, key: SpaceKey, i: usize) -> OrbitRecord {
        let orbit = oracle.decompose(&key).unwrap().remove(i);
        let character = characters_of_modulus(key.level).remove(key.character_index);
        let shared: Arc<dyn Oracle> = oracle.clone();
        OrbitRecord::new(
            key,
            crate::labels::orbit_label(i),
            orbit,
            character,
            shared,
            CacheConfig::default(),
        )
    }

    #[test]
    fn test_atkin_lehner_level_39() {
        let oracle = Arc::new(TableOracle::from_json(SAMPLE).unwrap());
        let f = record(&oracle, SpaceKey::new(39, 2, 0), 1);
        let signs = f.atkin_lehner();
        let signs = signs.computed().unwrap();
        assert_eq!(signs.keys().copied().collect::<Vec<_>>(), vec![3, 13, 39]);
        assert_eq!(signs[&3] * signs[&13], signs[&39]);

        // Second access is served from the frozen value.
        let before = oracle.calls().atkin_lehner;
        let _ = f.get(LazyFieldKind::AtkinLehner);
        assert_eq!(oracle.calls().atkin_lehner, before);
    }

    #[test]
    fn test_atkin_lehner_skips_non_exact_divisors() {
        let oracle = Arc::new(TableOracle::from_json(SAMPLE).unwrap());
        let f = record(&oracle, SpaceKey::new(44, 2, 0), 0);
        let signs = f.atkin_lehner();
        // 2 does not exactly divide 44, nor does 22.
        assert_eq!(
            signs.computed().unwrap().keys().copied().collect::<Vec<_>>(),
            vec![4, 11, 44]
        );
    }

    #[test]
    fn test_atkin_lehner_ambiguity_is_failed_state() {
        let json = r#"{"spaces": [{"level": 11, "weight": 2, "orbits": [
            {"dimension": 1, "prime_eigenvalues": [-2, -1, 1, -2, 1],
             "atkin_lehner": {"11": [-1, 1]}}]}]}"#;
        let table: OracleTable = serde_json::from_str(json).unwrap();
        let oracle = Arc::new(TableOracle::from_table(table).unwrap());
        let f = record(&oracle, SpaceKey::new(11, 2, 0), 0);

        let state = f.get(LazyFieldKind::AtkinLehner);
        match state {
            LazyField::Failed(reason) => assert!(reason.contains("W_11"), "reason: {}", reason),
            other => panic!("expected a failed field, got {:?}", other),
        }
        assert_eq!(oracle.calls().atkin_lehner, 1);
        // Failed is frozen too.
        assert!(f.get(LazyFieldKind::AtkinLehner).is_failed());
        assert_eq!(oracle.calls().atkin_lehner, 1);
        // The orbit stays usable.
        assert!(f.coefficient(2).is_ok());

        assert!(f.retry(LazyFieldKind::AtkinLehner));
        assert!(f.get(LazyFieldKind::AtkinLehner).is_failed());
        assert_eq!(oracle.calls().atkin_lehner, 2);
    }

    #[test]
    fn test_nontrivial_character_has_no_atkin_lehner_calls() {
        let oracle = Arc::new(TableOracle::from_json(SAMPLE).unwrap());
        let f = record(&oracle, SpaceKey::new(7, 3, 3), 0);
        assert_eq!(f.atkin_lehner(), LazyField::Computed(BTreeMap::new()));
        assert_eq!(oracle.calls().atkin_lehner, 0);
    }

    #[test]
    fn test_field_info() {
        let oracle = Arc::new(TableOracle::from_json(SAMPLE).unwrap());
        let f = record(&oracle, SpaceKey::new(39, 2, 0), 1);
        let info = f.field_info();
        assert_eq!(info.absolute_degree, 2);
        assert_eq!(info.character_field_degree, 1);
        assert_eq!(info.relative_degree, 2);
        assert_eq!(info.real_embeddings, 2);
    }

    #[test]
    fn test_dimension_is_not_the_relative_degree() {
        let json = r#"{"spaces": [{"level": 9, "weight": 2, "character_index": 4, "orbits": [
            {"dimension": 2, "field": {"kind": "cyclotomic", "order": 3},
             "prime_eigenvalues": [[0, 1], 0, [-1, -1], 1]}]}]}"#;
        let table: OracleTable = serde_json::from_str(json).unwrap();
        let oracle = Arc::new(TableOracle::from_table(table).unwrap());
        let f = record(&oracle, SpaceKey::new(9, 2, 4), 0);
        let info = f.field_info();
        assert_eq!(f.dimension(), 2);
        assert_eq!(info.absolute_degree, 2);
        assert_eq!(info.character_field_degree, 2);
        assert_eq!(info.relative_degree, 1);
    }

    #[test]
    fn test_numeric_fields() {
        let oracle = Arc::new(TableOracle::from_json(SAMPLE).unwrap());
        let f = record(&oracle, SpaceKey::new(11, 2, 0), 0);

        let satake = f.satake_parameters();
        let satake = satake.computed().unwrap();
        assert!(!satake.contains_key(&11));
        assert!(satake.contains_key(&97));

        let embeddings = f.embeddings();
        let rows = embeddings.computed().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].coefficients.len(), 10);
        assert_eq!(rows[0].coefficients[1].re, -2.0);

        let points = f.cm_point_values();
        let points = points.computed().unwrap();
        assert_eq!(points.len(), 3);
        assert!(points.iter().all(|p| p.values.len() == 1 && p.values[0].norm().is_finite()));
    }
}
