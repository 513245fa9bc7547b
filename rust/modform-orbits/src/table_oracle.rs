//! An [`Oracle`] backed by precomputed tables.
//!
//! Tables list, per space, the orbit decomposition with Hecke eigenvalues at
//! the first primes and Atkin-Lehner signs. Coefficients at prime powers come
//! from the Hecke recursion
//!   a(p^{e+1}) = a(p) a(p^e) - chi(p) p^{k-1} a(p^{e-1})     (p not dividing N)
//!   a(p^e)     = a(p)^e                                     (p dividing N)
//! and composite indices from multiplicativity. Weight-2 spaces with trivial
//! character that the table leaves out fall back to the genus formula.
//!
//! Every trait method is counted, so callers can check how often the cache
//! actually reaches the Oracle.

use crate::arith::{dim_s2, dim_s2_new, factor_u64, is_prime};
use crate::characters::{characters_of_modulus, DirichletCharacter};
use crate::error::{CacheError, FieldError, OracleError, PersistenceError};
use crate::field::{FieldElement, NumberField};
use crate::labels::SpaceKey;
use crate::oracle::{Orbit, Oracle};
use num_bigint::BigInt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// On-disk table format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OracleTable {
    pub spaces: Vec<SpaceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceEntry {
    pub level: u64,
    pub weight: u64,
    #[serde(default)]
    pub character_index: usize,
    #[serde(default)]
    pub cuspidal_dimension: Option<u64>,
    #[serde(default)]
    pub new_dimension: Option<u64>,
    #[serde(default)]
    pub orbits: Vec<OrbitEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrbitEntry {
    pub dimension: u64,
    #[serde(default)]
    pub field: FieldSpec,
    /// a_p for the first primes 2, 3, 5, ... in order.
    pub prime_eigenvalues: Vec<ElementSpec>,
    #[serde(default)]
    pub atkin_lehner: BTreeMap<u64, Vec<i8>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldSpec {
    #[default]
    Rational,
    Cyclotomic {
        order: u64,
    },
    Generic {
        label: String,
        modulus: Vec<i64>,
        totally_real: bool,
    },
}

impl FieldSpec {
    fn build(&self) -> Result<Arc<NumberField>, FieldError> {
        match self {
            FieldSpec::Rational => Ok(NumberField::rational()),
            FieldSpec::Cyclotomic { order } => Ok(NumberField::cyclotomic(*order)),
            FieldSpec::Generic {
                label,
                modulus,
                totally_real,
            } => NumberField::generic(label, modulus, *totally_real),
        }
    }
}

/// A field element written as an integer, power-basis coordinates, or a fraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ElementSpec {
    Integer(i64),
    Coordinates(Vec<i64>),
    Fraction { coords: Vec<i64>, den: i64 },
}

impl ElementSpec {
    fn build(&self, field: &Arc<NumberField>) -> Result<FieldElement, FieldError> {
        match self {
            ElementSpec::Integer(n) => Ok(FieldElement::from_int(field, *n)),
            ElementSpec::Coordinates(coords) => Ok(FieldElement::from_integers(field, coords)),
            ElementSpec::Fraction { coords, den } => FieldElement::from_fraction(
                field,
                coords.iter().map(|&c| BigInt::from(c)).collect(),
                BigInt::from(*den),
            ),
        }
    }
}

/// Snapshot of how many times each Oracle method was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub decompose: usize,
    pub cuspidal_dimension: usize,
    pub newspace_dimension: usize,
    pub eigenvalues_at_primes: usize,
    pub eigenvalue_at: usize,
    pub characters_of_modulus: usize,
    pub atkin_lehner: usize,
}

#[derive(Debug, Default)]
struct CallCounters {
    decompose: AtomicUsize,
    cuspidal_dimension: AtomicUsize,
    newspace_dimension: AtomicUsize,
    eigenvalues_at_primes: AtomicUsize,
    eigenvalue_at: AtomicUsize,
    characters_of_modulus: AtomicUsize,
    atkin_lehner: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug)]
struct StoredSpace {
    cuspidal_dimension: Option<u64>,
    new_dimension: Option<u64>,
    orbit_ids: Vec<u64>,
}

#[derive(Debug)]
struct StoredOrbit {
    key: SpaceKey,
    orbit: Orbit,
    primes: Vec<u64>,
    eigenvalues: Vec<FieldElement>,
    atkin_lehner: BTreeMap<u64, BTreeSet<i8>>,
}

/// Table-driven Oracle. Orbit ids are positions in the table, so every
/// instance loaded from the same table issues the same handles.
#[derive(Debug)]
pub struct TableOracle {
    spaces: BTreeMap<SpaceKey, StoredSpace>,
    orbits: Vec<StoredOrbit>,
    characters: Mutex<HashMap<u64, Vec<DirichletCharacter>>>,
    calls: CallCounters,
}

impl TableOracle {
    pub fn from_table(table: OracleTable) -> Result<Self, CacheError> {
        let mut spaces = BTreeMap::new();
        let mut orbits = Vec::new();
        for entry in table.spaces {
            let key = SpaceKey::new(entry.level, entry.weight, entry.character_index);
            let mut orbit_ids = Vec::with_capacity(entry.orbits.len());
            for orbit_entry in &entry.orbits {
                let field = orbit_entry.field.build()?;
                let eigenvalues = orbit_entry
                    .prime_eigenvalues
                    .iter()
                    .map(|e| e.build(&field))
                    .collect::<Result<Vec<_>, _>>()?;
                let primes: Vec<u64> = (2u64..).filter(|&n| is_prime(n)).take(eigenvalues.len()).collect();
                let id = orbits.len() as u64;
                orbit_ids.push(id);
                orbits.push(StoredOrbit {
                    key,
                    orbit: Orbit {
                        id,
                        dimension: orbit_entry.dimension,
                        field,
                    },
                    primes,
                    eigenvalues,
                    atkin_lehner: orbit_entry
                        .atkin_lehner
                        .iter()
                        .map(|(&q, signs)| (q, signs.iter().copied().collect()))
                        .collect(),
                });
            }
            let stored = StoredSpace {
                cuspidal_dimension: entry.cuspidal_dimension,
                new_dimension: entry.new_dimension,
                orbit_ids,
            };
            if spaces.insert(key, stored).is_some() {
                log::warn!("Oracle table lists space {} twice; keeping the last entry", key);
            }
        }
        log::debug!("Loaded oracle table with {} spaces, {} orbits", spaces.len(), orbits.len());
        Ok(TableOracle {
            spaces,
            orbits,
            characters: Mutex::new(HashMap::new()),
            calls: CallCounters::default(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, CacheError> {
        let table: OracleTable = serde_json::from_str(json).map_err(PersistenceError::from)?;
        TableOracle::from_table(table)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, CacheError> {
        let contents = std::fs::read_to_string(path).map_err(PersistenceError::from)?;
        TableOracle::from_json(&contents)
    }

    /// Calls made so far.
    pub fn calls(&self) -> CallCounts {
        let c = &self.calls;
        CallCounts {
            decompose: c.decompose.load(Ordering::Relaxed),
            cuspidal_dimension: c.cuspidal_dimension.load(Ordering::Relaxed),
            newspace_dimension: c.newspace_dimension.load(Ordering::Relaxed),
            eigenvalues_at_primes: c.eigenvalues_at_primes.load(Ordering::Relaxed),
            eigenvalue_at: c.eigenvalue_at.load(Ordering::Relaxed),
            characters_of_modulus: c.characters_of_modulus.load(Ordering::Relaxed),
            atkin_lehner: c.atkin_lehner.load(Ordering::Relaxed),
        }
    }

    /// (total, new) from the genus formula, for weight 2 and trivial character.
    fn formula_dimensions(key: &SpaceKey) -> Option<(u64, u64)> {
        if key.weight == 2 && key.character_index == 0 {
            Some((dim_s2(key.level), dim_s2_new(key.level)))
        } else {
            None
        }
    }

    fn stored_orbit(&self, orbit: &Orbit) -> Result<&StoredOrbit, OracleError> {
        self.orbits
            .get(orbit.id as usize)
            .ok_or(OracleError::UnknownOrbit(orbit.id))
    }

    fn cached_characters(&self, modulus: u64) -> Vec<DirichletCharacter> {
        self.characters
            .lock()
            .entry(modulus)
            .or_insert_with(|| characters_of_modulus(modulus))
            .clone()
    }

    fn prime_coefficient(&self, stored: &StoredOrbit, p: u64) -> Result<FieldElement, OracleError> {
        match stored.primes.binary_search(&p) {
            Ok(i) => Ok(stored.eigenvalues[i].clone()),
            Err(_) => Err(OracleError::PrecisionExceeded {
                orbit: stored.orbit.id,
                index: p,
            }),
        }
    }

    fn prime_power_coefficient(
        &self,
        stored: &StoredOrbit,
        p: u64,
        e: u32,
    ) -> Result<FieldElement, OracleError> {
        let arith = |err: FieldError| OracleError::Arithmetic(err.to_string());
        let ap = self.prime_coefficient(stored, p)?;
        if e == 1 {
            return Ok(ap);
        }
        if stored.key.level % p == 0 {
            return ap.pow(e as u64).map_err(arith);
        }
        let field = &stored.orbit.field;
        let characters = self.cached_characters(stored.key.level);
        let chi = characters
            .get(stored.key.character_index)
            .ok_or_else(|| OracleError::MissingData(format!("character {}", stored.key)))?;
        let chi_p = chi
            .value_at(p)
            .ok_or_else(|| OracleError::Arithmetic(format!("chi({}) vanishes for p prime to the level", p)))?;
        let hecke_term = field
            .root_of_unity(chi_p)
            .map_err(arith)?
            .scale(&BigInt::from(p).pow((stored.key.weight - 1) as u32));

        let mut prev = FieldElement::one(field);
        let mut cur = ap.clone();
        for _ in 1..e {
            let next = ap
                .checked_mul(&cur)
                .and_then(|x| x.checked_sub(&hecke_term.checked_mul(&prev)?))
                .map_err(arith)?;
            prev = cur;
            cur = next;
        }
        Ok(cur)
    }

    fn coefficient(&self, stored: &StoredOrbit, n: u64) -> Result<FieldElement, OracleError> {
        let field = &stored.orbit.field;
        if n == 0 {
            return Ok(FieldElement::zero(field));
        }
        let mut value = FieldElement::one(field);
        for (p, e) in factor_u64(n) {
            let part = self.prime_power_coefficient(stored, p, e)?;
            value = value
                .checked_mul(&part)
                .map_err(|err| OracleError::Arithmetic(err.to_string()))?;
        }
        Ok(value)
    }
}

impl Oracle for TableOracle {
    fn decompose(&self, key: &SpaceKey) -> Result<Vec<Orbit>, OracleError> {
        bump(&self.calls.decompose);
        match self.spaces.get(key) {
            Some(space) => Ok(space
                .orbit_ids
                .iter()
                .map(|&id| self.orbits[id as usize].orbit.clone())
                .collect()),
            None => match TableOracle::formula_dimensions(key) {
                Some((_, 0)) => Ok(Vec::new()),
                _ => Err(OracleError::SpaceConstruction {
                    key: *key,
                    reason: "no decomposition data".to_string(),
                }),
            },
        }
    }

    fn cuspidal_dimension(&self, key: &SpaceKey) -> Result<u64, OracleError> {
        bump(&self.calls.cuspidal_dimension);
        self.spaces
            .get(key)
            .and_then(|s| s.cuspidal_dimension)
            .or_else(|| TableOracle::formula_dimensions(key).map(|(total, _)| total))
            .ok_or_else(|| OracleError::SpaceConstruction {
                key: *key,
                reason: "no dimension data".to_string(),
            })
    }

    fn newspace_dimension(&self, key: &SpaceKey) -> Result<u64, OracleError> {
        bump(&self.calls.newspace_dimension);
        let formula = TableOracle::formula_dimensions(key).map(|(_, new)| new);
        Ok(match self.spaces.get(key) {
            Some(space) => space.new_dimension.or(formula).unwrap_or_else(|| {
                space
                    .orbit_ids
                    .iter()
                    .map(|&id| self.orbits[id as usize].orbit.dimension)
                    .sum()
            }),
            None => formula.unwrap_or(0),
        })
    }

    fn eigenvalues_at_primes(
        &self,
        orbit: &Orbit,
        primes: &[u64],
    ) -> Result<Vec<FieldElement>, OracleError> {
        bump(&self.calls.eigenvalues_at_primes);
        let stored = self.stored_orbit(orbit)?;
        primes
            .iter()
            .map(|&p| self.prime_coefficient(stored, p))
            .collect()
    }

    fn eigenvalue_at(&self, orbit: &Orbit, n: u64) -> Result<FieldElement, OracleError> {
        bump(&self.calls.eigenvalue_at);
        let stored = self.stored_orbit(orbit)?;
        self.coefficient(stored, n)
    }

    fn characters_of_modulus(&self, modulus: u64) -> Result<Vec<DirichletCharacter>, OracleError> {
        bump(&self.calls.characters_of_modulus);
        if modulus == 0 {
            return Err(OracleError::MissingData("characters of modulus 0".to_string()));
        }
        Ok(self.cached_characters(modulus))
    }

    fn atkin_lehner_eigenvalues(&self, orbit: &Orbit, q: u64) -> Result<BTreeSet<i8>, OracleError> {
        bump(&self.calls.atkin_lehner);
        let stored = self.stored_orbit(orbit)?;
        stored
            .atkin_lehner
            .get(&q)
            .cloned()
            .ok_or_else(|| OracleError::MissingData(format!("W_{} on orbit {}", q, orbit.id)))
    }
}
