//! Twist-minimality search.
//!
//! An orbit f of level N is a twist of a lower-level newform g when
//! a_g(p) / chi(p) = a_f(p) for a Dirichlet character chi mod d with d^2 | N
//! and g of level N / d^2. Twisting only raises the level at square factors,
//! so squarefree levels are minimal without any search.
//!
//! Candidates are compared prime by prime up to the Sturm bound of the space
//! plus the number of divisors of N, over primes not dividing N. Comparisons
//! happen in the coefficient field of f first, then in that of g. A pair of
//! failed conversions where neither proves inequality is recorded as an
//! ambiguous comparison instead of being read as a rejection.

use crate::arith::{divisors, is_squarefree, prime_check_bound, primes_up_to};
use crate::characters::{DirichletCharacter, RootOfUnity};
use crate::coefficients::CoefficientCache;
use crate::error::{CacheError, FieldError, Result};
use crate::field::FieldElement;
use crate::labels::{orbit_label, FormLabel, SpaceKey};
use crate::oracle::{Orbit, Oracle};
use crate::orbit::OrbitRecord;
use num_integer::Integer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A lower-level newform that twists into the orbit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwistCandidate {
    pub source_level: u64,
    /// Full label of the source orbit.
    pub source_label: String,
    pub source_character_index: usize,
    /// a_0, ..., a_P of the source form.
    pub q_expansion: Vec<FieldElement>,
    pub twisting_character: DirichletCharacter,
}

/// A candidate that could be neither accepted nor rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousComparison {
    pub source_label: String,
    pub twisting_character: String,
    pub prime: u64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TwistInfo {
    Minimal,
    /// Accepted candidates in enumeration order; the first is the preferred
    /// minimal form.
    TwistOf {
        candidates: Vec<TwistCandidate>,
        ambiguous: Vec<AmbiguousComparison>,
    },
    /// Nothing accepted, but some candidates could not be compared.
    Inconclusive { ambiguous: Vec<AmbiguousComparison> },
}

impl TwistInfo {
    pub fn is_minimal(&self) -> bool {
        matches!(self, TwistInfo::Minimal)
    }

    pub fn candidates(&self) -> &[TwistCandidate] {
        match self {
            TwistInfo::TwistOf { candidates, .. } => candidates,
            _ => &[],
        }
    }
}

/// Progress of one candidate through the prime list.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Scan {
    Scanning,
    Rejected,
    Accepted,
    Ambiguous { prime: u64, reason: String },
}

/// a_g(p) * chi(p)^{-1} == a_f(p), evaluated inside one target field.
fn compare_in(
    target: &FieldElement,
    a_f: &FieldElement,
    a_g: &FieldElement,
    chi_inv: RootOfUnity,
) -> std::result::Result<bool, FieldError> {
    let field = target.field();
    let lhs = field.convert(a_g)?.checked_mul(&field.root_of_unity(chi_inv)?)?;
    let rhs = field.convert(a_f)?;
    Ok(lhs == rhs)
}

/// One step of the scan at prime p.
fn step(a_f: &FieldElement, a_g: &FieldElement, chi: &DirichletCharacter, p: u64) -> Result<Scan> {
    match (a_f.is_zero(), a_g.is_zero()) {
        (true, true) => return Ok(Scan::Scanning),
        (true, false) | (false, true) => return Ok(Scan::Rejected),
        _ => {}
    }
    let chi_p = chi.value_at(p).ok_or_else(|| {
        CacheError::Arithmetic(format!(
            "prime {} divides the conductor of twisting character {}",
            p,
            chi.label()
        ))
    })?;
    let chi_inv = chi_p.inverse();
    let in_f = match compare_in(a_f, a_f, a_g, chi_inv) {
        Ok(equal) => return Ok(if equal { Scan::Scanning } else { Scan::Rejected }),
        Err(e) => e,
    };
    let in_g = match compare_in(a_g, a_f, a_g, chi_inv) {
        Ok(equal) => return Ok(if equal { Scan::Scanning } else { Scan::Rejected }),
        Err(e) => e,
    };
    if in_f.is_reasoned() || in_g.is_reasoned() {
        return Ok(Scan::Rejected);
    }
    Ok(Scan::Ambiguous {
        prime: p,
        reason: format!("{}; {}", in_f, in_g),
    })
}

/// Search state shared across candidates of one orbit.
struct TwistSearch<'a> {
    f: &'a OrbitRecord,
    oracle: &'a dyn Oracle,
    primes: Vec<u64>,
    characters: HashMap<u64, Vec<DirichletCharacter>>,
    spaces: HashMap<SpaceKey, Vec<CoefficientCache>>,
}

impl<'a> TwistSearch<'a> {
    fn characters(&mut self, modulus: u64) -> Result<Vec<DirichletCharacter>> {
        if let Some(chars) = self.characters.get(&modulus) {
            return Ok(chars.clone());
        }
        let chars = self.oracle.characters_of_modulus(modulus)?;
        self.characters.insert(modulus, chars.clone());
        Ok(chars)
    }

    /// Number of newform orbits in a lower space, decomposing it on first use.
    fn orbit_count(&mut self, key: SpaceKey) -> Result<usize> {
        if !self.spaces.contains_key(&key) {
            let working_precision = self.f.config().working_precision;
            let orbits: Vec<Orbit> = self.oracle.decompose(&key)?;
            let caches = orbits
                .into_iter()
                .map(|o| CoefficientCache::new(o, working_precision))
                .collect();
            self.spaces.insert(key, caches);
        }
        Ok(self.spaces[&key].len())
    }

    fn scan(&mut self, key: SpaceKey, index: usize, chi: &DirichletCharacter) -> Result<Scan> {
        let mut state = Scan::Scanning;
        for i in 0..self.primes.len() {
            let p = self.primes[i];
            let a_f = self.f.coefficient(p)?;
            let a_g = match self.spaces.get_mut(&key) {
                Some(caches) => caches[index].coefficient(self.oracle, p)?,
                None => return Err(CacheError::Arithmetic(format!("space {} not decomposed", key))),
            };
            state = step(&a_f, &a_g, chi, p)?;
            if state != Scan::Scanning {
                break;
            }
        }
        Ok(match state {
            Scan::Scanning => Scan::Accepted,
            other => other,
        })
    }

    fn q_expansion(&mut self, key: SpaceKey, index: usize, bound: u64) -> Result<Vec<FieldElement>> {
        match self.spaces.get_mut(&key) {
            Some(caches) => caches[index].q_expansion(self.oracle, bound),
            None => Err(CacheError::Arithmetic(format!("space {} not decomposed", key))),
        }
    }
}

/// True when psi * conj(chi)^2 agrees with eps on every unit mod `level`.
///
/// The scan accepts f = g twisted by conj(chi), whose character is
/// psi * conj(chi)^2; the source character is therefore eps * chi^2.
fn source_character_matches(
    psi: &DirichletCharacter,
    chi: &DirichletCharacter,
    eps: &DirichletCharacter,
    level: u64,
) -> bool {
    (1..level.max(2))
        .filter(|a| a.gcd(&level) == 1)
        .all(|a| {
            let lhs = psi
                .value_at(a)
                .zip(chi.value_at(a))
                .map(|(x, c)| x.mul(&c.inverse().pow(2)));
            lhs == eps.value_at(a)
        })
}

/// Decide whether `f` is a twist of a newform of lower level.
pub fn detect(f: &OrbitRecord) -> Result<TwistInfo> {
    let key = *f.key();
    let level = key.level;
    if is_squarefree(level) {
        log::debug!("{}: squarefree level, minimal", f.full_label());
        return Ok(TwistInfo::Minimal);
    }

    let bound = prime_check_bound(level, key.weight);
    let primes: Vec<u64> = primes_up_to(bound)
        .into_iter()
        .filter(|p| level % p != 0)
        .collect();
    log::debug!(
        "{}: twist search over {} primes up to {}",
        f.full_label(),
        primes.len(),
        bound
    );

    let mut search = TwistSearch {
        f,
        oracle: f.oracle(),
        primes,
        characters: HashMap::new(),
        spaces: HashMap::new(),
    };
    let q_precision = f.config().twist_q_precision;
    let mut candidates = Vec::new();
    let mut ambiguous = Vec::new();

    for d in divisors(level).into_iter().filter(|&d| d > 1 && level % (d * d) == 0) {
        let source_level = level / (d * d);
        let source_characters = search.characters(source_level)?;
        for chi in search.characters(d)? {
            for psi in source_characters
                .iter()
                .filter(|psi| source_character_matches(psi, &chi, f.character(), level))
            {
                let source_key = SpaceKey::new(source_level, key.weight, psi.index());
                if f.oracle().newspace_dimension(&source_key)? == 0 {
                    continue;
                }
                for index in 0..search.orbit_count(source_key)? {
                    let source_label = FormLabel {
                        key: source_key,
                        orbit: orbit_label(index),
                    }
                    .to_string();
                    match search.scan(source_key, index, &chi)? {
                        Scan::Accepted => {
                            log::debug!("{}: twist of {} by {}", f.full_label(), source_label, chi);
                            candidates.push(TwistCandidate {
                                source_level,
                                source_label,
                                source_character_index: psi.index(),
                                q_expansion: search.q_expansion(source_key, index, q_precision)?,
                                twisting_character: chi.clone(),
                            });
                        }
                        Scan::Ambiguous { prime, reason } => {
                            log::warn!(
                                "{}: could not compare against {} twisted by {} at p = {}: {}",
                                f.full_label(),
                                source_label,
                                chi,
                                prime,
                                reason
                            );
                            ambiguous.push(AmbiguousComparison {
                                source_label,
                                twisting_character: chi.label(),
                                prime,
                                reason,
                            });
                        }
                        Scan::Rejected | Scan::Scanning => {}
                    }
                }
            }
        }
    }

    Ok(match (candidates.is_empty(), ambiguous.is_empty()) {
        (true, true) => TwistInfo::Minimal,
        (true, false) => TwistInfo::Inconclusive { ambiguous },
        (false, _) => TwistInfo::TwistOf {
            candidates,
            ambiguous,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::characters::characters_of_modulus;
    use crate::config::CacheConfig;
    use crate::field::NumberField;
    use crate::table_oracle::{ElementSpec, FieldSpec, OracleTable, OrbitEntry, SpaceEntry, TableOracle};
    use num_traits::ToPrimitive;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[test]
    fn test_step_rules() {
        let q = NumberField::rational();
        let trivial = characters_of_modulus(4).remove(0);
        let minus4 = characters_of_modulus(4).remove(1);
        let zero = FieldElement::zero(&q);
        let one = FieldElement::one(&q);

        assert_eq!(step(&zero, &zero, &trivial, 3).unwrap(), Scan::Scanning);
        assert_eq!(step(&zero, &one, &trivial, 3).unwrap(), Scan::Rejected);
        assert_eq!(step(&one, &zero, &trivial, 3).unwrap(), Scan::Rejected);
        assert_eq!(step(&one, &one, &trivial, 3).unwrap(), Scan::Scanning);
        // chi_{-4}(3) = -1
        assert_eq!(step(&one, &one, &minus4, 3).unwrap(), Scan::Rejected);
        assert_eq!(step(&one.neg(), &one, &minus4, 3).unwrap(), Scan::Scanning);
    }

    #[test]
    fn test_step_at_conductor_prime_is_an_error() {
        let q = NumberField::rational();
        let minus4 = characters_of_modulus(4).remove(1);
        let one = FieldElement::one(&q);
        assert!(matches!(
            step(&one, &one, &minus4, 2),
            Err(CacheError::Arithmetic(_))
        ));
    }

    #[test]
    fn test_step_reasoned_rejection_across_fields() {
        // i in Q(i) cannot equal anything in the totally real Q(sqrt 2).
        let gauss = NumberField::cyclotomic(4);
        let real = NumberField::generic("2.2.8.1", &[-2, 0, 1], true).unwrap();
        let trivial = characters_of_modulus(1).remove(0);
        let a_f = FieldElement::generator(&real);
        let a_g = FieldElement::generator(&gauss);
        assert_eq!(step(&a_f, &a_g, &trivial, 3).unwrap(), Scan::Rejected);
    }

    #[test]
    fn test_step_ambiguous_between_unrelated_fields() {
        // Neither field is totally real and no map is known between them.
        let k1 = NumberField::generic("2.0.3.1", &[1, 1, 1], false).unwrap();
        let k2 = NumberField::generic("2.0.4.1", &[1, 0, 1], false).unwrap();
        let trivial = characters_of_modulus(1).remove(0);
        let a_f = FieldElement::generator(&k1);
        let a_g = FieldElement::generator(&k2);
        assert!(matches!(
            step(&a_f, &a_g, &trivial, 5).unwrap(),
            Scan::Ambiguous { prime: 5, .. }
        ));
    }

    #[test]
    fn test_source_character_for_quadratic_twist() {
        let eps = characters_of_modulus(176).remove(0);
        let minus4 = characters_of_modulus(4).remove(1);
        let psi = characters_of_modulus(11);
        let matching: Vec<usize> = psi
            .iter()
            .filter(|p| source_character_matches(p, &minus4, &eps, 176))
            .map(|p| p.index())
            .collect();
        assert_eq!(matching, vec![0]);
    }

    #[test]
    fn test_source_character_for_cubic_twist() {
        // Twisting by conj(chi_9.2) multiplies the character by chi_9.4^{-1},
        // so a trivial-character form comes from the space with chi_9.2^2 = chi_9.4.
        let eps = characters_of_modulus(729).remove(0);
        let chi = characters_of_modulus(9).remove(2);
        assert_eq!(chi.order(), 3);
        let matching: Vec<usize> = characters_of_modulus(9)
            .iter()
            .filter(|psi| source_character_matches(psi, &chi, &eps, 729))
            .map(|psi| psi.index())
            .collect();
        assert_eq!(matching, vec![4]);
    }

    fn space(level: u64, character_index: usize, orbits: Vec<OrbitEntry>) -> SpaceEntry {
        SpaceEntry {
            level,
            weight: 2,
            character_index,
            cuspidal_dimension: None,
            new_dimension: orbits.is_empty().then_some(0),
            orbits,
        }
    }

    /// 729.2.0.a with a_p = 1 for p != 3, and 9.2.4.a over Q(zeta_3) with
    /// a_p = chi_9.2(p): the first is the second twisted by conj(chi_9.2).
    fn cubic_twist_oracle() -> Arc<TableOracle> {
        let primes = primes_up_to(173);
        let chi = characters_of_modulus(9).remove(2);
        let zeta3 = NumberField::cyclotomic(3);
        let source_eigenvalues = primes
            .iter()
            .map(|&p| match chi.value_at(p) {
                None => ElementSpec::Integer(0),
                Some(r) => {
                    let x = zeta3.root_of_unity(r).unwrap();
                    ElementSpec::Coordinates(x.coords().iter().map(|c| c.to_i64().unwrap()).collect())
                }
            })
            .collect();
        let target_eigenvalues = primes
            .iter()
            .map(|&p| ElementSpec::Integer(if p == 3 { 0 } else { 1 }))
            .collect();
        let table = OracleTable {
            spaces: vec![
                space(
                    729,
                    0,
                    vec![OrbitEntry {
                        dimension: 1,
                        field: FieldSpec::Rational,
                        prime_eigenvalues: target_eigenvalues,
                        atkin_lehner: BTreeMap::new(),
                    }],
                ),
                space(
                    9,
                    4,
                    vec![OrbitEntry {
                        dimension: 2,
                        field: FieldSpec::Cyclotomic { order: 3 },
                        prime_eigenvalues: source_eigenvalues,
                        atkin_lehner: BTreeMap::new(),
                    }],
                ),
                space(81, 0, Vec::new()),
            ],
        };
        Arc::new(TableOracle::from_table(table).unwrap())
    }

    #[test]
    fn test_detects_cubic_twist() {
        let oracle = cubic_twist_oracle();
        let key = SpaceKey::new(729, 2, 0);
        let orbit = oracle.decompose(&key).unwrap().remove(0);
        let shared: Arc<dyn Oracle> = oracle.clone();
        let f = OrbitRecord::new(
            key,
            orbit_label(0),
            orbit,
            characters_of_modulus(729).remove(0),
            shared,
            CacheConfig::default(),
        );

        let info = detect(&f).unwrap();
        let found: Vec<(&str, String)> = info
            .candidates()
            .iter()
            .map(|c| (c.source_label.as_str(), c.twisting_character.label()))
            .collect();
        assert_eq!(found, vec![("9.2.4.a", "9.2".to_string())], "got {:?}", info);
        let candidate = &info.candidates()[0];
        assert_eq!(candidate.source_character_index, 4);
        assert_eq!(candidate.q_expansion.len(), 21);
        assert!(matches!(info, TwistInfo::TwistOf { ambiguous, .. } if ambiguous.is_empty()));
    }
}
