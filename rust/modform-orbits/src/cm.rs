//! Complex-multiplication search.
//!
//! A CM form with quadratic character chi vanishes at every prime p with
//! chi(p) = -1. The search reads a_0..a_B once, where B is the Sturm bound
//! plus the number of divisors of the level. With no zero coefficient among
//! them there is nothing to look for; otherwise quadratic characters of
//! modulus 3..ceil(B/2) are tried in order and the first one consistent with
//! the observed zeros wins.

use crate::arith::{prime_check_bound, primes_up_to};
use crate::characters::DirichletCharacter;
use crate::error::Result;
use crate::field::FieldElement;
use crate::orbit::OrbitRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CmInfo {
    NoCm,
    Cm {
        character: DirichletCharacter,
        /// chi(-1) * conductor(chi).
        discriminant: i64,
    },
}

impl CmInfo {
    pub fn has_cm(&self) -> bool {
        matches!(self, CmInfo::Cm { .. })
    }

    pub fn discriminant(&self) -> Option<i64> {
        match self {
            CmInfo::Cm { discriminant, .. } => Some(*discriminant),
            CmInfo::NoCm => None,
        }
    }
}

/// Outcome of testing one quadratic character against a q-expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Witness {
    /// chi is -1 at more residues than there are observed zeros.
    Pruned,
    /// a_p is nonzero at this prime although chi(p) = -1.
    Violated(u64),
    Consistent,
}

fn check_witness(
    chi: &DirichletCharacter,
    primes: &[u64],
    expansion: &[FieldElement],
    zero_count: usize,
) -> Witness {
    if chi.count_minus_one() > zero_count {
        return Witness::Pruned;
    }
    let violation = primes.iter().find(|&&p| {
        chi.value_at(p).map_or(false, |v| v.is_minus_one()) && !expansion[p as usize].is_zero()
    });
    match violation {
        Some(&p) => Witness::Violated(p),
        None => Witness::Consistent,
    }
}

pub fn detect(f: &OrbitRecord) -> Result<CmInfo> {
    let key = f.key();
    let bound = prime_check_bound(key.level, key.weight);
    let expansion = f.q_expansion(bound)?;
    let zero_count = expansion.iter().skip(2).filter(|a| a.is_zero()).count();
    if zero_count == 0 {
        log::debug!("{}: no vanishing coefficients up to {}, no CM", f.full_label(), bound);
        return Ok(CmInfo::NoCm);
    }

    let primes = primes_up_to(bound);
    for modulus in 3..=bound.div_ceil(2) {
        for chi in f.oracle().characters_of_modulus(modulus)? {
            if !chi.is_quadratic() {
                continue;
            }
            match check_witness(&chi, &primes, &expansion, zero_count) {
                Witness::Consistent => {
                    let discriminant = chi.parity() * chi.conductor() as i64;
                    log::debug!("{}: CM by {} (discriminant {})", f.full_label(), chi, discriminant);
                    return Ok(CmInfo::Cm {
                        character: chi,
                        discriminant,
                    });
                }
                Witness::Violated(p) => {
                    log::trace!("{}: {} rejected at p = {}", f.full_label(), chi, p);
                }
                Witness::Pruned => {}
            }
        }
    }
    Ok(CmInfo::NoCm)
}
