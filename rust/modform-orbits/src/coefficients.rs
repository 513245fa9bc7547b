//! Per-orbit store of Fourier coefficients.
//!
//! Prime eigenvalues live in a dense array indexed by prime position and are
//! fetched from the Oracle in contiguous batches, append-only. Every other
//! index goes to the Oracle's single-index evaluator once and is memoized in a
//! sparse map, but only up to the working precision.

use crate::arith::{is_prime, primes_up_to};
use crate::error::{OracleError, Result};
use crate::field::FieldElement;
use crate::oracle::{Orbit, Oracle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Frozen contents of a [`CoefficientCache`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientSnapshot {
    pub prime_eigenvalues: Vec<FieldElement>,
    pub sparse: BTreeMap<u64, FieldElement>,
}

#[derive(Debug)]
pub struct CoefficientCache {
    orbit: Orbit,
    /// primes[i] is the i-th prime; aligned with `eigenvalues`.
    primes: Vec<u64>,
    eigenvalues: Vec<FieldElement>,
    sparse: BTreeMap<u64, FieldElement>,
    working_precision: u64,
}

impl CoefficientCache {
    pub fn new(orbit: Orbit, working_precision: u64) -> Self {
        CoefficientCache {
            orbit,
            primes: Vec::new(),
            eigenvalues: Vec::new(),
            sparse: BTreeMap::new(),
            working_precision,
        }
    }

    pub fn from_snapshot(orbit: Orbit, working_precision: u64, snapshot: CoefficientSnapshot) -> Self {
        let count = snapshot.prime_eigenvalues.len();
        let primes = (2u64..).filter(|&n| is_prime(n)).take(count).collect();
        CoefficientCache {
            orbit,
            primes,
            eigenvalues: snapshot.prime_eigenvalues,
            sparse: snapshot.sparse,
            working_precision,
        }
    }

    pub fn to_snapshot(&self) -> CoefficientSnapshot {
        CoefficientSnapshot {
            prime_eigenvalues: self.eigenvalues.clone(),
            sparse: self.sparse.clone(),
        }
    }

    pub fn orbit(&self) -> &Orbit {
        &self.orbit
    }

    /// Largest prime whose eigenvalue is held.
    pub fn prime_bound(&self) -> u64 {
        self.primes.last().copied().unwrap_or(1)
    }

    /// Number of indices held in the sparse map.
    pub fn sparse_len(&self) -> usize {
        self.sparse.len()
    }

    /// Make sure every prime <= `bound` has its eigenvalue; one Oracle call at most.
    fn ensure_primes(&mut self, oracle: &dyn Oracle, bound: u64) -> Result<()> {
        if bound <= self.prime_bound() {
            return Ok(());
        }
        let fresh: Vec<u64> = primes_up_to(bound)
            .into_iter()
            .skip(self.primes.len())
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }
        log::debug!(
            "Fetching {} prime eigenvalues for orbit {} (primes {}..={})",
            fresh.len(),
            self.orbit.id,
            fresh[0],
            bound
        );
        let values = oracle.eigenvalues_at_primes(&self.orbit, &fresh)?;
        if values.len() != fresh.len() {
            return Err(OracleError::ShortReply {
                orbit: self.orbit.id,
                requested: fresh.len(),
                returned: values.len(),
            }
            .into());
        }
        self.primes.extend(fresh);
        self.eigenvalues.extend(values);
        Ok(())
    }

    /// The coefficient a_n.
    pub fn coefficient(&mut self, oracle: &dyn Oracle, n: u64) -> Result<FieldElement> {
        let field = &self.orbit.field;
        match n {
            0 => return Ok(FieldElement::zero(field)),
            1 => return Ok(FieldElement::one(field)),
            _ => {}
        }
        if is_prime(n) {
            self.ensure_primes(oracle, n)?;
            let i = self.primes.partition_point(|&p| p < n);
            return Ok(self.eigenvalues[i].clone());
        }
        if let Some(value) = self.sparse.get(&n) {
            return Ok(value.clone());
        }
        let value = oracle.eigenvalue_at(&self.orbit, n)?;
        if n <= self.working_precision {
            self.sparse.insert(n, value.clone());
        }
        Ok(value)
    }

    /// Coefficients at every requested index. Primes are fetched in a single
    /// batch up to the largest one requested.
    pub fn coefficients(
        &mut self,
        oracle: &dyn Oracle,
        indices: &[u64],
    ) -> Result<BTreeMap<u64, FieldElement>> {
        if let Some(&largest_prime) = indices.iter().filter(|&&n| is_prime(n)).max() {
            self.ensure_primes(oracle, largest_prime)?;
        }
        indices
            .iter()
            .map(|&n| Ok((n, self.coefficient(oracle, n)?)))
            .collect()
    }

    /// a_0, a_1, ..., a_bound in order.
    pub fn q_expansion(&mut self, oracle: &dyn Oracle, bound: u64) -> Result<Vec<FieldElement>> {
        let indices: Vec<u64> = (0..=bound).collect();
        Ok(self.coefficients(oracle, &indices)?.into_values().collect())
    }
}
