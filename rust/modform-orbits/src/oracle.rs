//! The boundary to the number-theory engine that decomposes spaces and
//! evaluates Hecke eigenvalues.
//!
//! Everything the cache knows about modular forms comes through [`Oracle`].
//! Calls are synchronous and may be expensive; the cache never repeats a call
//! whose answer it has already frozen.

use crate::characters::DirichletCharacter;
use crate::error::OracleError;
use crate::field::{FieldElement, NumberField};
use crate::labels::SpaceKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// One Galois orbit of newforms as returned by [`Oracle::decompose`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orbit {
    /// Opaque handle. Snapshots store it, so every Oracle instance serving the
    /// same data must issue the same id for the same orbit.
    pub id: u64,
    /// Dimension of the orbit as a subspace of the newspace.
    pub dimension: u64,
    /// Field generated by the Hecke eigenvalues.
    pub field: Arc<NumberField>,
}

/// Source of decompositions, eigenvalues and characters.
///
/// Orbit handles are persisted with the cache and handed back to a later
/// instance after a restore; implementations derive them from their data, not
/// from call order or process state.
pub trait Oracle: Send + Sync {
    /// Newform orbits of S_k^new(N, chi), in canonical order.
    fn decompose(&self, key: &SpaceKey) -> Result<Vec<Orbit>, OracleError>;

    /// Dimension of the full cuspidal space S_k(N, chi).
    fn cuspidal_dimension(&self, key: &SpaceKey) -> Result<u64, OracleError>;

    /// Dimension of the new subspace; 0 when no newforms exist.
    fn newspace_dimension(&self, key: &SpaceKey) -> Result<u64, OracleError>;

    /// Hecke eigenvalues a_p, aligned with `primes`.
    fn eigenvalues_at_primes(
        &self,
        orbit: &Orbit,
        primes: &[u64],
    ) -> Result<Vec<FieldElement>, OracleError>;

    /// The coefficient a_n for arbitrary n >= 1.
    fn eigenvalue_at(&self, orbit: &Orbit, n: u64) -> Result<FieldElement, OracleError>;

    /// All Dirichlet characters mod m; the position is the character index.
    fn characters_of_modulus(&self, modulus: u64) -> Result<Vec<DirichletCharacter>, OracleError>;

    /// Eigenvalues of the Atkin-Lehner operator W_Q on the orbit.
    /// More than one value means the orbit mixes Atkin-Lehner signs.
    fn atkin_lehner_eigenvalues(&self, orbit: &Orbit, q: u64) -> Result<BTreeSet<i8>, OracleError>;
}
