//! # Modular-form orbit cache
//!
//! Partitions spaces of cusp forms S_k(N, chi) into Galois orbits of newforms,
//! labels them deterministically, and keeps a lazily filled, persistable cache
//! of per-orbit invariants: Fourier coefficients, Atkin-Lehner signs, Satake
//! parameters, CM-point values and embeddings.
//!
//! Two searches run over the cache: twist minimality (is the orbit a twist of
//! a form of lower level?) and complex multiplication (does it vanish where a
//! quadratic character is -1?).
//!
//! The linear algebra behind decompositions and eigenvalues is external and
//! reached through the [`oracle::Oracle`] trait; [`table_oracle::TableOracle`]
//! serves it from precomputed tables.

pub mod arith;
pub mod characters;
pub mod cm;
pub mod coefficients;
pub mod config;
pub mod error;
pub mod field;
pub mod invariants;
pub mod labels;
pub mod lazy;
pub mod numeric;
pub mod oracle;
pub mod orbit;
pub mod persistence;
pub mod registry;
pub mod space;
pub mod table_oracle;
pub mod twist;

pub use error::{CacheError, Result};
pub use labels::{FormLabel, SpaceKey};
pub use oracle::Oracle;
pub use registry::SpaceRegistry;
