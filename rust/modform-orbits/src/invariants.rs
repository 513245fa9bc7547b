//! Numeric invariants of an orbit, computed under each complex embedding of
//! its coefficient field: Satake parameters, values at CM points, and the
//! embedded q-expansion.

use crate::characters::DirichletCharacter;
use crate::error::Result;
use crate::field::{FieldElement, NumberField};
use crate::labels::SpaceKey;
use crate::numeric::embedding_roots;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::sync::Arc;

/// Discriminants of the imaginary quadratic orders of class number one.
pub const HEEGNER_DISCRIMINANTS: [i64; 9] = [-3, -4, -7, -8, -11, -19, -43, -67, -163];

/// Roots of the Hecke polynomial at p under one embedding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SatakePair {
    pub alpha: Complex64,
    pub beta: Complex64,
}

/// prime -> one pair per embedding.
pub type SatakeParameters = BTreeMap<u64, Vec<SatakePair>>;

/// The form evaluated at a Heegner point, one value per embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmPointValue {
    pub discriminant: i64,
    pub tau: Complex64,
    pub values: Vec<Complex64>,
}

/// One embedding: the image of the generator and a_1, a_2, ... under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRow {
    pub root: Complex64,
    pub coefficients: Vec<Complex64>,
}

/// Normalized Satake parameters: alpha, beta are the roots of
/// X^2 - (a_p / p^{(k-1)/2}) X + chi(p), so |alpha| = |beta| = 1 for
/// Ramanujan-bounded eigenvalues. `prime_coefficients` lists (p, a_p) for
/// primes not dividing the level.
pub fn satake_parameters(
    key: &SpaceKey,
    character: &DirichletCharacter,
    field: &Arc<NumberField>,
    prime_coefficients: &[(u64, FieldElement)],
) -> Result<SatakeParameters> {
    let roots = embedding_roots(field);
    let mut params = SatakeParameters::new();
    for (p, ap) in prime_coefficients {
        let Some(chi_p) = character.value_at(*p) else {
            continue;
        };
        // Fails when chi(p) is not in the coefficient field.
        let chi_p = field.root_of_unity(chi_p)?;
        let scale = (*p as f64).powf((key.weight as f64 - 1.0) / 2.0);
        let pairs = roots
            .iter()
            .map(|&root| {
                let t = ap.to_complex(root) / scale;
                let c = chi_p.to_complex(root);
                let s = (t * t - c * 4.0).sqrt();
                SatakePair {
                    alpha: (t + s) / 2.0,
                    beta: (t - s) / 2.0,
                }
            })
            .collect();
        params.insert(*p, pairs);
    }
    Ok(params)
}

/// a_1..a_P under every embedding. `coefficients` starts at a_1.
pub fn embedding_table(field: &NumberField, coefficients: &[FieldElement]) -> Vec<EmbeddingRow> {
    embedding_roots(field)
        .into_iter()
        .map(|root| EmbeddingRow {
            root,
            coefficients: coefficients.iter().map(|a| a.to_complex(root)).collect(),
        })
        .collect()
}

/// The first `count` Heegner discriminants D admitting B with
/// B^2 = D (mod 4N), each with the least such B >= 0.
pub fn heegner_points(level: u64, count: usize) -> Vec<(i64, u64)> {
    let modulus = 4 * level as i64;
    HEEGNER_DISCRIMINANTS
        .iter()
        .filter_map(|&d| {
            (0..2 * level)
                .find(|&b| ((b as i64) * (b as i64) - d).rem_euclid(modulus) == 0)
                .map(|b| (d, b))
        })
        .take(count)
        .collect()
}

/// f(tau) = sum_{n >= 1} a_n q^n with q = exp(2 pi i tau), at the Heegner
/// points tau = (-B + sqrt(D)) / (2N). `coefficients` starts at a_0.
pub fn cm_point_values(
    level: u64,
    field: &NumberField,
    coefficients: &[FieldElement],
    count: usize,
) -> Vec<CmPointValue> {
    let roots = embedding_roots(field);
    heegner_points(level, count)
        .into_iter()
        .map(|(d, b)| {
            let sqrt_d = Complex64::new(0.0, (-d as f64).sqrt());
            let tau = (sqrt_d - b as f64) / (2.0 * level as f64);
            let q = (Complex64::new(0.0, 2.0 * PI) * tau).exp();
            let values = roots
                .iter()
                .map(|&root| {
                    let mut q_n = Complex64::new(1.0, 0.0);
                    let mut sum = Complex64::new(0.0, 0.0);
                    for a in coefficients.iter().skip(1) {
                        q_n *= q;
                        sum += a.to_complex(root) * q_n;
                    }
                    sum
                })
                .collect();
            CmPointValue {
                discriminant: d,
                tau,
                values,
            }
        })
        .collect()
}
