//! Floating-point views of coefficient fields: the complex roots of the
//! defining polynomial, one per embedding.

use crate::field::{FieldKind, NumberField};
use num_complex::Complex64;
use num_integer::Integer;
use num_traits::ToPrimitive;
use std::f64::consts::PI;

const MAX_ITERATIONS: usize = 500;
const TOLERANCE: f64 = 1e-14;
/// Imaginary parts below this are treated as zero.
const REAL_CUTOFF: f64 = 1e-9;

/// Roots of the defining polynomial in a fixed order; embedding j sends the
/// generator to the j-th root.
///
/// Cyclotomic fields list exp(2 pi i j / n) for j coprime to n, ascending.
/// Other fields are sorted by real part, then imaginary part.
pub fn embedding_roots(field: &NumberField) -> Vec<Complex64> {
    match field.kind() {
        FieldKind::Rational => vec![Complex64::new(0.0, 0.0)],
        FieldKind::Cyclotomic { order } => {
            let n = *order;
            (1..n)
                .filter(|j| j.gcd(&n) == 1)
                .map(|j| Complex64::from_polar(1.0, 2.0 * PI * j as f64 / n as f64))
                .collect()
        }
        FieldKind::Generic { totally_real } => {
            let coeffs: Vec<f64> = field
                .modulus()
                .iter()
                .map(|c| c.to_f64().unwrap_or(f64::NAN))
                .collect();
            let mut roots = durand_kerner(&coeffs);
            for r in roots.iter_mut() {
                if *totally_real || r.im.abs() < REAL_CUTOFF {
                    r.im = 0.0;
                }
            }
            roots.sort_by(|a, b| a.re.total_cmp(&b.re).then(a.im.total_cmp(&b.im)));
            roots
        }
    }
}

/// Evaluate a monic polynomial (lowest degree first).
fn horner(coeffs: &[f64], z: Complex64) -> Complex64 {
    coeffs
        .iter()
        .rev()
        .fold(Complex64::new(0.0, 0.0), |acc, &c| acc * z + c)
}

/// Simultaneous root finding for a monic polynomial.
fn durand_kerner(coeffs: &[f64]) -> Vec<Complex64> {
    let degree = coeffs.len() - 1;
    // Cauchy bound on the root moduli.
    let radius = 1.0 + coeffs[..degree].iter().fold(0.0f64, |m, c| m.max(c.abs()));
    let seed = Complex64::new(0.4, 0.9);
    let mut roots: Vec<Complex64> = (0..degree)
        .map(|i| seed.powu(i as u32) * (radius / 2.0))
        .collect();

    for _ in 0..MAX_ITERATIONS {
        let mut shift = 0.0f64;
        for i in 0..degree {
            let mut denom = Complex64::new(1.0, 0.0);
            for j in 0..degree {
                if i != j {
                    denom *= roots[i] - roots[j];
                }
            }
            let step = horner(coeffs, roots[i]) / denom;
            roots[i] -= step;
            shift = shift.max(step.norm());
        }
        if shift < TOLERANCE {
            break;
        }
    }
    roots
}

/// Number of embeddings equal to its complex conjugate, used for reporting.
pub fn real_embedding_count(field: &NumberField) -> usize {
    embedding_roots(field).iter().filter(|r| r.im == 0.0).count()
}
