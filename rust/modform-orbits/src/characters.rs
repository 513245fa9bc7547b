//! Dirichlet characters with exact values.
//!
//! Every value of a character mod m is either 0 (when gcd(a, m) > 1) or a root
//! of unity, stored exactly as a reduced fraction k/n of a full turn:
//! e^{2 pi i k/n}. The group of characters mod m is built from generators of
//! (Z/mZ)^*: a primitive root for each odd prime power, and -1, 5 for 2^e.
//!
//! Enumeration order is fixed: exponent tuples in lexicographic order over the
//! generators (sorted by prime), so the trivial character is always index 0.

use crate::arith::{divisors, euler_phi, factor_u64, mod_pow, prime_factors};
use num_complex::Complex64;
use num_integer::Integer;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// The root of unity e^{2 pi i num/den}, with 0 <= num < den and gcd(num, den) = 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RootOfUnity {
    num: u64,
    den: u64,
}

impl RootOfUnity {
    pub const ONE: RootOfUnity = RootOfUnity { num: 0, den: 1 };
    pub const MINUS_ONE: RootOfUnity = RootOfUnity { num: 1, den: 2 };

    /// e^{2 pi i num/den}, reduced.
    pub fn new(num: u64, den: u64) -> Self {
        assert!(den > 0, "root of unity needs a positive denominator");
        let num = num % den;
        let g = num.gcd(&den);
        RootOfUnity {
            num: num / g,
            den: den / g,
        }
    }

    pub fn numerator(&self) -> u64 {
        self.num
    }

    /// Multiplicative order of this root.
    pub fn order(&self) -> u64 {
        self.den
    }

    pub fn is_one(&self) -> bool {
        self.den == 1
    }

    pub fn is_minus_one(&self) -> bool {
        self.den == 2
    }

    pub fn mul(&self, other: &RootOfUnity) -> RootOfUnity {
        let den = self.den.lcm(&other.den);
        RootOfUnity::new(self.num * (den / self.den) + other.num * (den / other.den), den)
    }

    pub fn pow(&self, e: u64) -> RootOfUnity {
        RootOfUnity::new(((self.num as u128 * e as u128) % self.den as u128) as u64, self.den)
    }

    pub fn inverse(&self) -> RootOfUnity {
        RootOfUnity::new(self.den - self.num, self.den)
    }

    pub fn to_complex(&self) -> Complex64 {
        if self.is_one() {
            return Complex64::new(1.0, 0.0);
        }
        if self.is_minus_one() {
            return Complex64::new(-1.0, 0.0);
        }
        Complex64::from_polar(1.0, 2.0 * PI * self.num as f64 / self.den as f64)
    }
}

impl fmt::Display for RootOfUnity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.den {
            1 => write!(f, "1"),
            2 => write!(f, "-1"),
            _ => write!(f, "zeta_{}^{}", self.den, self.num),
        }
    }
}

/// A Dirichlet character mod `modulus`, identified by its position in the
/// enumeration of [`characters_of_modulus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirichletCharacter {
    modulus: u64,
    index: usize,
    order: u64,
    conductor: u64,
    /// values[a] for 0 <= a < modulus; None where gcd(a, modulus) > 1.
    values: Vec<Option<RootOfUnity>>,
}

impl DirichletCharacter {
    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn order(&self) -> u64 {
        self.order
    }

    pub fn conductor(&self) -> u64 {
        self.conductor
    }

    pub fn is_trivial(&self) -> bool {
        self.order == 1
    }

    pub fn is_quadratic(&self) -> bool {
        self.order == 2
    }

    /// chi(n); None means chi(n) = 0.
    pub fn value_at(&self, n: u64) -> Option<RootOfUnity> {
        self.values[(n % self.modulus) as usize]
    }

    /// chi(n) for signed n.
    pub fn value_at_signed(&self, n: i64) -> Option<RootOfUnity> {
        let m = self.modulus as i64;
        self.value_at(n.rem_euclid(m) as u64)
    }

    /// chi(-1) as +1 or -1.
    pub fn parity(&self) -> i64 {
        match self.value_at_signed(-1) {
            Some(r) if r.is_minus_one() => -1,
            _ => 1,
        }
    }

    /// Number of residues a mod m with chi(a) = -1.
    pub fn count_minus_one(&self) -> usize {
        self.values
            .iter()
            .filter(|v| matches!(v, Some(r) if r.is_minus_one()))
            .count()
    }

    /// Label `{modulus}.{index}`.
    pub fn label(&self) -> String {
        format!("{}.{}", self.modulus, self.index)
    }

    /// True if this character (mod m) and `other` (mod m') agree on every
    /// residue coprime to `modulus`, where both m and m' divide `modulus`.
    pub fn agrees_with_on_units(&self, other: &DirichletCharacter, modulus: u64) -> bool {
        (1..modulus)
            .chain(std::iter::once(0).filter(|_| modulus == 1))
            .filter(|a| a.gcd(&modulus) == 1)
            .all(|a| self.value_at(a) == other.value_at(a))
    }

    /// The value of (self * other)(a), or None if either vanishes.
    pub fn product_value(&self, other: &DirichletCharacter, a: u64) -> Option<RootOfUnity> {
        Some(self.value_at(a)?.mul(&other.value_at(a)?))
    }
}

impl fmt::Display for DirichletCharacter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chi_{}", self.label())
    }
}

/// A cyclic factor of (Z/mZ)^*: a generator lifted to mod m and its order.
#[derive(Debug, Clone, Copy)]
struct UnitGenerator {
    generator: u64,
    order: u64,
}

/// Smallest primitive root modulo an odd prime power p^e.
fn primitive_root(p: u64, e: u32) -> u64 {
    let phi_p = p - 1;
    let qs = prime_factors(phi_p);
    let mut g = 2u64;
    loop {
        if qs.iter().all(|q| mod_pow(g, phi_p / q, p) != 1) {
            break;
        }
        g += 1;
    }
    if e >= 2 && mod_pow(g, p - 1, p * p) == 1 {
        g += p;
    }
    g
}

/// x with x = r mod q and x = 1 mod (m / q), for coprime q and m / q.
fn crt_lift(r: u64, q: u64, m: u64) -> u64 {
    let rest = m / q;
    if rest == 1 {
        return r % m;
    }
    // Search x = r + q*t; rest is small relative to m.
    let mut x = r % q;
    while x % rest != 1 % rest {
        x += q;
    }
    x % m
}

fn unit_generators(m: u64) -> Vec<UnitGenerator> {
    let mut gens = Vec::new();
    for (p, e) in factor_u64(m) {
        let q = p.pow(e);
        if p == 2 {
            if e >= 2 {
                gens.push(UnitGenerator {
                    generator: crt_lift(q - 1, q, m),
                    order: 2,
                });
            }
            if e >= 3 {
                gens.push(UnitGenerator {
                    generator: crt_lift(5, q, m),
                    order: q / 4,
                });
            }
        } else {
            gens.push(UnitGenerator {
                generator: crt_lift(primitive_root(p, e), q, m),
                order: euler_phi(q),
            });
        }
    }
    gens
}

/// Discrete logarithms of every unit mod m with respect to the generators.
fn discrete_logs(m: u64, gens: &[UnitGenerator]) -> Vec<Option<Vec<u64>>> {
    let mut logs: Vec<Option<Vec<u64>>> = vec![None; m as usize];
    let mut exps = vec![0u64; gens.len()];
    loop {
        let mut a = 1 % m;
        for (g, &k) in gens.iter().zip(&exps) {
            a = (a as u128 * mod_pow(g.generator, k, m) as u128 % m as u128) as u64;
        }
        logs[a as usize] = Some(exps.clone());
        if !advance(&mut exps, gens) {
            break;
        }
    }
    logs
}

/// Advance an exponent tuple lexicographically (last position fastest).
fn advance(exps: &mut [u64], gens: &[UnitGenerator]) -> bool {
    for i in (0..exps.len()).rev() {
        exps[i] += 1;
        if exps[i] < gens[i].order {
            return true;
        }
        exps[i] = 0;
    }
    false
}

/// Smallest divisor d of m from which the character values are induced.
fn conductor_of(values: &[Option<RootOfUnity>], m: u64) -> u64 {
    for d in divisors(m) {
        let induced = (0..d).all(|r| {
            let mut first: Option<RootOfUnity> = None;
            let mut a = r;
            while a < m {
                if let Some(v) = values[a as usize] {
                    match first {
                        None => first = Some(v),
                        Some(f) if f != v => return false,
                        Some(_) => {}
                    }
                }
                a += d;
            }
            true
        });
        if induced {
            return d;
        }
    }
    m
}

/// All Dirichlet characters mod `modulus` in canonical order.
pub fn characters_of_modulus(modulus: u64) -> Vec<DirichletCharacter> {
    assert!(modulus > 0, "characters need a positive modulus");
    let gens = unit_generators(modulus);
    let logs = discrete_logs(modulus, &gens);
    let common = gens.iter().fold(1u64, |acc, g| acc.lcm(&g.order));

    let mut chars = Vec::new();
    let mut exps = vec![0u64; gens.len()];
    loop {
        let values: Vec<Option<RootOfUnity>> = logs
            .iter()
            .map(|log| {
                log.as_ref().map(|ks| {
                    let num = gens
                        .iter()
                        .zip(&exps)
                        .zip(ks)
                        .map(|((g, &c), &k)| c * k % g.order * (common / g.order))
                        .sum::<u64>();
                    RootOfUnity::new(num, common)
                })
            })
            .collect();
        let order = gens
            .iter()
            .zip(&exps)
            .fold(1u64, |acc, (g, &c)| acc.lcm(&(g.order / c.gcd(&g.order))));
        let conductor = conductor_of(&values, modulus);
        chars.push(DirichletCharacter {
            modulus,
            index: chars.len(),
            order,
            conductor,
            values,
        });
        if !advance(&mut exps, &gens) {
            break;
        }
    }
    chars
}

/// First character mod `target_modulus` that agrees with `chi` on all units
/// mod `chi.modulus()`. `target_modulus` must divide `chi.modulus()`.
pub fn restrict_to_modulus(
    chi: &DirichletCharacter,
    table: &[DirichletCharacter],
    target_modulus: u64,
) -> Option<usize> {
    if target_modulus % chi.conductor() != 0 {
        return None;
    }
    table
        .iter()
        .find(|psi| psi.modulus() == target_modulus && psi.agrees_with_on_units(chi, chi.modulus()))
        .map(|psi| psi.index())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_root_of_unity_arithmetic() {
        let i = RootOfUnity::new(1, 4);
        assert_eq!(i.mul(&i), RootOfUnity::MINUS_ONE);
        assert_eq!(i.pow(4), RootOfUnity::ONE);
        assert_eq!(i.inverse(), RootOfUnity::new(3, 4));
        assert_eq!(RootOfUnity::new(6, 12), RootOfUnity::MINUS_ONE);
        assert_eq!(RootOfUnity::new(2, 6).order(), 3);
        let z = RootOfUnity::new(1, 3).to_complex();
        assert!((z.re + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_group_sizes() {
        for m in 1..=60u64 {
            let chars = characters_of_modulus(m);
            assert_eq!(chars.len() as u64, euler_phi(m), "modulus {}", m);
            assert!(chars[0].is_trivial(), "index 0 must be trivial mod {}", m);
            for (i, chi) in chars.iter().enumerate() {
                assert_eq!(chi.index(), i);
            }
        }
    }

    #[test]
    fn test_characters_distinct() {
        for m in [8u64, 12, 15, 16, 21] {
            let chars = characters_of_modulus(m);
            for i in 0..chars.len() {
                for j in (i + 1)..chars.len() {
                    assert!(!chars[i].agrees_with_on_units(&chars[j], m), "mod {}: {} == {}", m, i, j);
                }
            }
        }
    }

    #[test]
    fn test_quadratic_character_mod_4() {
        let chars = characters_of_modulus(4);
        assert_eq!(chars.len(), 2);
        let chi = &chars[1];
        assert!(chi.is_quadratic());
        assert_eq!(chi.conductor(), 4);
        assert_eq!(chi.value_at(1), Some(RootOfUnity::ONE));
        assert_eq!(chi.value_at(3), Some(RootOfUnity::MINUS_ONE));
        assert_eq!(chi.value_at(2), None);
        assert_eq!(chi.parity(), -1);
        assert_eq!(chi.count_minus_one(), 1);
    }

    #[test]
    fn test_quadratic_character_mod_7_is_legendre() {
        let chars = characters_of_modulus(7);
        let quad: Vec<_> = chars.iter().filter(|c| c.is_quadratic()).collect();
        assert_eq!(quad.len(), 1);
        assert_eq!(quad[0].index(), 3);
        for a in 1..7u64 {
            // Euler's criterion: a^3 = (a/7) mod 7.
            let residue = mod_pow(a, 3, 7) == 1;
            assert_eq!(quad[0].value_at(a) == Some(RootOfUnity::ONE), residue, "a = {}", a);
        }
    }

    #[test]
    fn test_conductors() {
        // mod 12 = 4 * 3: conductors 1, 3, 4, 12
        let mut conductors: Vec<u64> = characters_of_modulus(12).iter().map(|c| c.conductor()).collect();
        conductors.sort_unstable();
        assert_eq!(conductors, vec![1, 3, 4, 12]);

        // mod 8: two primitive characters of conductor 8, one of conductor 4
        let conductors: Vec<u64> = characters_of_modulus(8).iter().map(|c| c.conductor()).collect();
        assert_eq!(conductors.iter().filter(|&&c| c == 8).count(), 2);
        assert_eq!(conductors.iter().filter(|&&c| c == 4).count(), 1);
    }

    #[test]
    fn test_restriction_matching() {
        let big = characters_of_modulus(44);
        let small = characters_of_modulus(4);
        // The character mod 44 induced from chi_{-4}
        let induced = big
            .iter()
            .find(|c| c.conductor() == 4)
            .expect("a conductor-4 character mod 44");
        assert_eq!(restrict_to_modulus(induced, &small, 4), Some(1));
        // A primitive character mod 11 does not restrict to mod 4
        let prim11 = big.iter().find(|c| c.conductor() == 11).expect("conductor 11");
        assert_eq!(restrict_to_modulus(prim11, &small, 4), None);
    }

    #[test]
    fn test_multiplicativity_random() {
        let mut rng = StdRng::seed_from_u64(7);
        for m in [9u64, 20, 24, 35] {
            for chi in characters_of_modulus(m) {
                for _ in 0..20 {
                    let a = rng.gen_range(1..m);
                    let b = rng.gen_range(1..m);
                    let lhs = chi.value_at(a * b);
                    let rhs = match (chi.value_at(a), chi.value_at(b)) {
                        (Some(x), Some(y)) => Some(x.mul(&y)),
                        _ => None,
                    };
                    assert_eq!(lhs, rhs, "chi_{}.{} at {} * {}", m, chi.index(), a, b);
                }
            }
        }
    }
}
