//! Integer arithmetic for levels and indices.
//!
//! The genus of X_0(N) gives dim S_2(Gamma_0(N)):
//!   12 g = 12 + psi(N) - 3 nu_2(N) - 4 nu_3(N) - 6 c(N)
//! with psi(N) the index of Gamma_0(N) in SL_2(Z), nu_2 and nu_3 the elliptic
//! points of order 2 and 3, and c(N) the number of cusps.
//!
//! The Sturm bound and the prime-check bound used by the twist and CM searches
//! also live here.

use num_integer::Integer;

/// base^exp mod modulus, with u128 intermediates.
pub fn mod_pow(base: u64, exp: u64, modulus: u64) -> u64 {
    let m = modulus as u128;
    let mut acc = 1 % m;
    let mut square = base as u128 % m;
    let mut e = exp;
    while e != 0 {
        if e % 2 == 1 {
            acc = acc * square % m;
        }
        square = square * square % m;
        e /= 2;
    }
    acc as u64
}

/// (prime, exponent) pairs of n, primes ascending. Empty for n <= 1.
pub fn factor_u64(n: u64) -> Vec<(u64, u32)> {
    let mut rest = n;
    let mut factors: Vec<(u64, u32)> = Vec::new();
    let mut p = 2u64;
    while rest > 1 && p * p <= rest {
        let mut e = 0;
        while rest % p == 0 {
            rest /= p;
            e += 1;
        }
        if e > 0 {
            factors.push((p, e));
        }
        p += if p == 2 { 1 } else { 2 };
    }
    if rest > 1 {
        factors.push((rest, 1));
    }
    factors
}

pub fn prime_factors(n: u64) -> Vec<u64> {
    factor_u64(n).into_iter().map(|(p, _)| p).collect()
}

/// Divisors of n in ascending order, built from the factorization.
pub fn divisors(n: u64) -> Vec<u64> {
    if n == 0 {
        return Vec::new();
    }
    let mut divs = vec![1u64];
    for (p, e) in factor_u64(n) {
        let current = divs.len();
        let mut power = 1u64;
        for _ in 0..e {
            power *= p;
            for i in 0..current {
                divs.push(divs[i] * power);
            }
        }
    }
    divs.sort_unstable();
    divs
}

/// tau(n).
pub fn num_divisors(n: u64) -> u64 {
    factor_u64(n).iter().map(|&(_, e)| u64::from(e) + 1).product()
}

/// phi(n), with phi(0) = 0.
pub fn euler_phi(n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    factor_u64(n)
        .iter()
        .map(|&(p, e)| p.pow(e - 1) * (p - 1))
        .product()
}

pub fn is_squarefree(n: u64) -> bool {
    factor_u64(n).iter().all(|&(_, e)| e == 1)
}

pub fn is_prime(n: u64) -> bool {
    n >= 2 && (2u64..).take_while(|d| d * d <= n).all(|d| n % d != 0)
}

/// Primes p <= bound, by sieve.
pub fn primes_up_to(bound: u64) -> Vec<u64> {
    let size = bound as usize + 1;
    let mut is_candidate = vec![true; size.max(2)];
    is_candidate[0] = false;
    is_candidate[1] = false;
    let mut p = 2;
    while p * p < size {
        if is_candidate[p] {
            for multiple in (p * p..size).step_by(p) {
                is_candidate[multiple] = false;
            }
        }
        p += 1;
    }
    is_candidate
        .iter()
        .take(size)
        .enumerate()
        .filter_map(|(i, &prime)| prime.then_some(i as u64))
        .collect()
}

/// psi(N) = N prod_{p | N} (1 + 1/p).
pub fn psi_index(n: u64) -> u64 {
    factor_u64(n)
        .iter()
        .map(|&(p, e)| p.pow(e - 1) * (p + 1))
        .product::<u64>()
        * u64::from(n > 0)
}

/// Roots of x^2 + 1 modulo N.
pub fn count_elliptic_2(n: u64) -> u64 {
    (0..n).filter(|&x| (x * x + 1) % n == 0).count() as u64
}

/// Roots of x^2 + x + 1 modulo N.
pub fn count_elliptic_3(n: u64) -> u64 {
    (0..n).filter(|&x| (x * x + x + 1) % n == 0).count() as u64
}

/// c(N) = sum_{d | N} phi(gcd(d, N/d)).
pub fn count_cusps(n: u64) -> u64 {
    divisors(n)
        .into_iter()
        .map(|d| euler_phi(d.gcd(&(n / d))))
        .sum()
}

/// dim S_2(Gamma_0(N)), the genus of X_0(N).
pub fn dim_s2(n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    let twelve_g = 12 + psi_index(n) as i64
        - 3 * count_elliptic_2(n) as i64
        - 4 * count_elliptic_3(n) as i64
        - 6 * count_cusps(n) as i64;
    twelve_g.max(0) as u64 / 12
}

/// (mu * mu)(n), multiplicative with value -2 at p, 1 at p^2, 0 above.
fn mu_mu(n: u64) -> i64 {
    factor_u64(n)
        .iter()
        .map(|&(_, e)| match e {
            1 => -2,
            2 => 1,
            _ => 0,
        })
        .product()
}

/// dim S_2^new(Gamma_0(N)).
///
/// Old forms of level M | N appear tau(N/M) times, so inverting
/// dim S_2(N) = sum_{M | N} tau(N/M) dim S_2^new(M) gives
///   dim S_2^new(N) = sum_{d | N} (mu * mu)(d) dim S_2(N/d).
pub fn dim_s2_new(n: u64) -> u64 {
    let total: i64 = divisors(n)
        .into_iter()
        .map(|d| mu_mu(d) * dim_s2(n / d) as i64)
        .sum();
    total.max(0) as u64
}

/// ceil(k psi(N) / 12).
pub fn sturm_bound(level: u64, weight: u64) -> u64 {
    (weight * psi_index(level)).div_ceil(12)
}

/// Number of leading indices inspected by the twist and CM searches:
/// the Sturm bound plus the number of divisors of the level.
pub fn prime_check_bound(level: u64, weight: u64) -> u64 {
    sturm_bound(level, weight) + num_divisors(level)
}
