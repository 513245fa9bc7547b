//! Exact arithmetic in the coefficient fields of newforms.
//!
//! A field is Q[x]/(m(x)) for a monic integer polynomial m. Elements are kept
//! in the power basis 1, x, ..., x^{d-1} as integer coordinates over a shared
//! positive denominator, normalized so equal elements compare equal.
//!
//! Conversions between fields are typed: the same field, rational elements,
//! and cyclotomic subfields map exactly. Everything else fails with either
//! `FieldError::Incompatible` (provably unequal, e.g. a non-real value into a
//! totally real field) or `FieldError::NoCoercion` (no known map).

use crate::arith::divisors;
use crate::characters::RootOfUnity;
use crate::error::FieldError;
use num_bigint::BigInt;
use num_complex::Complex64;
use num_integer::Integer;
use num_traits::{One, Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The shape of a coefficient field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Rational,
    /// Q(zeta_n), with n odd or divisible by 4.
    Cyclotomic { order: u64 },
    Generic { totally_real: bool },
}

/// A number field Q[x]/(m(x)) with m monic over Z.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NumberField {
    label: String,
    kind: FieldKind,
    /// Coefficients of m, lowest degree first.
    #[serde(with = "bigint_strings")]
    modulus: Vec<BigInt>,
}

impl NumberField {
    /// The rational field, as Q[x]/(x).
    pub fn rational() -> Arc<NumberField> {
        Arc::new(NumberField {
            label: "Q".to_string(),
            kind: FieldKind::Rational,
            modulus: vec![BigInt::zero(), BigInt::one()],
        })
    }

    /// Q(zeta_n). Orders 1 and 2 give Q; n = 2 mod 4 is reduced to n/2.
    pub fn cyclotomic(order: u64) -> Arc<NumberField> {
        let n = if order % 4 == 2 { order / 2 } else { order };
        if n <= 2 {
            return NumberField::rational();
        }
        Arc::new(NumberField {
            label: format!("Q(zeta_{})", n),
            kind: FieldKind::Cyclotomic { order: n },
            modulus: cyclotomic_polynomial(n),
        })
    }

    /// A field given by its defining polynomial (lowest degree first, monic).
    pub fn generic(
        label: &str,
        modulus: &[i64],
        totally_real: bool,
    ) -> Result<Arc<NumberField>, FieldError> {
        if modulus.len() < 2 {
            return Err(FieldError::InvalidModulus(format!(
                "{}: defining polynomial must have degree at least 1",
                label
            )));
        }
        if modulus.last() != Some(&1) {
            return Err(FieldError::InvalidModulus(format!(
                "{}: defining polynomial must be monic",
                label
            )));
        }
        Ok(Arc::new(NumberField {
            label: label.to_string(),
            kind: FieldKind::Generic { totally_real },
            modulus: modulus.iter().map(|&c| BigInt::from(c)).collect(),
        }))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn modulus(&self) -> &[BigInt] {
        &self.modulus
    }

    /// Absolute degree [K : Q].
    pub fn degree(&self) -> usize {
        self.modulus.len() - 1
    }

    pub fn is_rational(&self) -> bool {
        self.degree() == 1
    }

    /// True when every complex embedding is real.
    pub fn is_totally_real(&self) -> bool {
        match self.kind {
            FieldKind::Rational => true,
            FieldKind::Cyclotomic { .. } => false,
            FieldKind::Generic { totally_real } => totally_real,
        }
    }

    /// Reduce a polynomial modulo the defining polynomial.
    fn reduce(&self, mut coeffs: Vec<BigInt>) -> Vec<BigInt> {
        let d = self.degree();
        for i in (d..coeffs.len()).rev() {
            let c = std::mem::take(&mut coeffs[i]);
            if c.is_zero() {
                continue;
            }
            for j in 0..d {
                coeffs[i - d + j] -= &c * &self.modulus[j];
            }
        }
        coeffs.resize(d, BigInt::zero());
        coeffs
    }

    /// The root of unity `r` as an element of this field.
    pub fn root_of_unity(self: &Arc<Self>, r: RootOfUnity) -> Result<FieldElement, FieldError> {
        if r.is_one() {
            return Ok(FieldElement::one(self));
        }
        if r.is_minus_one() {
            return Ok(FieldElement::one(self).neg());
        }
        match self.kind {
            FieldKind::Cyclotomic { order: n } => {
                // Q(zeta_n) contains exactly the roots of unity of order dividing lcm(2, n).
                let full = if n % 2 == 1 { 2 * n } else { n };
                if full % r.order() != 0 {
                    return Err(FieldError::NoCoercion {
                        from: format!("Q(zeta_{})", r.order()),
                        to: self.label.clone(),
                    });
                }
                let j = r.numerator() * (full / r.order());
                let x = FieldElement::generator(self);
                if full == n {
                    x.pow(j % n)
                } else {
                    // zeta_{2n} = -zeta_n^{(n+1)/2}
                    let v = x.pow(j * ((n + 1) / 2) % n)?;
                    Ok(if j % 2 == 1 { v.neg() } else { v })
                }
            }
            _ if self.is_totally_real() => Err(FieldError::Incompatible {
                from: r.to_string(),
                to: self.label.clone(),
                reason: "a non-real root of unity has no image in a totally real field".to_string(),
            }),
            _ => Err(FieldError::NoCoercion {
                from: format!("Q(zeta_{})", r.order()),
                to: self.label.clone(),
            }),
        }
    }

    /// Map `elem` into this field.
    pub fn convert(self: &Arc<Self>, elem: &FieldElement) -> Result<FieldElement, FieldError> {
        if *elem.field == **self {
            return Ok(FieldElement {
                field: Arc::clone(self),
                coords: elem.coords.clone(),
                den: elem.den.clone(),
            });
        }
        if let Some((num, den)) = elem.rational_value() {
            return FieldElement::from_fraction(self, vec![num], den);
        }
        if let FieldKind::Cyclotomic { order: m } = elem.field.kind {
            if let Ok(image) = self.root_of_unity(RootOfUnity::new(1, m)) {
                return self.evaluate(&elem.coords, &elem.den, &image);
            }
        }
        if self.is_totally_real() && elem.is_real() == Some(false) {
            return Err(FieldError::Incompatible {
                from: elem.field.label.clone(),
                to: self.label.clone(),
                reason: format!("{} is not real", elem),
            });
        }
        Err(FieldError::NoCoercion {
            from: elem.field.label.clone(),
            to: self.label.clone(),
        })
    }

    /// (sum coords[i] * at^i) / den, computed in this field.
    fn evaluate(
        self: &Arc<Self>,
        coords: &[BigInt],
        den: &BigInt,
        at: &FieldElement,
    ) -> Result<FieldElement, FieldError> {
        let mut acc = FieldElement::zero(self);
        for c in coords.iter().rev() {
            acc = acc
                .checked_mul(at)?
                .checked_add(&FieldElement::from_fraction(self, vec![c.clone()], BigInt::one())?)?;
        }
        FieldElement::from_fraction(self, acc.coords, acc.den * den)
    }
}

impl fmt::Display for NumberField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// Coefficients of the n-th cyclotomic polynomial, lowest degree first.
fn cyclotomic_polynomial(n: u64) -> Vec<BigInt> {
    let mut poly = vec![BigInt::zero(); n as usize + 1];
    poly[0] = -BigInt::one();
    poly[n as usize] = BigInt::one();
    for d in divisors(n) {
        if d < n {
            poly = poly_div_monic(&poly, &cyclotomic_polynomial(d));
        }
    }
    poly
}

/// Quotient of exact division by a monic polynomial.
fn poly_div_monic(num: &[BigInt], den: &[BigInt]) -> Vec<BigInt> {
    let dn = den.len() - 1;
    if num.len() <= dn {
        return vec![BigInt::zero()];
    }
    let mut rem = num.to_vec();
    let mut quot = vec![BigInt::zero(); num.len() - dn];
    for i in (0..quot.len()).rev() {
        let c = rem[i + dn].clone();
        if !c.is_zero() {
            for j in 0..=dn {
                rem[i + j] -= &c * &den[j];
            }
        }
        quot[i] = c;
    }
    quot
}

/// An element of a [`NumberField`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldElement {
    field: Arc<NumberField>,
    #[serde(with = "bigint_strings")]
    coords: Vec<BigInt>,
    #[serde(with = "bigint_string")]
    den: BigInt,
}

impl FieldElement {
    /// (sum coords[i] x^i) / den, reduced and normalized.
    pub fn from_fraction(
        field: &Arc<NumberField>,
        coords: Vec<BigInt>,
        den: BigInt,
    ) -> Result<FieldElement, FieldError> {
        if den.is_zero() {
            return Err(FieldError::ZeroDenominator);
        }
        let mut coords = field.reduce(coords);
        let mut den = den;
        if den.is_negative() {
            den = -den;
            coords.iter_mut().for_each(|c| *c = -std::mem::take(c));
        }
        let g = coords.iter().fold(den.clone(), |acc, c| acc.gcd(c));
        if !g.is_one() {
            coords.iter_mut().for_each(|c| *c = std::mem::take(c) / &g);
            den /= &g;
        }
        if coords.iter().all(Zero::is_zero) {
            den = BigInt::one();
        }
        Ok(FieldElement {
            field: Arc::clone(field),
            coords,
            den,
        })
    }

    /// Integer coordinates in the power basis.
    pub fn from_integers(field: &Arc<NumberField>, coords: &[i64]) -> FieldElement {
        FieldElement {
            field: Arc::clone(field),
            coords: field.reduce(coords.iter().map(|&c| BigInt::from(c)).collect()),
            den: BigInt::one(),
        }
    }

    pub fn from_int(field: &Arc<NumberField>, n: i64) -> FieldElement {
        FieldElement::from_integers(field, &[n])
    }

    pub fn zero(field: &Arc<NumberField>) -> FieldElement {
        FieldElement::from_int(field, 0)
    }

    pub fn one(field: &Arc<NumberField>) -> FieldElement {
        FieldElement::from_int(field, 1)
    }

    /// The class of x.
    pub fn generator(field: &Arc<NumberField>) -> FieldElement {
        FieldElement::from_integers(field, &[0, 1])
    }

    pub fn field(&self) -> &Arc<NumberField> {
        &self.field
    }

    pub fn coords(&self) -> &[BigInt] {
        &self.coords
    }

    pub fn denominator(&self) -> &BigInt {
        &self.den
    }

    pub fn is_zero(&self) -> bool {
        self.coords.iter().all(Zero::is_zero)
    }

    pub fn is_one(&self) -> bool {
        self.den.is_one()
            && self.coords[0].is_one()
            && self.coords[1..].iter().all(Zero::is_zero)
    }

    /// (numerator, denominator) when the element lies in Q.
    pub fn rational_value(&self) -> Option<(BigInt, BigInt)> {
        if self.coords[1..].iter().all(Zero::is_zero) {
            Some((self.coords[0].clone(), self.den.clone()))
        } else {
            None
        }
    }

    fn check_same_field(&self, other: &FieldElement) -> Result<(), FieldError> {
        if Arc::ptr_eq(&self.field, &other.field) || self.field == other.field {
            Ok(())
        } else {
            Err(FieldError::Mismatch {
                left: self.field.label.clone(),
                right: other.field.label.clone(),
            })
        }
    }

    pub fn checked_add(&self, other: &FieldElement) -> Result<FieldElement, FieldError> {
        self.check_same_field(other)?;
        let coords = self
            .coords
            .iter()
            .zip(&other.coords)
            .map(|(a, b)| a * &other.den + b * &self.den)
            .collect();
        FieldElement::from_fraction(&self.field, coords, &self.den * &other.den)
    }

    pub fn checked_sub(&self, other: &FieldElement) -> Result<FieldElement, FieldError> {
        self.checked_add(&other.neg())
    }

    pub fn checked_mul(&self, other: &FieldElement) -> Result<FieldElement, FieldError> {
        self.check_same_field(other)?;
        let mut prod = vec![BigInt::zero(); self.coords.len() + other.coords.len() - 1];
        for (i, a) in self.coords.iter().enumerate() {
            if a.is_zero() {
                continue;
            }
            for (j, b) in other.coords.iter().enumerate() {
                prod[i + j] += a * b;
            }
        }
        FieldElement::from_fraction(&self.field, prod, &self.den * &other.den)
    }

    pub fn neg(&self) -> FieldElement {
        FieldElement {
            field: Arc::clone(&self.field),
            coords: self.coords.iter().map(|c| -c).collect(),
            den: self.den.clone(),
        }
    }

    /// Multiply by an integer scalar.
    pub fn scale(&self, k: &BigInt) -> FieldElement {
        let coords = self.coords.iter().map(|c| c * k).collect();
        FieldElement::from_fraction(&self.field, coords, self.den.clone())
            .unwrap_or_else(|_| FieldElement::zero(&self.field))
    }

    pub fn pow(&self, mut e: u64) -> Result<FieldElement, FieldError> {
        let mut result = FieldElement::one(&self.field);
        let mut base = self.clone();
        while e > 0 {
            if e & 1 == 1 {
                result = result.checked_mul(&base)?;
            }
            e >>= 1;
            if e > 0 {
                base = base.checked_mul(&base)?;
            }
        }
        Ok(result)
    }

    /// Image under complex conjugation, when it is known exactly.
    pub fn conjugate(&self) -> Option<FieldElement> {
        match self.field.kind {
            FieldKind::Cyclotomic { order } => {
                let x_inv = FieldElement::generator(&self.field).pow(order - 1).ok()?;
                self.field.evaluate(&self.coords, &self.den, &x_inv).ok()
            }
            _ if self.field.is_totally_real() || self.rational_value().is_some() => Some(self.clone()),
            _ => None,
        }
    }

    /// Whether the element is real under every embedding, when decidable.
    pub fn is_real(&self) -> Option<bool> {
        self.conjugate().map(|c| c == *self)
    }

    /// Value under the embedding sending x to `root`.
    pub fn to_complex(&self, root: Complex64) -> Complex64 {
        let mut acc = Complex64::new(0.0, 0.0);
        for c in self.coords.iter().rev() {
            acc = acc * root + c.to_f64().unwrap_or(f64::NAN);
        }
        acc / self.den.to_f64().unwrap_or(f64::NAN)
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut terms = Vec::new();
        for (i, c) in self.coords.iter().enumerate() {
            if c.is_zero() {
                continue;
            }
            terms.push(match i {
                0 => c.to_string(),
                1 => format!("{}*a", c),
                _ => format!("{}*a^{}", c, i),
            });
        }
        let body = if terms.is_empty() {
            "0".to_string()
        } else {
            terms.join(" + ")
        };
        if self.den.is_one() {
            write!(f, "{}", body)
        } else {
            write!(f, "({})/{}", body, self.den)
        }
    }
}

/// BigInt as a decimal string.
mod bigint_string {
    use num_bigint::BigInt;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Vec<BigInt> as decimal strings.
mod bigint_strings {
    use num_bigint::BigInt;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[BigInt], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|v| v.to_string()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<BigInt>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|s| s.parse().map_err(serde::de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqrt2_field() -> Arc<NumberField> {
        NumberField::generic("Q(sqrt2)", &[-2, 0, 1], true).unwrap()
    }

    #[test]
    fn test_cyclotomic_polynomials() {
        let phi = |n: u64| -> Vec<i64> {
            cyclotomic_polynomial(n).iter().map(|c| c.to_i64().unwrap()).collect()
        };
        assert_eq!(phi(1), vec![-1, 1]);
        assert_eq!(phi(3), vec![1, 1, 1]);
        assert_eq!(phi(4), vec![1, 0, 1]);
        assert_eq!(phi(5), vec![1, 1, 1, 1, 1]);
        assert_eq!(phi(12), vec![1, 0, -1, 0, 1]);
        assert_eq!(NumberField::cyclotomic(6), NumberField::cyclotomic(3));
        assert!(NumberField::cyclotomic(2).is_rational());
    }

    #[test]
    fn test_arithmetic_in_quadratic_field() {
        let k = sqrt2_field();
        let a = FieldElement::generator(&k);
        let two = FieldElement::from_int(&k, 2);
        assert_eq!(a.checked_mul(&a).unwrap(), two);

        // (1 + a)(-1 + a) = a^2 - 1 = 1
        let p = FieldElement::from_integers(&k, &[1, 1]);
        let q = FieldElement::from_integers(&k, &[-1, 1]);
        assert!(p.checked_mul(&q).unwrap().is_one());
        assert!(p.checked_add(&q.neg()).unwrap().checked_sub(&two).unwrap().is_zero());
    }

    #[test]
    fn test_normalization() {
        let q = NumberField::rational();
        let a = FieldElement::from_fraction(&q, vec![BigInt::from(6)], BigInt::from(-4)).unwrap();
        let b = FieldElement::from_fraction(&q, vec![BigInt::from(-3)], BigInt::from(2)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.denominator(), &BigInt::from(2));
        assert_eq!(
            FieldElement::from_fraction(&q, vec![BigInt::zero()], BigInt::from(7)).unwrap(),
            FieldElement::zero(&q)
        );
        assert!(FieldElement::from_fraction(&q, vec![BigInt::one()], BigInt::zero()).is_err());
    }

    #[test]
    fn test_mismatched_fields() {
        let a = FieldElement::one(&sqrt2_field());
        let b = FieldElement::one(&NumberField::cyclotomic(4));
        assert!(matches!(a.checked_mul(&b), Err(FieldError::Mismatch { .. })));
    }

    #[test]
    fn test_roots_of_unity() {
        let k = NumberField::cyclotomic(4);
        let i = k.root_of_unity(RootOfUnity::new(1, 4)).unwrap();
        assert_eq!(i.pow(2).unwrap(), FieldElement::from_int(&k, -1));

        // Q(zeta_3) contains the 6th roots of unity
        let k3 = NumberField::cyclotomic(3);
        let z6 = k3.root_of_unity(RootOfUnity::new(1, 6)).unwrap();
        assert_eq!(z6.pow(3).unwrap(), FieldElement::from_int(&k3, -1));
        assert!(z6.pow(6).unwrap().is_one());

        // ... but not i
        assert!(matches!(
            k3.root_of_unity(RootOfUnity::new(1, 4)),
            Err(FieldError::NoCoercion { .. })
        ));
        // Totally real fields reject non-real roots with a reason
        assert!(matches!(
            sqrt2_field().root_of_unity(RootOfUnity::new(1, 4)),
            Err(FieldError::Incompatible { .. })
        ));
        assert_eq!(
            NumberField::rational().root_of_unity(RootOfUnity::MINUS_ONE).unwrap(),
            FieldElement::from_int(&NumberField::rational(), -1)
        );
    }

    #[test]
    fn test_conversions() {
        let q = NumberField::rational();
        let k4 = NumberField::cyclotomic(4);
        let k12 = NumberField::cyclotomic(12);
        let real = sqrt2_field();

        // Rationals embed everywhere
        let three = FieldElement::from_int(&q, 3);
        assert_eq!(real.convert(&three).unwrap(), FieldElement::from_int(&real, 3));

        // Q(i) -> Q(zeta_12): i = zeta_12^3
        let i = FieldElement::generator(&k4);
        let image = k12.convert(&i).unwrap();
        assert_eq!(image, k12.root_of_unity(RootOfUnity::new(1, 4)).unwrap());

        // Non-real into a totally real field is a reasoned failure
        assert!(matches!(real.convert(&i), Err(FieldError::Incompatible { .. })));

        // Unrelated generic fields have no coercion
        let other = NumberField::generic("Q(sqrt3)", &[-3, 0, 1], true).unwrap();
        let s3 = FieldElement::generator(&other);
        assert!(matches!(real.convert(&s3), Err(FieldError::NoCoercion { .. })));
    }

    #[test]
    fn test_conjugation_and_reality() {
        let k = NumberField::cyclotomic(5);
        let z = FieldElement::generator(&k);
        assert_eq!(z.is_real(), Some(false));
        // zeta + zeta^{-1} is real
        let w = z.checked_add(&z.conjugate().unwrap()).unwrap();
        assert_eq!(w.is_real(), Some(true));
        let odd = NumberField::generic("cubic", &[1, -1, 0, 1], false).unwrap();
        assert_eq!(FieldElement::generator(&odd).is_real(), None);
    }

    #[test]
    fn test_complex_value() {
        let k = sqrt2_field();
        let a = FieldElement::from_integers(&k, &[1, 1]);
        let v = a.to_complex(Complex64::new(2f64.sqrt(), 0.0));
        assert!((v.re - (1.0 + 2f64.sqrt())).abs() < 1e-12);
    }

    #[test]
    fn test_serde_round_trip() {
        let k = NumberField::cyclotomic(12);
        let z = k.root_of_unity(RootOfUnity::new(5, 12)).unwrap();
        let json = serde_json::to_string(&z).unwrap();
        let back: FieldElement = serde_json::from_str(&json).unwrap();
        assert_eq!(back, z);
        assert_eq!(serde_json::to_string(&back).unwrap(), json);
    }
}
