//! Space keys and orbit labels.
//!
//! Orbits are labelled by their position in the Oracle's decomposition order:
//! position i gets the letter for i mod 26, followed by the decimal digits of
//! i / 26 when that quotient is nonzero (0 -> "a", 25 -> "z", 26 -> "a1",
//! 27 -> "b1", 52 -> "a2"). The order is never re-sorted; labels stay stable
//! exactly as long as the Oracle's ordering does.

use crate::error::CacheError;
use crate::oracle::Orbit;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a space S_k(N, chi): level, weight and character index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpaceKey {
    pub level: u64,
    pub weight: u64,
    pub character_index: usize,
}

impl SpaceKey {
    pub fn new(level: u64, weight: u64, character_index: usize) -> Self {
        SpaceKey {
            level,
            weight,
            character_index,
        }
    }
}

impl fmt::Display for SpaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.level, self.weight, self.character_index)
    }
}

impl FromStr for SpaceKey {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(CacheError::Label(s.to_string()));
        }
        let bad = || CacheError::Label(s.to_string());
        let level: u64 = parts[0].parse().map_err(|_| bad())?;
        let weight: u64 = parts[1].parse().map_err(|_| bad())?;
        let character_index: usize = parts[2].parse().map_err(|_| bad())?;
        if level == 0 || weight == 0 {
            return Err(bad());
        }
        Ok(SpaceKey::new(level, weight, character_index))
    }
}

/// Label of the orbit at position `i` in decomposition order.
pub fn orbit_label(i: usize) -> String {
    let letter = (b'a' + (i % 26) as u8) as char;
    let round = i / 26;
    if round == 0 {
        letter.to_string()
    } else {
        format!("{}{}", letter, round)
    }
}

/// Labels for a decomposition, in the order given.
pub fn label_orbits(orbits: &[Orbit]) -> Vec<String> {
    (0..orbits.len()).map(orbit_label).collect()
}

/// Inverse of [`orbit_label`].
pub fn label_index(label: &str) -> Option<usize> {
    let mut chars = label.chars();
    let letter = chars.next()?;
    if !letter.is_ascii_lowercase() {
        return None;
    }
    let rest = chars.as_str();
    let round = if rest.is_empty() {
        0
    } else {
        if rest.starts_with('0') || !rest.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        rest.parse::<usize>().ok()?
    };
    Some(round * 26 + (letter as u8 - b'a') as usize)
}

/// A full newform-orbit label `{level}.{weight}.{characterIndex}.{label}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FormLabel {
    pub key: SpaceKey,
    pub orbit: String,
}

impl fmt::Display for FormLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.key, self.orbit)
    }
}

impl FromStr for FormLabel {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (space, orbit) = s
            .rsplit_once('.')
            .ok_or_else(|| CacheError::Label(s.to_string()))?;
        let key: SpaceKey = space.parse().map_err(|_| CacheError::Label(s.to_string()))?;
        if label_index(orbit).is_none() {
            return Err(CacheError::Label(s.to_string()));
        }
        Ok(FormLabel {
            key,
            orbit: orbit.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_first_labels() {
        let labels: Vec<String> = (0..4).map(orbit_label).collect();
        assert_eq!(labels, vec!["a", "b", "c", "d"]);
        assert_eq!(orbit_label(25), "z");
        assert_eq!(orbit_label(26), "a1");
        assert_eq!(orbit_label(27), "b1");
        assert_eq!(orbit_label(52), "a2");
        assert_eq!(orbit_label(26 * 11 + 2), "c11");
    }

    #[test]
    fn test_label_index_inverse() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..500 {
            let i = rng.gen_range(0..100_000usize);
            assert_eq!(label_index(&orbit_label(i)), Some(i));
        }
        assert_eq!(label_index("a0"), None);
        assert_eq!(label_index("A"), None);
        assert_eq!(label_index("b01"), None);
        assert_eq!(label_index(""), None);
    }

    #[test]
    fn test_space_key_round_trip() {
        let key: SpaceKey = "39.2.0".parse().unwrap();
        assert_eq!(key, SpaceKey::new(39, 2, 0));
        assert_eq!(key.to_string(), "39.2.0");
        assert!("39.2".parse::<SpaceKey>().is_err());
        assert!("0.2.0".parse::<SpaceKey>().is_err());
    }

    #[test]
    fn test_form_label() {
        let label: FormLabel = "11.2.0.a".parse().unwrap();
        assert_eq!(label.key, SpaceKey::new(11, 2, 0));
        assert_eq!(label.orbit, "a");
        assert_eq!(label.to_string(), "11.2.0.a");
        let label: FormLabel = "176.2.0.c1".parse().unwrap();
        assert_eq!(label.orbit, "c1");
        assert!("11.2.0.7".parse::<FormLabel>().is_err());
    }
}
