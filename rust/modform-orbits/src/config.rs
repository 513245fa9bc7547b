//! Cache configuration.

use crate::error::{PersistenceError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Precision knobs for the orbit cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Largest coefficient index memoized outside the prime array; also the
    /// q-expansion length used for CM-point values.
    pub working_precision: u64,
    /// Coefficients tabulated per complex embedding.
    pub embedding_precision: u64,
    /// Primes up to this bound get Satake parameters.
    pub satake_bound: u64,
    /// Length of the q-expansion kept with a twist candidate.
    pub twist_q_precision: u64,
    /// Number of Heegner discriminants evaluated for CM-point values.
    pub cm_point_count: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            working_precision: 100,
            embedding_precision: 10,
            satake_bound: 100,
            twist_q_precision: 20,
            cm_point_count: 3,
        }
    }
}

impl CacheConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(PersistenceError::from)?;
        let config = serde_json::from_str(&contents).map_err(PersistenceError::from)?;
        log::info!("Loaded cache config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"working_precision": 40, "cm_point_count": 1}}"#).unwrap();
        let config = CacheConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.working_precision, 40);
        assert_eq!(config.cm_point_count, 1);
        assert_eq!(config.satake_bound, CacheConfig::default().satake_bound);
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CacheConfig::from_json_file(&dir.path().join("absent.json")).is_err());
    }
}
