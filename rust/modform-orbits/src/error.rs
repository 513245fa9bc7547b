//! Error types.

use crate::labels::SpaceKey;

/// Failures reported by an [`Oracle`](crate::oracle::Oracle).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OracleError {
    #[error("space {key} could not be constructed: {reason}")]
    SpaceConstruction { key: SpaceKey, reason: String },

    #[error("no eigenvalue data for orbit {orbit} at index {index}")]
    PrecisionExceeded { orbit: u64, index: u64 },

    #[error("oracle returned {returned} eigenvalues for orbit {orbit}, {requested} were requested")]
    ShortReply {
        orbit: u64,
        requested: usize,
        returned: usize,
    },

    #[error("unknown orbit id {0}")]
    UnknownOrbit(u64),

    #[error("oracle has no data for {0}")]
    MissingData(String),

    #[error("oracle arithmetic failed: {0}")]
    Arithmetic(String),
}

/// Failures of field arithmetic and conversion.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    /// The value provably has no image in the target field.
    #[error("{from} cannot map into {to}: {reason}")]
    Incompatible {
        from: String,
        to: String,
        reason: String,
    },

    /// No typed map is known between the two fields.
    #[error("no coercion from {from} into {to}")]
    NoCoercion { from: String, to: String },

    #[error("arithmetic between elements of {left} and {right}")]
    Mismatch { left: String, right: String },

    #[error("invalid defining polynomial: {0}")]
    InvalidModulus(String),

    #[error("zero denominator")]
    ZeroDenominator,
}

impl FieldError {
    /// True when the failure proves the compared values differ.
    pub fn is_reasoned(&self) -> bool {
        matches!(self, FieldError::Incompatible { .. })
    }
}

/// Failures of the snapshot store.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Errors surfaced by the orbit cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(
        "dimension mismatch in {key}: new {new} + old {old} != total {total}"
    )]
    DimensionConsistency {
        key: SpaceKey,
        new: u64,
        old: u64,
        total: u64,
    },

    #[error("Atkin-Lehner operator W_{q} has eigenvalues {signs:?} on a single orbit")]
    AtkinLehnerAmbiguity { q: u64, signs: Vec<i8> },

    #[error("no character with index {index} modulo {modulus}")]
    UnknownCharacter { modulus: u64, index: usize },

    #[error("no orbit labelled '{label}' in space {key}")]
    UnknownOrbit { key: SpaceKey, label: String },

    #[error("malformed label '{0}'")]
    Label(String),

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

pub type Result<T> = std::result::Result<T, CacheError>;
