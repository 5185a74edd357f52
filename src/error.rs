use std::io;

use thiserror::Error;

/// Rejected cache geometry. Only ever produced while building a hierarchy.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{level}: {field} must be non-zero")]
    ZeroDimension { level: String, field: &'static str },

    #[error("{level}: capacity {capacity} is not a multiple of block_size * assoc = {set_bytes}")]
    NotDivisible {
        level: String,
        capacity: usize,
        set_bytes: usize,
    },

    #[error("{level}: geometry is too large to simulate")]
    TooLarge { level: String },

    #[error("a hierarchy needs at least one cache level")]
    NoLevels,

    #[error("{level}: block size {found} differs from the {expected} used by the level above")]
    BlockSizeMismatch {
        level: String,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("invalid access type {0:?}, expected 'r' or 'w'")]
    InvalidType(char),
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("trace i/o: {0}")]
    Io(#[from] io::Error),

    #[error("trace line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// Everything the driver can fail with.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("reference {index}: {source}")]
    Access {
        index: u64,
        #[source]
        source: AccessError,
    },

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error("arguments: {0}")]
    Args(#[from] pico_args::Error),

    #[error("config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{0}")]
    Usage(&'static str),
}
