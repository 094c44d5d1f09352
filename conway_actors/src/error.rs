// error.rs - Error types for world construction, configuration and edits

use thiserror::Error;

/// Errors raised while validating or loading a [`LifeConfig`](crate::LifeConfig).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("seed probability must be within [0, 1], got {0}")]
    InvalidProbability(f64),

    #[error("{0} must be at least 1ms")]
    ZeroInterval(&'static str),

    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),

    #[error("could not parse {name}={value:?}")]
    InvalidVariable { name: &'static str, value: String },
}

/// Errors surfaced by [`World`](crate::World) at its external boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorldError {
    #[error("display reported an empty grid")]
    EmptyGrid,

    #[error("cell ({row}, {col}) is outside the {rows}x{cols} grid")]
    OutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("world has already been bootstrapped")]
    AlreadyBootstrapped,

    #[error(transparent)]
    Config(#[from] ConfigError),
}
