use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for the simulation core.
///
/// Predictors and executors never retry silently: they either return a
/// sentinel (no event) or surface one of these. Stale queue entries are an
/// expected consequence of invalidation and are not errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid user or API parameter.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Unusable configuration detected at `initialise()` (unrecognised
    /// interaction pairing, missing pair range, cutoff larger than half the
    /// primary cell, ...). Not recoverable.
    #[error("configuration error: {0}")]
    Config(String),

    /// A core invariant failed after an event: particle overlap beyond
    /// tolerance, cell-membership mismatch, or time running backward.
    /// Fatal; the simulation transitions to the error status.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Numerical failure (NaN event time, degenerate contact normal,
    /// catastrophic cancellation). Fatal.
    #[error("numerical error: {0}")]
    Numeric(String),

    /// Propagated I/O errors from snapshot save/load.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Propagated snapshot encode/decode errors.
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
