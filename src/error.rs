//! Error types for cabinet_queue.

use thiserror::Error;

/// Errors surfaced to callers of the engine.
///
/// Only invalid requests escape the public operations. Insufficient data and
/// training failures degrade to documented fallbacks instead.
#[derive(Debug, Error)]
pub enum Error {
    /// A branch must have at least one cabinet.
    #[error("branch capacity must be at least one cabinet")]
    ZeroCapacity,

    /// An identifier that the operation requires was empty.
    #[error("{what} must not be empty")]
    EmptyIdentifier { what: &'static str },

    /// Partner suggestions were requested outside the supported range.
    #[error("neighbour count {k} is outside 1..={max}")]
    InvalidNeighbourCount { k: usize, max: usize },

    /// Engine configuration values are inconsistent.
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },

    /// The regression model could not be fitted.
    #[error("training failed: {reason}")]
    Training { reason: String },

    /// Configuration or request payload could not be parsed.
    #[error("invalid payload: {0}")]
    Config(#[from] serde_json::Error),

    /// Logging could not be installed.
    #[error("logging setup failed: {0}")]
    Logging(String),
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if the error describes a rejected request rather than an
    /// internal condition.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::ZeroCapacity
                | Error::EmptyIdentifier { .. }
                | Error::InvalidNeighbourCount { .. }
                | Error::InvalidConfig { .. }
                | Error::Config(_)
        )
    }
}
