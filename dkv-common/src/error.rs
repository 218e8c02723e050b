//! # Error Types
//!
//! Shared error enum for the engine and the server.
//!
//! ## Design Principles
//!
//! 1. **Small Surface**: Only the failures callers can act on get a variant.
//! 2. **Stable Codes**: `code()` maps every variant to a fixed number so the
//!    value can be logged or compared without matching on strings.
//! 3. **Misses Are Not Errors**: Lookups return `Option`; the store accepts
//!    any key and value, so its operations only fail in backends that do IO.

use thiserror::Error;

/// Result alias used across the workspace.
pub type DkvResult<T> = Result<T, DkvError>;

/// Errors surfaced by the store and the server setup path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DkvError {
    /// Startup configuration could not be accepted.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// IO failure, carried as text so the enum stays `Clone + Eq`.
    #[error("io error: {0}")]
    Io(String),
}

impl DkvError {
    /// Returns the stable numeric code for this error.
    pub fn code(&self) -> u16 {
        match self {
            DkvError::InvalidConfig(_) => 1,
            DkvError::Io(_) => 2,
        }
    }
}

impl From<std::io::Error> for DkvError {
    fn from(err: std::io::Error) -> Self {
        DkvError::Io(err.to_string())
    }
}
