//! Errors raised by primitive conversions.

use thiserror::Error;

/// Result alias for primitive conversions.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures converting text into primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The text is not a UUID.
    #[error("invalid request id: {source}")]
    InvalidRequestId {
        /// Parse failure reported by `uuid`.
        #[from]
        source: uuid::Error,
    },
}
