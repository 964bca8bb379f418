//! Error types for the core crate.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Raw transaction or script could not be decoded.
    #[error("Failed to decode transaction: {0}")]
    Decode(String),

    /// A protocol field required to rebuild the signed message is missing.
    #[error("Missing protocol field: {0}")]
    MissingField(&'static str),

    /// The signing address is not a valid P2PKH address.
    #[error("Invalid signing address: {0}")]
    InvalidAddress(String),

    /// The signature bytes are not a compact recoverable signature.
    #[error("Invalid message signature: {0}")]
    InvalidSignature(String),

    /// Public key recovery or address comparison failed.
    #[error("Signature verification failed: {0}")]
    Verification(String),
}

/// Result type alias for CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;
