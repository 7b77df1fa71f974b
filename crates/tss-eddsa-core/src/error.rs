//! Error types for threshold EdDSA operations

use crate::PartyIndex;
use thiserror::Error;

/// Result type alias for threshold EdDSA operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during key generation, signing or verification.
///
/// Every variant aborts the current operation. None of them carry secret
/// scalar values.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed scalar or point bytes
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Attempted to invert the zero scalar
    #[error("Scalar is not invertible")]
    NotInvertible,

    /// Threshold parameters or share count out of range
    #[error("Threshold violation: {0}")]
    ThresholdViolation(String),

    /// A key generation contribution does not match its sender's broadcast
    #[error("Inconsistent share from party {from}: {reason}")]
    InconsistentShare { from: PartyIndex, reason: String },

    /// Not enough live participants to make progress
    #[error("Quorum not met: required {required}, got {actual}")]
    QuorumNotMet { required: usize, actual: usize },

    /// A nonce share does not match the sender's broadcast commitment
    #[error("Nonce commitment mismatch from party {from}")]
    NonceCommitmentMismatch { from: PartyIndex },

    /// Party index outside [1, n] or not part of the session
    #[error("Invalid party index: {0}")]
    InvalidPartyIndex(PartyIndex),

    /// Message received in a round state that cannot accept it
    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Network/relay error
    #[error("Relay error: {0}")]
    Relay(String),

    /// Timeout waiting for message
    #[error("Timeout waiting for {0}")]
    Timeout(String),

    /// Child key derivation failed
    #[error("Derivation error: {0}")]
    Derivation(String),

    /// Combined signature failed verification
    #[error("Invalid signature")]
    InvalidSignature,
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
