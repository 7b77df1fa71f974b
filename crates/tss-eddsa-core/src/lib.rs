//! # TSS EdDSA Core
//!
//! Threshold Ed25519 signing: t-of-n parties jointly hold a signing key that
//! no single party ever knows, and any quorum of at least t of them produces
//! a standard Ed25519 signature.
//!
//! This crate provides:
//! - Prime-order field and Edwards group arithmetic
//! - Shamir secret sharing with Feldman commitments
//! - Distributed key generation
//! - Threshold signing
//! - Non-hardened child key derivation
//! - Stateless verification
//!
//! ## Example
//!
//! ```rust,ignore
//! use tss_eddsa_core::{keygen, sign, SessionConfig};
//!
//! // Run distributed key generation
//! let config = SessionConfig::new(session_id, 3, 2, party_index)?;
//! let key_share = keygen::run_keygen(&config, None, &relay).await?;
//!
//! // Sign a message with parties 1 and 3
//! let config = SessionConfig::for_signing(sign_session_id, &key_share, &[1, 3])?;
//! let signature = sign::run_signing(&key_share, b"hello", &config, &relay).await?;
//! ```

pub mod curve;
pub mod derive;
pub mod error;
pub mod keygen;
pub mod mpc;
pub mod shamir;
pub mod sign;
pub mod types;
pub mod verify;

#[cfg(test)]
mod testing;

pub use curve::{Point, Scalar};
pub use error::{Error, Result};
pub use types::{KeyShare, PartyIndex, SessionConfig, SessionId, Signature};
pub use verify::verify;

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default threshold for a 3-party setup
pub const DEFAULT_THRESHOLD: usize = 2;

/// Default number of parties
pub const DEFAULT_PARTIES: usize = 3;
