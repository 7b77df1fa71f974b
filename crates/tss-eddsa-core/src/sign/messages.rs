//! Signing message types

use crate::curve::{Point, Scalar};
use crate::PartyIndex;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Round 1 message: nonce commitment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceBroadcast {
    /// Sender party index
    pub party_index: PartyIndex,
    /// R_i = r_i · B
    pub nonce_commitment: Point,
    /// Feldman commitments to the nonce sharing polynomial (first is `R_i`)
    pub commitments: Vec<Point>,
}

/// Round 2 message: the sender's nonce polynomial at the receiver's index
#[derive(Debug, Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct NonceShareMessage {
    /// Sender party index
    pub from: PartyIndex,
    /// Receiver party index
    pub to: PartyIndex,
    /// Nonce share, deliver privately
    pub share: Scalar,
}

/// Round 3 message: partial signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSignature {
    /// Sender party index
    pub party_index: PartyIndex,
    /// Joint nonce commitment the sender signed under
    pub r: Point,
    /// gamma_i = r_i_local + k · private_share_i
    pub gamma: Scalar,
}
