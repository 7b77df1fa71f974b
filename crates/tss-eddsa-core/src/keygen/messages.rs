//! Key generation message types

use crate::curve::{Point, Scalar};
use crate::PartyIndex;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Round 1 message: public contribution, broadcast to every party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeygenRound1Message {
    /// Sender party index
    pub party_index: PartyIndex,
    /// Number of parties the sender was configured with
    pub n_parties: usize,
    /// Threshold the sender was configured with
    pub threshold: usize,
    /// y = u · B
    pub public_contribution: Point,
    /// Feldman commitments to the sender's sharing polynomial (first is `y`)
    pub commitments: Vec<Point>,
    /// Sender's chaincode contribution
    pub chaincode: [u8; 32],
}

/// Round 2 message: the sender's polynomial evaluated at the receiver's index
#[derive(Debug, Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeygenRound2Message {
    /// Sender party index
    pub from: PartyIndex,
    /// Receiver party index
    pub to: PartyIndex,
    /// Secret share, deliver privately
    pub share: Scalar,
}
