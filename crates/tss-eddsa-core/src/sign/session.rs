//! Ephemeral per-signature nonce session

use super::{NonceBroadcast, NonceShareMessage, PartialSignature};
use crate::curve::{Point, Scalar};
use crate::shamir::{self, ShamirShare};
use crate::types::check_signers;
use crate::verify::challenge;
use crate::{Error, KeyShare, PartyIndex, Result};
use rand_core::CryptoRngCore;
use std::collections::{BTreeMap, BTreeSet};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Nonce material for exactly one signature.
///
/// Created by [`create_nonce_round`] and consumed by [`SigningSession::sign`];
/// the nonce share cannot be used for a second message.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SigningSession {
    index: PartyIndex,
    #[zeroize(skip)]
    participants: Vec<PartyIndex>,
    message: Vec<u8>,
    #[zeroize(skip)]
    joint_public_key: Point,
    private_share: Scalar,
    /// Own nonce polynomial evaluated at own index
    own_nonce_share: Scalar,
    #[zeroize(skip)]
    nonce_commitment: Point,
}

/// Start signing `message`: derive a fresh nonce, split it across the quorum
/// and produce the round 1 broadcast plus one private share per co-signer.
///
/// The nonce is `SHA512(prefix || message || 64 fresh random bytes) mod L`.
/// There is no way to supply the randomness, so two sessions never share a
/// nonce even for the same message.
pub fn create_nonce_round<R: CryptoRngCore + ?Sized>(
    key_share: &KeyShare,
    message: &[u8],
    participants: &[PartyIndex],
    rng: &mut R,
) -> Result<(SigningSession, NonceBroadcast, Vec<NonceShareMessage>)> {
    let participants = check_signers(key_share, participants)?;
    let quorum = participants.len();

    let mut fresh = Zeroizing::new([0u8; 64]);
    rng.fill_bytes(&mut fresh[..]);
    let prefix = key_share.nonce_prefix.to_bytes();
    let mut nonce = Scalar::hash_from(&[&prefix[..], message, &fresh[..]]);

    let (mut shares, commitments) = shamir::split_with_commitments(
        &nonce,
        quorum,
        quorum,
        Some(participants.as_slice()),
        rng,
    )?;
    nonce.zeroize();

    let mut own_nonce_share = Scalar::ZERO;
    let mut outgoing = Vec::with_capacity(quorum - 1);
    for share in &shares {
        if share.index == key_share.index {
            own_nonce_share = share.value;
        } else {
            outgoing.push(NonceShareMessage {
                from: key_share.index,
                to: share.index,
                share: share.value,
            });
        }
    }
    shares.zeroize();

    let broadcast = NonceBroadcast {
        party_index: key_share.index,
        nonce_commitment: commitments[0],
        commitments,
    };
    let session = SigningSession {
        index: key_share.index,
        participants,
        message: message.to_vec(),
        joint_public_key: key_share.joint_public_key,
        private_share: key_share.private_share,
        own_nonce_share,
        nonce_commitment: broadcast.nonce_commitment,
    };

    Ok((session, broadcast, outgoing))
}

impl SigningSession {
    pub fn index(&self) -> PartyIndex {
        self.index
    }

    /// Quorum indices, ascending
    pub fn participants(&self) -> &[PartyIndex] {
        &self.participants
    }

    pub fn message(&self) -> &[u8] {
        &self.message
    }

    /// Own R_i
    pub fn nonce_commitment(&self) -> &Point {
        &self.nonce_commitment
    }

    fn quorum_not_met(&self, received: usize) -> Error {
        Error::QuorumNotMet {
            required: self.participants.len(),
            actual: received + 1,
        }
    }

    /// Consume the session and produce this party's partial signature.
    ///
    /// Needs exactly one broadcast and one nonce share from every other
    /// participant. A share that does not match its sender's commitments
    /// aborts with [`Error::NonceCommitmentMismatch`].
    pub fn sign(
        self,
        broadcasts: &[NonceBroadcast],
        shares: &[NonceShareMessage],
    ) -> Result<PartialSignature> {
        let quorum = self.participants.len();
        let is_peer = |i: PartyIndex| i != self.index && self.participants.contains(&i);

        let mut by_sender: BTreeMap<PartyIndex, &NonceBroadcast> = BTreeMap::new();
        for msg in broadcasts {
            let from = msg.party_index;
            if !is_peer(from) {
                return Err(Error::InvalidPartyIndex(from));
            }
            if msg.commitments.len() != quorum || msg.commitments[0] != msg.nonce_commitment {
                return Err(Error::NonceCommitmentMismatch { from });
            }
            if by_sender.insert(from, msg).is_some() {
                return Err(Error::UnexpectedMessage(format!(
                    "duplicate nonce broadcast from party {}",
                    from
                )));
            }
        }
        if by_sender.len() != quorum - 1 {
            return Err(self.quorum_not_met(by_sender.len()));
        }

        let mut seen = BTreeSet::new();
        let mut nonce_share = self.own_nonce_share;
        for msg in shares {
            if msg.to != self.index || !is_peer(msg.from) {
                return Err(Error::InvalidPartyIndex(msg.from));
            }
            if !seen.insert(msg.from) {
                return Err(Error::UnexpectedMessage(format!(
                    "duplicate nonce share from party {}",
                    msg.from
                )));
            }
            let commitments = &by_sender[&msg.from].commitments;
            if !shamir::verify_share(&ShamirShare::new(self.index, msg.share), commitments) {
                return Err(Error::NonceCommitmentMismatch { from: msg.from });
            }
            nonce_share += msg.share;
        }
        if seen.len() != quorum - 1 {
            return Err(self.quorum_not_met(seen.len()));
        }

        let r = self.nonce_commitment
            + by_sender
                .values()
                .map(|msg| msg.nonce_commitment)
                .sum::<Point>();
        let k = challenge(&r, &self.joint_public_key, &self.message);
        let gamma = nonce_share + k * self.private_share;
        nonce_share.zeroize();

        Ok(PartialSignature {
            party_index: self.index,
            r,
            gamma,
        })
    }
}
