//! Threshold signing module
//!
//! Each quorum member derives a fresh nonce, Shamir-shares it across the
//! quorum and broadcasts its commitment. Summing received nonce shares gives
//! every member a share of the joint nonce, from which it computes a partial
//! response `gamma_i`. Interpolating the gammas yields a plain Ed25519
//! signature under the joint public key.

mod dsg;
mod messages;
mod session;

pub use dsg::{combine_signature, run_signing};
pub use messages::*;
pub use session::{create_nonce_round, SigningSession};

use crate::mpc::RoundState;
use crate::{Error, KeyShare, PartyIndex, Result};
use rand_core::CryptoRngCore;
use std::collections::BTreeMap;

/// Signing state machine for one quorum member
pub struct SigningParty<'a> {
    key_share: &'a KeyShare,
    message: &'a [u8],
    participants: Vec<PartyIndex>,
    state: RoundState,
    session: Option<SigningSession>,
    own_broadcast: Option<NonceBroadcast>,
    broadcasts: BTreeMap<PartyIndex, NonceBroadcast>,
    shares: BTreeMap<PartyIndex, NonceShareMessage>,
}

impl<'a> SigningParty<'a> {
    pub fn new(key_share: &'a KeyShare, message: &'a [u8], participants: &[PartyIndex]) -> Self {
        Self {
            key_share,
            message,
            participants: participants.to_vec(),
            state: RoundState::Uninitialized,
            session: None,
            own_broadcast: None,
            broadcasts: BTreeMap::new(),
            shares: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    /// Open the nonce round; the caller sends the returned messages
    pub fn start<R: CryptoRngCore + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<(NonceBroadcast, Vec<NonceShareMessage>)> {
        if self.state != RoundState::Uninitialized {
            return Err(Error::UnexpectedMessage(format!(
                "signing already started ({:?})",
                self.state
            )));
        }

        let (session, broadcast, shares) =
            create_nonce_round(self.key_share, self.message, &self.participants, rng)?;
        self.participants = session.participants().to_vec();
        self.session = Some(session);
        self.own_broadcast = Some(broadcast.clone());
        self.state = RoundState::AwaitingBroadcast;

        Ok((broadcast, shares))
    }

    /// Record another quorum member's nonce commitment
    pub fn receive_broadcast(&mut self, msg: NonceBroadcast) -> Result<()> {
        if self.state != RoundState::AwaitingBroadcast {
            return Err(Error::UnexpectedMessage(format!(
                "nonce broadcast from party {} in state {:?}",
                msg.party_index, self.state
            )));
        }
        let from = msg.party_index;
        if from == self.key_share.index || !self.participants.contains(&from) {
            return Err(Error::InvalidPartyIndex(from));
        }
        if self.broadcasts.contains_key(&from) {
            return Err(Error::UnexpectedMessage(format!(
                "duplicate nonce broadcast from party {}",
                from
            )));
        }

        self.broadcasts.insert(from, msg);
        if self.broadcasts.len() == self.participants.len() - 1 {
            self.state = RoundState::AwaitingShares;
        }
        Ok(())
    }

    /// Record the nonce share another quorum member dealt to this party
    pub fn receive_share(&mut self, msg: NonceShareMessage) -> Result<()> {
        if self.state != RoundState::AwaitingShares {
            return Err(Error::UnexpectedMessage(format!(
                "nonce share from party {} in state {:?}",
                msg.from, self.state
            )));
        }
        if msg.to != self.key_share.index || !self.broadcasts.contains_key(&msg.from) {
            return Err(Error::InvalidPartyIndex(msg.from));
        }
        if self.shares.contains_key(&msg.from) {
            return Err(Error::UnexpectedMessage(format!(
                "duplicate nonce share from party {}",
                msg.from
            )));
        }

        self.shares.insert(msg.from, msg);
        Ok(())
    }

    /// Consume the nonce session into this party's partial signature
    pub fn partial_signature(&mut self) -> Result<PartialSignature> {
        if self.state != RoundState::AwaitingShares {
            return Err(Error::UnexpectedMessage(format!(
                "cannot sign in state {:?}",
                self.state
            )));
        }
        let session = self
            .session
            .take()
            .ok_or_else(|| Error::UnexpectedMessage("nonce session already used".into()))?;

        let broadcasts: Vec<_> = self.broadcasts.values().cloned().collect();
        let shares: Vec<_> = std::mem::take(&mut self.shares).into_values().collect();
        let partial = session.sign(&broadcasts, &shares)?;
        self.state = RoundState::Complete;

        Ok(partial)
    }

    /// Every nonce broadcast of the quorum, own included
    pub fn all_broadcasts(&self) -> Vec<NonceBroadcast> {
        self.own_broadcast
            .iter()
            .chain(self.broadcasts.values())
            .cloned()
            .collect()
    }
}
