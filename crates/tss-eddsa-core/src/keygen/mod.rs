//! Key generation module
//!
//! Every party samples a private contribution `u`, Shamir-splits it to the
//! others and broadcasts `y = u · B`. The joint key is the sum of all `y`;
//! each party's key share is the sum of the shares it received, so the joint
//! private scalar `sum(u)` is never assembled anywhere.

mod dkg;
mod messages;

#[cfg(test)]
pub(crate) use dkg::expand_seed;
pub use dkg::{
    combine_key_shares, generate_key_share, run_keygen, KeygenContribution, KeygenRound1,
    SEED_LEN,
};
pub use messages::*;

use crate::mpc::RoundState;
use crate::{Error, KeyShare, PartyIndex, Result, SessionConfig};
use rand_core::CryptoRngCore;
use std::collections::BTreeMap;

/// Key generation state machine for one party
pub struct KeygenParty {
    config: SessionConfig,
    state: RoundState,
    contribution: Option<KeygenContribution>,
    broadcasts: BTreeMap<PartyIndex, KeygenRound1Message>,
    shares: BTreeMap<PartyIndex, KeygenRound2Message>,
}

impl KeygenParty {
    /// Create a new key generation party
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: RoundState::Uninitialized,
            contribution: None,
            broadcasts: BTreeMap::new(),
            shares: BTreeMap::new(),
        }
    }

    /// Get current state
    pub fn state(&self) -> RoundState {
        self.state
    }

    /// Generate own contribution; the caller sends the returned messages
    pub fn start<R: CryptoRngCore + ?Sized>(
        &mut self,
        seed: Option<&[u8; SEED_LEN]>,
        rng: &mut R,
    ) -> Result<KeygenRound1> {
        if self.state != RoundState::Uninitialized {
            return Err(Error::UnexpectedMessage(format!(
                "keygen already started ({:?})",
                self.state
            )));
        }

        let (contribution, round1) = generate_key_share(
            self.config.n_parties,
            self.config.threshold,
            self.config.party_index,
            seed,
            rng,
        )?;
        self.contribution = Some(contribution);
        self.state = RoundState::AwaitingBroadcast;

        Ok(round1)
    }

    /// Record another party's round 1 broadcast
    pub fn receive_broadcast(&mut self, msg: KeygenRound1Message) -> Result<()> {
        if self.state != RoundState::AwaitingBroadcast {
            return Err(Error::UnexpectedMessage(format!(
                "broadcast from party {} in state {:?}",
                msg.party_index, self.state
            )));
        }
        let from = msg.party_index;
        if from == self.config.party_index || !self.config.parties.contains(&from) {
            return Err(Error::InvalidPartyIndex(from));
        }
        if self.broadcasts.contains_key(&from) {
            return Err(Error::InconsistentShare {
                from,
                reason: "duplicate broadcast".into(),
            });
        }

        self.broadcasts.insert(from, msg);
        if self.broadcasts.len() == self.config.parties.len() - 1 {
            self.state = RoundState::AwaitingShares;
        }
        Ok(())
    }

    /// Record another party's round 2 share
    pub fn receive_share(&mut self, msg: KeygenRound2Message) -> Result<()> {
        if self.state != RoundState::AwaitingShares {
            return Err(Error::UnexpectedMessage(format!(
                "share from party {} in state {:?}",
                msg.from, self.state
            )));
        }
        if msg.to != self.config.party_index || !self.broadcasts.contains_key(&msg.from) {
            return Err(Error::InvalidPartyIndex(msg.from));
        }
        if self.shares.contains_key(&msg.from) {
            return Err(Error::InconsistentShare {
                from: msg.from,
                reason: "duplicate share".into(),
            });
        }

        self.shares.insert(msg.from, msg);
        Ok(())
    }

    /// Combine everything received into this party's key share
    pub fn finalize(&mut self) -> Result<KeyShare> {
        if self.state != RoundState::AwaitingShares {
            return Err(Error::UnexpectedMessage(format!(
                "cannot finalize keygen in state {:?}",
                self.state
            )));
        }
        let expected = self.config.parties.len() - 1;
        if self.shares.len() != expected {
            return Err(Error::QuorumNotMet {
                required: self.config.parties.len(),
                actual: self.shares.len() + 1,
            });
        }
        let contribution = self
            .contribution
            .take()
            .ok_or_else(|| Error::UnexpectedMessage("missing own contribution".into()))?;

        let broadcasts: Vec<_> = std::mem::take(&mut self.broadcasts).into_values().collect();
        let shares: Vec<_> = std::mem::take(&mut self.shares).into_values().collect();
        let key_share = combine_key_shares(contribution, &broadcasts, &shares)?;
        self.state = RoundState::Complete;

        Ok(key_share)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    fn parties(n: usize, t: usize) -> Vec<KeygenParty> {
        (1..=n)
            .map(|i| KeygenParty::new(SessionConfig::new([3; 32], n, t, i).unwrap()))
            .collect()
    }

    #[test]
    fn test_state_machine_happy_path() {
        let mut rng = ChaCha20Rng::seed_from_u64(30);
        let mut parties = parties(3, 2);
        let rounds: Vec<_> = parties
            .iter_mut()
            .map(|p| p.start(None, &mut rng).unwrap())
            .collect();
        assert!(parties.iter().all(|p| p.state() == RoundState::AwaitingBroadcast));

        for party in parties.iter_mut() {
            let own = party.config.party_index;
            for round in rounds.iter().filter(|r| r.broadcast.party_index != own) {
                party.receive_broadcast(round.broadcast.clone()).unwrap();
            }
            assert_eq!(party.state(), RoundState::AwaitingShares);
            for share in rounds.iter().flat_map(|r| r.shares.iter()).filter(|s| s.to == own) {
                party.receive_share(share.clone()).unwrap();
            }
        }

        let shares: Vec<KeyShare> = parties.iter_mut().map(|p| p.finalize().unwrap()).collect();
        assert!(parties.iter().all(|p| p.state() == RoundState::Complete));
        assert_eq!(shares[0].joint_public_key, shares[2].joint_public_key);
        assert!(matches!(
            parties[0].finalize(),
            Err(Error::UnexpectedMessage(_))
        ));
    }

    #[test]
    fn test_out_of_order_messages_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(31);
        let mut parties = parties(3, 2);
        let round2 = parties[1].start(None, &mut rng).unwrap();

        // not started yet
        assert!(matches!(
            parties[0].receive_broadcast(round2.broadcast.clone()),
            Err(Error::UnexpectedMessage(_))
        ));

        parties[0].start(None, &mut rng).unwrap();
        let share = round2.shares.iter().find(|s| s.to == 1).unwrap().clone();
        assert!(matches!(
            parties[0].receive_share(share),
            Err(Error::UnexpectedMessage(_))
        ));

        parties[0].receive_broadcast(round2.broadcast.clone()).unwrap();
        assert!(matches!(
            parties[0].receive_broadcast(round2.broadcast.clone()),
            Err(Error::InconsistentShare { from: 2, .. })
        ));
        assert!(matches!(
            parties[0].finalize(),
            Err(Error::UnexpectedMessage(_))
        ));
    }
}
