//! Key generation protocol implementation

use super::{KeygenParty, KeygenRound1Message, KeygenRound2Message};
use crate::curve::{Point, Scalar};
use crate::mpc::Relay;
use crate::shamir::{self, ShamirShare};
use crate::{Error, KeyShare, PartyIndex, Result, SessionConfig};
use rand::rngs::OsRng;
use rand_core::CryptoRngCore;
use sha2::{Digest, Sha512};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Length of a key generation seed: 32 secret bytes followed by a chaincode
pub const SEED_LEN: usize = 64;

/// This party's private state between generating and combining shares
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeygenContribution {
    index: PartyIndex,
    n_parties: usize,
    threshold: usize,
    /// Own polynomial evaluated at own index
    own_share: Scalar,
    #[zeroize(skip)]
    public_contribution: Point,
    nonce_prefix: Scalar,
    chaincode: [u8; 32],
}

impl KeygenContribution {
    pub fn index(&self) -> PartyIndex {
        self.index
    }

    /// y = u · B
    pub fn public_contribution(&self) -> &Point {
        &self.public_contribution
    }
}

/// Outgoing material produced by [`generate_key_share`]
#[derive(Debug, Clone)]
pub struct KeygenRound1 {
    /// Broadcast to every other party
    pub broadcast: KeygenRound1Message,
    /// One private message per other party
    pub shares: Vec<KeygenRound2Message>,
}

/// SHA-512 the secret half of a seed into (clamped u, nonce prefix)
pub(crate) fn expand_seed(secret: &[u8]) -> (Scalar, Scalar) {
    let mut digest = Zeroizing::new([0u8; 64]);
    digest.copy_from_slice(&Sha512::digest(secret));

    let mut lower = Zeroizing::new([0u8; 32]);
    let mut upper = Zeroizing::new([0u8; 32]);
    lower.copy_from_slice(&digest[..32]);
    upper.copy_from_slice(&digest[32..]);

    (Scalar::from_clamped(*lower), Scalar::from_bytes_mod_order(*upper))
}

/// Add two big-endian 256-bit integers mod 2^256
fn add_chaincodes(acc: &mut [u8; 32], other: &[u8; 32]) {
    let mut carry = 0u16;
    for (a, b) in acc.iter_mut().rev().zip(other.iter().rev()) {
        let sum = *a as u16 + *b as u16 + carry;
        *a = sum as u8;
        carry = sum >> 8;
    }
}

/// Generate this party's contribution to a fresh joint key.
///
/// `seed` makes `u`, `y`, the nonce prefix and the chaincode reproducible; the
/// sharing polynomial is always drawn from `rng`.
pub fn generate_key_share<R: CryptoRngCore + ?Sized>(
    n_parties: usize,
    threshold: usize,
    index: PartyIndex,
    seed: Option<&[u8; SEED_LEN]>,
    rng: &mut R,
) -> Result<(KeygenContribution, KeygenRound1)> {
    shamir::check_threshold(threshold, n_parties)?;
    if index == 0 || index > n_parties {
        return Err(Error::InvalidPartyIndex(index));
    }

    let mut seed_bytes = Zeroizing::new([0u8; SEED_LEN]);
    match seed {
        Some(seed) => seed_bytes.copy_from_slice(seed),
        None => rng.fill_bytes(&mut seed_bytes[..]),
    }

    let (mut u, nonce_prefix) = expand_seed(&seed_bytes[..32]);
    let mut chaincode = [0u8; 32];
    chaincode.copy_from_slice(&seed_bytes[32..]);

    let (mut shares, commitments) =
        shamir::split_with_commitments(&u, threshold, n_parties, None, rng)?;
    u.zeroize();
    let public_contribution = commitments[0];

    let mut own_share = Scalar::ZERO;
    let mut outgoing = Vec::with_capacity(n_parties - 1);
    for share in &shares {
        if share.index == index {
            own_share = share.value;
        } else {
            outgoing.push(KeygenRound2Message {
                from: index,
                to: share.index,
                share: share.value,
            });
        }
    }
    shares.zeroize();

    let contribution = KeygenContribution {
        index,
        n_parties,
        threshold,
        own_share,
        public_contribution,
        nonce_prefix,
        chaincode,
    };
    let round1 = KeygenRound1 {
        broadcast: KeygenRound1Message {
            party_index: index,
            n_parties,
            threshold,
            public_contribution,
            commitments,
            chaincode,
        },
        shares: outgoing,
    };

    Ok((contribution, round1))
}

fn check_broadcast(own: &KeygenContribution, msg: &KeygenRound1Message) -> Result<()> {
    let from = msg.party_index;
    let inconsistent = |reason: &str| Error::InconsistentShare {
        from,
        reason: reason.to_string(),
    };

    if from == 0 || from > own.n_parties || from == own.index {
        return Err(inconsistent("sender index out of range"));
    }
    if msg.n_parties != own.n_parties || msg.threshold != own.threshold {
        return Err(inconsistent("mismatched n/t parameters"));
    }
    if msg.commitments.len() != own.threshold {
        return Err(inconsistent("wrong number of polynomial commitments"));
    }
    if msg.commitments[0] != msg.public_contribution {
        return Err(inconsistent("commitments do not match public contribution"));
    }
    Ok(())
}

/// Combine own contribution with every other party's broadcast and share.
///
/// Requires exactly one broadcast and one share from each of the other
/// `n - 1` parties. Each share is checked against its sender's commitments.
pub fn combine_key_shares(
    own: KeygenContribution,
    broadcasts: &[KeygenRound1Message],
    shares: &[KeygenRound2Message],
) -> Result<KeyShare> {
    let expected = own.n_parties - 1;

    let mut by_sender: BTreeMap<PartyIndex, &KeygenRound1Message> = BTreeMap::new();
    for msg in broadcasts {
        check_broadcast(&own, msg)?;
        if by_sender.insert(msg.party_index, msg).is_some() {
            return Err(Error::InconsistentShare {
                from: msg.party_index,
                reason: "duplicate broadcast".into(),
            });
        }
    }
    if by_sender.len() != expected {
        return Err(Error::QuorumNotMet {
            required: own.n_parties,
            actual: by_sender.len() + 1,
        });
    }

    let mut seen = BTreeSet::new();
    let mut private_share = own.own_share;
    for msg in shares {
        let commitments = match by_sender.get(&msg.from) {
            Some(broadcast) => &broadcast.commitments,
            None => {
                return Err(Error::InconsistentShare {
                    from: msg.from,
                    reason: "share from party without broadcast".into(),
                })
            }
        };
        if msg.to != own.index {
            return Err(Error::InconsistentShare {
                from: msg.from,
                reason: format!("share addressed to party {}", msg.to),
            });
        }
        if !seen.insert(msg.from) {
            return Err(Error::InconsistentShare {
                from: msg.from,
                reason: "duplicate share".into(),
            });
        }
        if !shamir::verify_share(&ShamirShare::new(own.index, msg.share), commitments) {
            return Err(Error::InconsistentShare {
                from: msg.from,
                reason: "share does not match broadcast commitments".into(),
            });
        }
        private_share += msg.share;
    }
    if seen.len() != expected {
        private_share.zeroize();
        return Err(Error::QuorumNotMet {
            required: own.n_parties,
            actual: seen.len() + 1,
        });
    }

    let joint_public_key = own.public_contribution
        + by_sender
            .values()
            .map(|msg| msg.public_contribution)
            .sum::<Point>();

    let mut chaincode = own.chaincode;
    for msg in by_sender.values() {
        add_chaincodes(&mut chaincode, &msg.chaincode);
    }

    Ok(KeyShare {
        index: own.index,
        n_parties: own.n_parties,
        threshold: own.threshold,
        joint_public_key,
        private_share,
        nonce_prefix: own.nonce_prefix,
        chaincode,
    })
}

/// Run the key generation protocol over a relay
///
/// Round 1 broadcasts the public contribution, round 2 delivers the secret
/// shares, then the party combines locally.
///
/// # Arguments
/// * `config` - Session configuration
/// * `seed` - Optional deterministic seed
/// * `relay` - Message relay for communication
///
/// # Returns
/// The party's key share after successful key generation
#[instrument(skip(seed, relay), fields(party_index = config.party_index))]
pub async fn run_keygen<R: Relay>(
    config: &SessionConfig,
    seed: Option<&[u8; SEED_LEN]>,
    relay: &R,
) -> Result<KeyShare> {
    info!(
        n_parties = config.n_parties,
        threshold = config.threshold,
        "Starting key generation"
    );

    let others: Vec<PartyIndex> = config.others().collect();
    let mut party = KeygenParty::new(config.clone());
    let round1 = party.start(seed, &mut OsRng)?;

    debug!("Keygen round 1: broadcast public contribution");
    relay
        .broadcast(&config.session_id, 1, config.party_index, &round1.broadcast)
        .await?;
    let broadcasts = relay
        .collect_broadcasts::<KeygenRound1Message>(
            &config.session_id,
            1,
            config.party_index,
            &others,
        )
        .await?;
    for msg in broadcasts.into_values() {
        party.receive_broadcast(msg)?;
    }

    debug!("Keygen round 2: secret shares");
    for share in &round1.shares {
        relay
            .send_direct(&config.session_id, 2, config.party_index, share.to, share)
            .await?;
    }
    let shares = relay
        .collect_direct::<KeygenRound2Message>(
            &config.session_id,
            2,
            config.party_index,
            &others,
        )
        .await?;
    for msg in shares.into_values() {
        party.receive_share(msg)?;
    }

    let key_share = party.finalize()?;

    info!(
        public_key = hex::encode(key_share.joint_public_key.to_bytes()),
        "Key generation completed successfully"
    );

    Ok(key_share)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpc::MemoryRelay;
    use crate::testing::{local_keygen, seed_for};
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    #[test]
    fn test_joint_key_reconstructs_from_any_quorum() {
        let mut rng = ChaCha20Rng::seed_from_u64(20);
        let (secrets, shares) = local_keygen(3, 2, &mut rng);
        let joint_secret: Scalar = secrets.iter().copied().sum();

        for pair in [[0, 1], [0, 2], [1, 2]] {
            let subset: Vec<ShamirShare> = pair
                .iter()
                .map(|&i| ShamirShare::new(shares[i].index, shares[i].private_share))
                .collect();
            assert_eq!(shamir::combine(&subset, 2).unwrap(), joint_secret);
        }

        let joint_public_key = Point::mul_base(&joint_secret);
        for share in &shares {
            assert_eq!(share.joint_public_key, joint_public_key);
            assert_eq!(share.chaincode, shares[0].chaincode);
        }
        assert_ne!(shares[0].nonce_prefix, shares[1].nonce_prefix);
    }

    #[test]
    fn test_seed_is_reproducible() {
        let mut rng = ChaCha20Rng::seed_from_u64(21);
        let seed = seed_for(1);
        let (a, _) = generate_key_share(3, 2, 1, Some(&seed), &mut rng).unwrap();
        let (b, _) = generate_key_share(3, 2, 1, Some(&seed), &mut rng).unwrap();

        assert_eq!(a.public_contribution(), b.public_contribution());
        assert_eq!(a.nonce_prefix, b.nonce_prefix);
        assert_eq!(a.chaincode, seed[32..]);
    }

    #[test]
    fn test_chaincodes_sum_mod_2_256() {
        let mut acc = [0xff; 32];
        let mut one = [0u8; 32];
        one[31] = 1;
        add_chaincodes(&mut acc, &one);
        assert_eq!(acc, [0u8; 32]);

        let mut acc = [0u8; 32];
        acc[31] = 0xff;
        add_chaincodes(&mut acc, &one);
        assert_eq!(acc[30..], [1, 0]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(22);
        assert!(matches!(
            generate_key_share(3, 2, 0, None, &mut rng),
            Err(Error::InvalidPartyIndex(0))
        ));
        assert!(matches!(
            generate_key_share(3, 2, 5, None, &mut rng),
            Err(Error::InvalidPartyIndex(5))
        ));
        assert!(matches!(
            generate_key_share(3, 4, 1, None, &mut rng),
            Err(Error::ThresholdViolation(_))
        ));
    }

    #[test]
    fn test_tampered_share_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(23);
        let (own, _) = generate_key_share(3, 2, 1, None, &mut rng).unwrap();
        let (_, from2) = generate_key_share(3, 2, 2, None, &mut rng).unwrap();
        let (_, from3) = generate_key_share(3, 2, 3, None, &mut rng).unwrap();

        let mut share2 = from2.shares.iter().find(|s| s.to == 1).unwrap().clone();
        share2.share = share2.share + Scalar::ONE;
        let share3 = from3.shares.iter().find(|s| s.to == 1).unwrap().clone();

        let result = combine_key_shares(
            own,
            &[from2.broadcast.clone(), from3.broadcast.clone()],
            &[share2, share3],
        );
        assert!(matches!(result, Err(Error::InconsistentShare { from: 2, .. })));
    }

    #[test]
    fn test_broadcast_not_matching_commitments_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(24);
        let (own, _) = generate_key_share(3, 2, 1, None, &mut rng).unwrap();
        let (_, from2) = generate_key_share(3, 2, 2, None, &mut rng).unwrap();
        let (_, from3) = generate_key_share(3, 2, 3, None, &mut rng).unwrap();

        let mut forged = from3.broadcast.clone();
        forged.public_contribution = from2.broadcast.public_contribution;

        let shares: Vec<_> = [&from2, &from3]
            .iter()
            .flat_map(|r| r.shares.iter())
            .filter(|s| s.to == 1)
            .cloned()
            .collect();
        let result = combine_key_shares(own, &[from2.broadcast.clone(), forged], &shares);
        assert!(matches!(result, Err(Error::InconsistentShare { from: 3, .. })));
    }

    #[test]
    fn test_mismatched_parameters_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(25);
        let (own, _) = generate_key_share(3, 2, 1, None, &mut rng).unwrap();
        let (_, from2) = generate_key_share(3, 3, 2, None, &mut rng).unwrap();

        let result = combine_key_shares(own, &[from2.broadcast.clone()], &[]);
        assert!(matches!(result, Err(Error::InconsistentShare { from: 2, .. })));
    }

    #[test]
    fn test_duplicate_and_missing_contributions_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(26);
        let (own, _) = generate_key_share(3, 2, 1, None, &mut rng).unwrap();
        let (_, from2) = generate_key_share(3, 2, 2, None, &mut rng).unwrap();
        let share2 = from2.shares.iter().find(|s| s.to == 1).unwrap().clone();

        let duplicated = [from2.broadcast.clone(), from2.broadcast.clone()];
        let result = combine_key_shares(own, &duplicated, &[share2.clone()]);
        assert!(matches!(result, Err(Error::InconsistentShare { from: 2, .. })));

        let (own, _) = generate_key_share(3, 2, 1, None, &mut rng).unwrap();
        let result = combine_key_shares(own, &[from2.broadcast.clone()], &[share2]);
        assert!(matches!(
            result,
            Err(Error::QuorumNotMet { required: 3, actual: 2 })
        ));
    }

    #[tokio::test]
    async fn test_run_keygen_over_relay() {
        let relay = MemoryRelay::new();
        let session_id = [7u8; 32];

        let handles: Vec<_> = (1..=3)
            .map(|index| {
                let relay = relay.clone();
                tokio::spawn(async move {
                    let config = SessionConfig::new(session_id, 3, 2, index)?;
                    run_keygen(&config, None, &relay).await
                })
            })
            .collect();

        let mut shares = Vec::new();
        for handle in handles {
            shares.push(handle.await.unwrap().unwrap());
        }

        assert!(shares
            .iter()
            .all(|s| s.joint_public_key == shares[0].joint_public_key));
        let subset = [
            ShamirShare::new(shares[0].index, shares[0].private_share),
            ShamirShare::new(shares[2].index, shares[2].private_share),
        ];
        let joint_secret = shamir::combine(&subset, 2).unwrap();
        assert_eq!(Point::mul_base(&joint_secret), shares[0].joint_public_key);
    }
}
