//! Shared fixtures for unit tests

use crate::curve::Scalar;
use crate::keygen::{self, combine_key_shares, generate_key_share, SEED_LEN};
use crate::sign::{create_nonce_round, NonceBroadcast, PartialSignature};
use crate::{KeyShare, PartyIndex};
use rand_chacha::ChaCha20Rng;

pub(crate) fn seed_for(index: PartyIndex) -> [u8; SEED_LEN] {
    let mut seed = [index as u8; SEED_LEN];
    seed[32..].copy_from_slice(&[0x10 * index as u8; 32]);
    seed
}

/// Run generate/combine for parties 1..=n in-process, returning (u_j, key shares)
pub(crate) fn local_keygen(
    n: usize,
    t: usize,
    rng: &mut ChaCha20Rng,
) -> (Vec<Scalar>, Vec<KeyShare>) {
    let mut contributions = Vec::new();
    let mut rounds = Vec::new();
    let mut secrets = Vec::new();
    for index in 1..=n {
        let seed = seed_for(index);
        secrets.push(keygen::expand_seed(&seed[..32]).0);
        let (contribution, round1) = generate_key_share(n, t, index, Some(&seed), rng).unwrap();
        contributions.push(contribution);
        rounds.push(round1);
    }

    let shares = contributions
        .into_iter()
        .map(|own| {
            let index = own.index();
            let broadcasts: Vec<_> = rounds
                .iter()
                .filter(|r| r.broadcast.party_index != index)
                .map(|r| r.broadcast.clone())
                .collect();
            let received: Vec<_> = rounds
                .iter()
                .flat_map(|r| r.shares.iter())
                .filter(|s| s.to == index)
                .cloned()
                .collect();
            combine_key_shares(own, &broadcasts, &received).unwrap()
        })
        .collect();

    (secrets, shares)
}

/// Run the nonce round and partial signing in-process for `signers`
pub(crate) fn local_sign(
    shares: &[KeyShare],
    signers: &[PartyIndex],
    message: &[u8],
    rng: &mut ChaCha20Rng,
) -> (Vec<NonceBroadcast>, Vec<PartialSignature>) {
    let mut sessions = Vec::new();
    let mut broadcasts = Vec::new();
    let mut outgoing = Vec::new();
    for &i in signers {
        let (session, broadcast, out) =
            create_nonce_round(&shares[i - 1], message, signers, rng).unwrap();
        sessions.push(session);
        broadcasts.push(broadcast);
        outgoing.extend(out);
    }

    let partials = sessions
        .into_iter()
        .map(|session| {
            let own = session.index();
            let others: Vec<_> = broadcasts
                .iter()
                .filter(|b| b.party_index != own)
                .cloned()
                .collect();
            let received: Vec<_> = outgoing.iter().filter(|m| m.to == own).cloned().collect();
            session.sign(&others, &received).unwrap()
        })
        .collect();

    (broadcasts, partials)
}
