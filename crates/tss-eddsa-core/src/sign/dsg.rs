//! Signing protocol implementation

use crate::curve::Point;
use crate::mpc::Relay;
use crate::shamir::{self, ShamirShare};
use crate::{verify, Error, KeyShare, PartyIndex, Result, SessionConfig, Signature};
use rand::rngs::OsRng;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

use super::{NonceBroadcast, NonceShareMessage, PartialSignature, SigningParty};

/// Interpolate the partial signatures of a quorum into a signature.
///
/// `threshold` is the key's t. The quorum is the set of senders in
/// `nonce_broadcasts`; `R` is recomputed from them and every partial must
/// carry the same `R`. Fewer than t partials, or fewer partials than quorum
/// members, is a [`Error::ThresholdViolation`].
pub fn combine_signature(
    nonce_broadcasts: &[NonceBroadcast],
    partials: &[PartialSignature],
    threshold: usize,
) -> Result<Signature> {
    if partials.len() < threshold {
        return Err(Error::ThresholdViolation(format!(
            "need {} partial signatures, got {}",
            threshold,
            partials.len()
        )));
    }

    let mut quorum: BTreeMap<PartyIndex, Point> = BTreeMap::new();
    for msg in nonce_broadcasts {
        if quorum.insert(msg.party_index, msg.nonce_commitment).is_some() {
            return Err(Error::UnexpectedMessage(format!(
                "duplicate nonce broadcast from party {}",
                msg.party_index
            )));
        }
    }
    if quorum.len() < threshold {
        return Err(Error::QuorumNotMet {
            required: threshold,
            actual: quorum.len(),
        });
    }
    if partials.len() < quorum.len() {
        return Err(Error::ThresholdViolation(format!(
            "{} of {} quorum members contributed",
            partials.len(),
            quorum.len()
        )));
    }
    let r: Point = quorum.values().copied().sum();

    let mut gammas = Vec::with_capacity(partials.len());
    for partial in partials {
        if !quorum.contains_key(&partial.party_index) {
            return Err(Error::InvalidPartyIndex(partial.party_index));
        }
        if partial.r != r {
            return Err(Error::NonceCommitmentMismatch {
                from: partial.party_index,
            });
        }
        gammas.push(ShamirShare::new(partial.party_index, partial.gamma));
    }

    let sigma = shamir::combine(&gammas, quorum.len())?;
    Ok(Signature::new(r, sigma))
}

/// Run the signing protocol over a relay
///
/// Round 1 broadcasts the nonce commitment, round 2 delivers the nonce
/// shares, round 3 broadcasts partial signatures which every party combines
/// and verifies against the joint public key.
///
/// # Arguments
/// * `key_share` - This party's key share from key generation
/// * `message` - Message to sign, unhashed
/// * `config` - Signing session configuration, see [`SessionConfig::for_signing`]
/// * `relay` - Message relay for communication
///
/// # Returns
/// The Ed25519 signature
#[instrument(skip(key_share, message, relay), fields(party_index = config.party_index))]
pub async fn run_signing<R: Relay>(
    key_share: &KeyShare,
    message: &[u8],
    config: &SessionConfig,
    relay: &R,
) -> Result<Signature> {
    info!(participants = ?config.parties, "Starting signing");

    if config.party_index != key_share.index {
        return Err(Error::InvalidPartyIndex(config.party_index));
    }
    let others: Vec<PartyIndex> = config.others().collect();
    let mut party = SigningParty::new(key_share, message, &config.parties);
    let (broadcast, shares) = party.start(&mut OsRng)?;

    debug!("Signing round 1: nonce commitment");
    relay
        .broadcast(&config.session_id, 1, config.party_index, &broadcast)
        .await?;
    let broadcasts = relay
        .collect_broadcasts::<NonceBroadcast>(
            &config.session_id,
            1,
            config.party_index,
            &others,
        )
        .await?;
    for msg in broadcasts.into_values() {
        party.receive_broadcast(msg)?;
    }

    debug!("Signing round 2: nonce shares");
    for share in &shares {
        relay
            .send_direct(&config.session_id, 2, config.party_index, share.to, share)
            .await?;
    }
    drop(shares);
    let received = relay
        .collect_direct::<NonceShareMessage>(
            &config.session_id,
            2,
            config.party_index,
            &others,
        )
        .await?;
    for msg in received.into_values() {
        party.receive_share(msg)?;
    }

    debug!("Signing round 3: partial signatures");
    let partial = party.partial_signature()?;
    relay
        .broadcast(&config.session_id, 3, config.party_index, &partial)
        .await?;
    let mut partials: Vec<PartialSignature> = relay
        .collect_broadcasts::<PartialSignature>(
            &config.session_id,
            3,
            config.party_index,
            &others,
        )
        .await?
        .into_values()
        .collect();
    partials.push(partial);

    let signature = combine_signature(&party.all_broadcasts(), &partials, key_share.threshold)?;
    if !verify(message, &signature, &key_share.joint_public_key) {
        warn!("Combined signature does not verify");
        return Err(Error::InvalidSignature);
    }

    info!(
        r = hex::encode(signature.r.to_bytes()),
        sigma = hex::encode(signature.sigma.to_bytes()),
        "Signing completed successfully"
    );

    Ok(signature)
}
