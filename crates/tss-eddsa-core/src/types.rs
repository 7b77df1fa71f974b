//! Core types for threshold EdDSA

use crate::curve::{Point, Scalar};
use crate::{derive, shamir, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Index of a party in [1, n]. Zero is the free term of a sharing polynomial.
pub type PartyIndex = usize;

/// Unique identifier for a protocol run, agreed on out of band
pub type SessionId = [u8; 32];

/// Ed25519 signature (R, sigma)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Joint nonce commitment
    pub r: Point,
    /// Interpolated response scalar
    pub sigma: Scalar,
}

impl Signature {
    pub fn new(r: Point, sigma: Scalar) -> Self {
        Self { r, sigma }
    }

    /// Standard Ed25519 layout (R || sigma)
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.r.to_bytes());
        bytes[32..].copy_from_slice(&self.sigma.to_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 64 {
            return Err(Error::InvalidEncoding(format!(
                "signature must be 64 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            r: Point::from_bytes(&bytes[..32])?,
            sigma: Scalar::from_bytes(&bytes[32..])?,
        })
    }

    /// Convert into an `ed25519-dalek` signature.
    pub fn to_dalek(&self) -> ed25519_dalek::Signature {
        ed25519_dalek::Signature::from_bytes(&self.to_bytes())
    }
}

/// Key share held by a party after key generation
#[derive(Debug, Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyShare {
    /// This party's index
    pub index: PartyIndex,

    /// Total number of parties
    pub n_parties: usize,

    /// Threshold
    pub threshold: usize,

    /// Joint public key, identical across all shares of one run
    #[zeroize(skip)]
    pub joint_public_key: Point,

    /// Evaluation of the joint sharing polynomial at `index`
    pub private_share: Scalar,

    /// Local-only input to nonce derivation
    pub nonce_prefix: Scalar,

    /// Joint chaincode, identical across all shares of one run
    pub chaincode: [u8; 32],
}

impl KeyShare {
    /// Joint public key as an `ed25519-dalek` verifying key
    pub fn verifying_key(&self) -> Result<ed25519_dalek::VerifyingKey> {
        ed25519_dalek::VerifyingKey::from_bytes(&self.joint_public_key.to_bytes())
            .map_err(|e| Error::InvalidEncoding(e.to_string()))
    }

    /// Hex of `joint_public_key || chaincode`
    pub fn common_keychain(&self) -> String {
        derive::encode_keychain(&self.joint_public_key, &self.chaincode)
    }

    /// Derive a child key share using non-hardened derivation along `path`
    ///
    /// Every party applies the same public tweak to its own share, so the
    /// derived shares of any quorum sign under the derived public key.
    pub fn derive_child(&self, path: &str) -> Result<KeyShare> {
        let derived = derive::derive_public(&self.joint_public_key, &self.chaincode, path)?;

        let mut child = self.clone();
        child.private_share += derived.tweak;
        child.joint_public_key = derived.public_key;
        child.chaincode = derived.chaincode;
        Ok(child)
    }
}

/// Configuration for keygen/signing sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session identifier
    pub session_id: SessionId,

    /// Number of parties
    pub n_parties: usize,

    /// Threshold (t-of-n)
    pub threshold: usize,

    /// This party's index
    pub party_index: PartyIndex,

    /// Participating party indices, ascending
    pub parties: Vec<PartyIndex>,
}

impl SessionConfig {
    /// Configuration for a key generation run over parties 1..=n
    pub fn new(
        session_id: SessionId,
        n_parties: usize,
        threshold: usize,
        party_index: PartyIndex,
    ) -> Result<Self> {
        shamir::check_threshold(threshold, n_parties)?;
        if party_index == 0 || party_index > n_parties {
            return Err(Error::InvalidPartyIndex(party_index));
        }

        Ok(Self {
            session_id,
            n_parties,
            threshold,
            party_index,
            parties: (1..=n_parties).collect(),
        })
    }

    /// Configuration for a signing run among `signers`
    pub fn for_signing(
        session_id: SessionId,
        key_share: &KeyShare,
        signers: &[PartyIndex],
    ) -> Result<Self> {
        Ok(Self {
            session_id,
            n_parties: key_share.n_parties,
            threshold: key_share.threshold,
            party_index: key_share.index,
            parties: check_signers(key_share, signers)?,
        })
    }

    /// All participants except this party
    pub fn others(&self) -> impl Iterator<Item = PartyIndex> + '_ {
        self.parties
            .iter()
            .copied()
            .filter(move |&i| i != self.party_index)
    }
}

/// Validate a signing quorum for `key_share`, returning it in ascending order
pub(crate) fn check_signers(key_share: &KeyShare, signers: &[PartyIndex]) -> Result<Vec<PartyIndex>> {
    let parties: BTreeSet<PartyIndex> = signers.iter().copied().collect();
    if parties.len() != signers.len() {
        return Err(Error::ThresholdViolation("duplicate signer index".into()));
    }
    if let Some(&bad) = parties
        .iter()
        .find(|&&i| i == 0 || i > key_share.n_parties)
    {
        return Err(Error::InvalidPartyIndex(bad));
    }
    if !parties.contains(&key_share.index) {
        return Err(Error::InvalidPartyIndex(key_share.index));
    }
    if parties.len() < key_share.threshold {
        return Err(Error::QuorumNotMet {
            required: key_share.threshold,
            actual: parties.len(),
        });
    }
    Ok(parties.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_share(index: PartyIndex) -> KeyShare {
        KeyShare {
            index,
            n_parties: 3,
            threshold: 2,
            joint_public_key: Point::mul_base(&Scalar::from(9u64)),
            private_share: Scalar::from(5u64),
            nonce_prefix: Scalar::from(6u64),
            chaincode: [7u8; 32],
        }
    }

    #[test]
    fn test_session_config_validation() {
        assert!(SessionConfig::new([0; 32], 3, 2, 1).is_ok());
        assert!(matches!(
            SessionConfig::new([0; 32], 3, 4, 1),
            Err(Error::ThresholdViolation(_))
        ));
        assert!(matches!(
            SessionConfig::new([0; 32], 3, 1, 1),
            Err(Error::ThresholdViolation(_))
        ));
        assert!(matches!(
            SessionConfig::new([0; 32], 3, 2, 0),
            Err(Error::InvalidPartyIndex(0))
        ));
        assert!(matches!(
            SessionConfig::new([0; 32], 3, 2, 4),
            Err(Error::InvalidPartyIndex(4))
        ));
    }

    #[test]
    fn test_signing_config() {
        let share = key_share(3);
        let config = SessionConfig::for_signing([1; 32], &share, &[3, 1]).unwrap();
        assert_eq!(config.parties, vec![1, 3]);
        assert_eq!(config.others().collect::<Vec<_>>(), vec![1]);

        assert!(matches!(
            SessionConfig::for_signing([1; 32], &share, &[3]),
            Err(Error::QuorumNotMet { required: 2, actual: 1 })
        ));
        assert!(matches!(
            SessionConfig::for_signing([1; 32], &share, &[1, 2]),
            Err(Error::InvalidPartyIndex(3))
        ));
        assert!(matches!(
            SessionConfig::for_signing([1; 32], &share, &[3, 5]),
            Err(Error::InvalidPartyIndex(5))
        ));
        assert!(matches!(
            SessionConfig::for_signing([1; 32], &share, &[3, 3]),
            Err(Error::ThresholdViolation(_))
        ));
    }

    #[test]
    fn test_signature_bytes() {
        let sig = Signature::new(Point::mul_base(&Scalar::from(3u64)), Scalar::from(4u64));
        let bytes = sig.to_bytes();
        assert_eq!(Signature::from_bytes(&bytes).unwrap(), sig);
        assert_eq!(sig.to_dalek().to_bytes(), bytes);
        assert!(Signature::from_bytes(&bytes[..63]).is_err());
    }

    #[test]
    fn test_common_keychain() {
        let share = key_share(1);
        let keychain = share.common_keychain();
        assert_eq!(keychain.len(), 128);
        assert!(keychain.ends_with(&"07".repeat(32)));
        assert_eq!(
            share.verifying_key().unwrap().to_bytes(),
            share.joint_public_key.to_bytes()
        );
    }
}
