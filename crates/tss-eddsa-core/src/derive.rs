//! Non-hardened child key derivation
//!
//! Each path step computes `HMAC-SHA512(chaincode, A || index)` with the
//! index big-endian. The left half, reduced mod L, tweaks the key and the
//! right half becomes the child chaincode. The tweak depends on public data
//! only, so every party adds it to its own share and any quorum of derived
//! shares signs under `A + tweak · B`.

use crate::curve::{Point, Scalar};
use crate::{Error, Result};
use derivation_path::{ChildIndex, DerivationPath};
use hmac::{Hmac, Mac};
use sha2::Sha512;

/// Public side of a derived key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedKey {
    pub public_key: Point,
    pub chaincode: [u8; 32],
    /// Sum of the tweaks along the path
    pub tweak: Scalar,
}

fn parse_path(path: &str) -> Result<Vec<u32>> {
    let path: DerivationPath = path
        .parse()
        .map_err(|e| Error::Derivation(format!("Invalid path: {}", e)))?;

    path.path()
        .iter()
        .map(|child| match *child {
            ChildIndex::Normal(index) => Ok(index),
            ChildIndex::Hardened(_) => Err(Error::Derivation(
                "Hardened derivation not supported for a shared key".into(),
            )),
        })
        .collect()
}

fn derive_step(
    public_key: &Point,
    chaincode: &[u8; 32],
    index: u32,
) -> Result<(Scalar, [u8; 32])> {
    let mut mac = Hmac::<Sha512>::new_from_slice(chaincode)
        .map_err(|e| Error::Derivation(e.to_string()))?;
    mac.update(&public_key.to_bytes());
    mac.update(&index.to_be_bytes());
    let output = mac.finalize().into_bytes();

    let mut left = [0u8; 32];
    left.copy_from_slice(&output[..32]);
    let mut child_chaincode = [0u8; 32];
    child_chaincode.copy_from_slice(&output[32..]);

    Ok((Scalar::from_bytes_mod_order(left), child_chaincode))
}

/// Walk `path` (e.g. `m/0/1/2`) from a public key and chaincode
pub fn derive_public(public_key: &Point, chaincode: &[u8; 32], path: &str) -> Result<DerivedKey> {
    let mut derived = DerivedKey {
        public_key: *public_key,
        chaincode: *chaincode,
        tweak: Scalar::ZERO,
    };

    for index in parse_path(path)? {
        let (tweak, chaincode) = derive_step(&derived.public_key, &derived.chaincode, index)?;
        derived.public_key = derived.public_key + Point::mul_base(&tweak);
        derived.chaincode = chaincode;
        derived.tweak += tweak;
    }
    if derived.public_key.is_identity() {
        return Err(Error::Derivation(format!("{} derives the identity", path)));
    }

    Ok(derived)
}

/// Hex of `public_key || chaincode`
pub fn encode_keychain(public_key: &Point, chaincode: &[u8; 32]) -> String {
    let mut keychain = Vec::with_capacity(64);
    keychain.extend_from_slice(&public_key.to_bytes());
    keychain.extend_from_slice(chaincode);
    hex::encode(keychain)
}

/// Derive a child common keychain from a parent one, without any secret.
///
/// Both keychains are hex of `public_key || chaincode`; the first 64 hex
/// characters of the result are the child public key.
pub fn derive_unhardened(common_keychain: &str, path: &str) -> Result<String> {
    let bytes = hex::decode(common_keychain)
        .map_err(|e| Error::InvalidEncoding(format!("common keychain: {}", e)))?;
    if bytes.len() != 64 {
        return Err(Error::InvalidEncoding(format!(
            "common keychain must be 64 bytes, got {}",
            bytes.len()
        )));
    }
    let public_key = Point::from_bytes(&bytes[..32])?;
    let mut chaincode = [0u8; 32];
    chaincode.copy_from_slice(&bytes[32..]);

    let derived = derive_public(&public_key, &chaincode, path)?;
    Ok(encode_keychain(&derived.public_key, &derived.chaincode))
}
