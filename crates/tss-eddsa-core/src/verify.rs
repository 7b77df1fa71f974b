//! Stateless Ed25519 verification against the joint public key

use crate::curve::{Point, Scalar};
use crate::{Result, Signature};

/// Ed25519 challenge `k = SHA512(R || A || M) mod L`
pub fn challenge(r: &Point, public_key: &Point, message: &[u8]) -> Scalar {
    Scalar::hash_from(&[&r.to_bytes()[..], &public_key.to_bytes()[..], message])
}

/// Accept iff `sigma · B == R + k · A`
pub fn verify(message: &[u8], signature: &Signature, public_key: &Point) -> bool {
    let k = challenge(&signature.r, public_key, message);
    // sigma · B - k · A
    public_key.vartime_double_mul_base(&-k, &signature.sigma) == signature.r
}

/// [`verify`] over wire encodings. Malformed bytes are an error, a wrong
/// signature is `Ok(false)`.
pub fn verify_bytes(message: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool> {
    let signature = Signature::from_bytes(signature)?;
    let public_key = Point::from_bytes(public_key)?;
    Ok(verify(message, &signature, &public_key))
}
