//! Ed25519 scalar and point arithmetic
//!
//! Thin newtypes over `curve25519-dalek` that fix the wire encoding (32 bytes,
//! little-endian scalars and compressed Edwards points) and map malformed
//! input onto [`Error::InvalidEncoding`]. All scalar operations are constant
//! time; only [`Point`] equality on public values and verification use
//! variable-time routines.

use crate::{Error, Result};
use curve25519_dalek::{
    constants::ED25519_BASEPOINT_TABLE,
    edwards::{CompressedEdwardsY, EdwardsPoint},
    scalar::{clamp_integer, Scalar as DalekScalar},
    traits::Identity,
};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Length of an encoded scalar or point
pub const ENCODED_LEN: usize = 32;

/// Element of the Ed25519 scalar field, always fully reduced mod L.
#[derive(Clone, Copy, Default, Eq, Zeroize)]
pub struct Scalar(DalekScalar);

impl Scalar {
    pub const ZERO: Scalar = Scalar(DalekScalar::ZERO);
    pub const ONE: Scalar = Scalar(DalekScalar::ONE);

    /// Decode a canonical little-endian scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let array: [u8; ENCODED_LEN] = bytes.try_into().map_err(|_| {
            Error::InvalidEncoding(format!("scalar must be 32 bytes, got {}", bytes.len()))
        })?;
        Option::<DalekScalar>::from(DalekScalar::from_canonical_bytes(array))
            .map(Scalar)
            .ok_or_else(|| Error::InvalidEncoding("scalar is not reduced mod L".into()))
    }

    /// Reduce a 64-byte little-endian integer mod L.
    pub fn from_bytes_wide(bytes: &[u8; 64]) -> Self {
        Scalar(DalekScalar::from_bytes_mod_order_wide(bytes))
    }

    /// Reduce a 32-byte little-endian integer mod L.
    pub fn from_bytes_mod_order(bytes: [u8; ENCODED_LEN]) -> Self {
        Scalar(DalekScalar::from_bytes_mod_order(bytes))
    }

    /// Apply standard EdDSA clamping to `bytes` and reduce mod L.
    pub fn from_clamped(bytes: [u8; ENCODED_LEN]) -> Self {
        Scalar(DalekScalar::from_bytes_mod_order(clamp_integer(bytes)))
    }

    /// Sample a uniformly random scalar.
    pub fn random<R: CryptoRngCore + ?Sized>(rng: &mut R) -> Self {
        Scalar(DalekScalar::random(rng))
    }

    /// SHA-512 over the concatenation of `parts`, reduced mod L.
    pub fn hash_from(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha512::new();
        for part in parts {
            hasher.update(part);
        }
        let mut wide = [0u8; 64];
        wide.copy_from_slice(&hasher.finalize());
        let scalar = Self::from_bytes_wide(&wide);
        wide.zeroize();
        scalar
    }

    pub fn to_bytes(&self) -> [u8; ENCODED_LEN] {
        self.0.to_bytes()
    }

    /// Multiplicative inverse mod L.
    pub fn invert(&self) -> Result<Self> {
        if self.is_zero() {
            return Err(Error::NotInvertible);
        }
        Ok(Scalar(self.0.invert()))
    }

    pub fn is_zero(&self) -> bool {
        bool::from(self.0.ct_eq(&DalekScalar::ZERO))
    }

    pub(crate) fn inner(&self) -> &DalekScalar {
        &self.0
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        Scalar(DalekScalar::from(value))
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        bool::from(self.0.ct_eq(&other.0))
    }
}

impl ConstantTimeEq for Scalar {
    fn ct_eq(&self, other: &Self) -> subtle::Choice {
        self.0.ct_eq(&other.0)
    }
}

// Secret material must never end up in logs.
impl fmt::Debug for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Scalar(..)")
    }
}

impl Add for Scalar {
    type Output = Scalar;

    fn add(self, rhs: Scalar) -> Scalar {
        Scalar(self.0 + rhs.0)
    }
}

impl AddAssign for Scalar {
    fn add_assign(&mut self, rhs: Scalar) {
        self.0 += rhs.0;
    }
}

impl Sub for Scalar {
    type Output = Scalar;

    fn sub(self, rhs: Scalar) -> Scalar {
        Scalar(self.0 - rhs.0)
    }
}

impl Mul for Scalar {
    type Output = Scalar;

    fn mul(self, rhs: Scalar) -> Scalar {
        Scalar(self.0 * rhs.0)
    }
}

impl Neg for Scalar {
    type Output = Scalar;

    fn neg(self) -> Scalar {
        Scalar(-self.0)
    }
}

impl Sum for Scalar {
    fn sum<I: Iterator<Item = Scalar>>(iter: I) -> Scalar {
        iter.fold(Scalar::ZERO, |acc, s| acc + s)
    }
}

impl Serialize for Scalar {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        Scalar::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Ed25519 group element.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Point(EdwardsPoint);

impl Point {
    /// Decode a canonical compressed Edwards point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let array: [u8; ENCODED_LEN] = bytes.try_into().map_err(|_| {
            Error::InvalidEncoding(format!("point must be 32 bytes, got {}", bytes.len()))
        })?;
        let point = CompressedEdwardsY(array)
            .decompress()
            .ok_or_else(|| Error::InvalidEncoding("bytes do not decode to a curve point".into()))?;
        if point.compress().to_bytes() != array {
            return Err(Error::InvalidEncoding("non-canonical point encoding".into()));
        }
        Ok(Point(point))
    }

    pub fn identity() -> Self {
        Point(EdwardsPoint::identity())
    }

    /// `scalar · B` using the precomputed base point table.
    pub fn mul_base(scalar: &Scalar) -> Self {
        Point(ED25519_BASEPOINT_TABLE * scalar.inner())
    }

    pub fn to_bytes(&self) -> [u8; ENCODED_LEN] {
        self.0.compress().to_bytes()
    }

    pub fn is_identity(&self) -> bool {
        self.0 == EdwardsPoint::identity()
    }

    /// `a · self + b · B`. Variable time, public inputs only.
    pub(crate) fn vartime_double_mul_base(&self, a: &Scalar, b: &Scalar) -> Self {
        Point(EdwardsPoint::vartime_double_scalar_mul_basepoint(
            a.inner(),
            &self.0,
            b.inner(),
        ))
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point({})", hex::encode(self.to_bytes()))
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point(self.0 + rhs.0)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point(self.0 - rhs.0)
    }
}

impl Mul<Scalar> for Point {
    type Output = Point;

    fn mul(self, rhs: Scalar) -> Point {
        Point(self.0 * rhs.0)
    }
}

impl Sum for Point {
    fn sum<I: Iterator<Item = Point>>(iter: I) -> Point {
        iter.fold(Point::identity(), |acc, p| acc + p)
    }
}

impl Serialize for Point {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for Point {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        Point::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}
