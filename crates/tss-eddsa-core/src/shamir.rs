//! Shamir secret sharing over the Ed25519 scalar field
//!
//! Shares are evaluations of a random degree-(t-1) polynomial whose free term
//! is the secret. Dealers may also publish Feldman commitments to the
//! coefficients so receivers can check their share without learning anything
//! about the secret beyond `secret · B`.

use crate::curve::{Point, Scalar};
use crate::{Error, PartyIndex, Result};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// One evaluation of a sharing polynomial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct ShamirShare {
    /// Evaluation point
    pub index: PartyIndex,
    /// f(index)
    pub value: Scalar,
}

impl ShamirShare {
    pub fn new(index: PartyIndex, value: Scalar) -> Self {
        Self { index, value }
    }
}

/// Secret polynomial of degree t-1, zeroized on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Polynomial {
    coefficients: Vec<Scalar>,
}

impl Polynomial {
    /// Random polynomial with `f(0) = secret`
    pub fn random<R: CryptoRngCore + ?Sized>(
        secret: &Scalar,
        threshold: usize,
        rng: &mut R,
    ) -> Self {
        let mut coefficients = Vec::with_capacity(threshold);
        coefficients.push(*secret);
        for _ in 1..threshold {
            coefficients.push(Scalar::random(rng));
        }
        Self { coefficients }
    }

    /// Evaluate at `x` (Horner)
    pub fn evaluate(&self, x: PartyIndex) -> Scalar {
        let x = Scalar::from(x as u64);
        self.coefficients
            .iter()
            .rev()
            .fold(Scalar::ZERO, |acc, coef| acc * x + *coef)
    }

    /// Feldman commitments `a_k · B`; the first entry commits to the secret
    pub fn commitments(&self) -> Vec<Point> {
        self.coefficients.iter().map(Point::mul_base).collect()
    }
}

/// Check `2 <= threshold <= n`
pub fn check_threshold(threshold: usize, n: usize) -> Result<()> {
    if threshold < 2 {
        return Err(Error::ThresholdViolation(format!(
            "threshold must be at least 2, got {}",
            threshold
        )));
    }
    if threshold > n {
        return Err(Error::ThresholdViolation(format!(
            "threshold {} exceeds number of shares {}",
            threshold, n
        )));
    }
    Ok(())
}

fn check_indices(indices: &[PartyIndex]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for &index in indices {
        if index == 0 {
            return Err(Error::InvalidPartyIndex(0));
        }
        if !seen.insert(index) {
            return Err(Error::ThresholdViolation(format!(
                "duplicate share index {}",
                index
            )));
        }
    }
    Ok(())
}

/// Split `secret` into `n` shares, any `threshold` of which reconstruct it.
///
/// Shares are evaluated at `indices` when given (exactly `n` distinct non-zero
/// values), at `1..=n` otherwise.
pub fn split<R: CryptoRngCore + ?Sized>(
    secret: &Scalar,
    threshold: usize,
    n: usize,
    indices: Option<&[PartyIndex]>,
    rng: &mut R,
) -> Result<Vec<ShamirShare>> {
    split_with_commitments(secret, threshold, n, indices, rng).map(|(shares, _)| shares)
}

/// [`split`], also returning the Feldman commitments of the polynomial
pub fn split_with_commitments<R: CryptoRngCore + ?Sized>(
    secret: &Scalar,
    threshold: usize,
    n: usize,
    indices: Option<&[PartyIndex]>,
    rng: &mut R,
) -> Result<(Vec<ShamirShare>, Vec<Point>)> {
    check_threshold(threshold, n)?;
    let indices: Vec<PartyIndex> = match indices {
        Some(indices) => {
            if indices.len() != n {
                return Err(Error::ThresholdViolation(format!(
                    "expected {} indices, got {}",
                    n,
                    indices.len()
                )));
            }
            check_indices(indices)?;
            indices.to_vec()
        }
        None => (1..=n).collect(),
    };

    let polynomial = Polynomial::random(secret, threshold, rng);
    let shares = indices
        .iter()
        .map(|&index| ShamirShare::new(index, polynomial.evaluate(index)))
        .collect();

    Ok((shares, polynomial.commitments()))
}

/// Lagrange basis coefficient of `index` over `indices`, evaluated at zero
pub fn lagrange_coefficient(index: PartyIndex, indices: &[PartyIndex]) -> Result<Scalar> {
    let x_i = Scalar::from(index as u64);
    let mut numerator = Scalar::ONE;
    let mut denominator = Scalar::ONE;

    for &other in indices.iter().filter(|&&j| j != index) {
        let x_j = Scalar::from(other as u64);
        numerator = numerator * x_j;
        denominator = denominator * (x_j - x_i);
    }

    Ok(numerator * denominator.invert()?)
}

/// Reconstruct f(0) from at least `threshold` shares with distinct indices
pub fn combine(shares: &[ShamirShare], threshold: usize) -> Result<Scalar> {
    if threshold < 2 {
        return Err(Error::ThresholdViolation(format!(
            "threshold must be at least 2, got {}",
            threshold
        )));
    }
    if shares.len() < threshold {
        return Err(Error::ThresholdViolation(format!(
            "need {} shares to combine, got {}",
            threshold,
            shares.len()
        )));
    }

    let indices: Vec<PartyIndex> = shares.iter().map(|s| s.index).collect();
    check_indices(&indices)?;

    shares.iter().try_fold(Scalar::ZERO, |acc, share| {
        Ok(acc + share.value * lagrange_coefficient(share.index, &indices)?)
    })
}

/// Check `share.value · B == sum_k C_k · index^k`
pub fn verify_share(share: &ShamirShare, commitments: &[Point]) -> bool {
    if commitments.is_empty() || share.index == 0 {
        return false;
    }
    let x = Scalar::from(share.index as u64);
    let expected = commitments
        .iter()
        .rev()
        .fold(Point::identity(), |acc, c| acc * x + *c);

    Point::mul_base(&share.value) == expected
}
