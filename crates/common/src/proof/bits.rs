//! Pedersen bit commitments with CDS OR-proofs.
//!
//! For a bit `b` and blinding `r` the commitment is `C = b·G + r·H`. The OR
//! proof shows that either `C` or `C - G` is a multiple of `H` alone, which
//! forces `b ∈ {0,1}` without revealing which branch is real. The prover
//! simulates the other branch; branch selection uses `subtle` so the bit does
//! not steer control flow.

use std::sync::OnceLock;

use curve25519_dalek::constants::{RISTRETTO_BASEPOINT_POINT, RISTRETTO_BASEPOINT_TABLE};
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoBasepointTable, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};

use super::transcript::Transcript;
use super::ProofError;

const H_LABEL: &[u8] = b"vaultline-pedersen-blinding-generator";

static H_TABLE: OnceLock<RistrettoBasepointTable> = OnceLock::new();

/// Second generator with unknown discrete log relative to `G`.
fn h_table() -> &'static RistrettoBasepointTable {
    H_TABLE.get_or_init(|| {
        let digest = Sha512::digest(H_LABEL);
        let mut wide = [0u8; 64];
        wide.copy_from_slice(&digest);
        RistrettoBasepointTable::create(&RistrettoPoint::from_uniform_bytes(&wide))
    })
}

pub(crate) fn mul_g(scalar: &Scalar) -> RistrettoPoint {
    scalar * RISTRETTO_BASEPOINT_TABLE
}

pub(crate) fn mul_h(scalar: &Scalar) -> RistrettoPoint {
    scalar * h_table()
}

pub(crate) fn random_scalar() -> Result<Scalar, ProofError> {
    let mut wide = [0u8; 64];
    getrandom::getrandom(&mut wide)
        .map_err(|e| anyhow::anyhow!("failed to generate proof randomness: {}", e))?;
    Ok(Scalar::from_bytes_mod_order_wide(&wide))
}

/// Parse a canonical scalar, folding validity into a `Choice`.
pub(crate) fn parse_scalar(bytes: &[u8; 32]) -> (Choice, Scalar) {
    let parsed = Scalar::from_canonical_bytes(*bytes);
    (parsed.is_some(), parsed.unwrap_or(Scalar::ZERO))
}

/// Decompress a point, folding validity into a `Choice`.
pub(crate) fn parse_point(bytes: &[u8; 32]) -> (Choice, RistrettoPoint) {
    match CompressedRistretto(*bytes).decompress() {
        Some(point) => (Choice::from(1), point),
        None => (Choice::from(0), RistrettoPoint::identity()),
    }
}

/// Secret opening of one bit commitment, kept by the prover.
pub(crate) struct BitOpening {
    pub bit: Choice,
    pub blinding: Scalar,
    pub commitment: RistrettoPoint,
}

impl BitOpening {
    pub fn commit(bit: u8) -> Result<Self, ProofError> {
        let bit = Choice::from(bit & 1);
        let blinding = random_scalar()?;
        let value = RistrettoPoint::conditional_select(
            &RistrettoPoint::identity(),
            &RISTRETTO_BASEPOINT_POINT,
            bit,
        );
        Ok(Self {
            bit,
            blinding,
            commitment: value + mul_h(&blinding),
        })
    }
}

/// Non-interactive proof that one commitment hides a bit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitProof {
    pub commitment: [u8; 32],
    pub c0: [u8; 32],
    pub c1: [u8; 32],
    pub z0: [u8; 32],
    pub z1: [u8; 32],
}

fn bit_transcript(
    base: &Transcript,
    index: usize,
    commitment: &CompressedRistretto,
    a0: &RistrettoPoint,
    a1: &RistrettoPoint,
) -> Scalar {
    let mut transcript = base.clone();
    transcript.append_u64(b"bit-index", index as u64);
    transcript.append_point(b"bit-commitment", commitment);
    transcript.append_point(b"a0", &a0.compress());
    transcript.append_point(b"a1", &a1.compress());
    transcript.challenge(b"bit-challenge")
}

impl BitProof {
    pub(crate) fn prove(
        base: &Transcript,
        index: usize,
        opening: &BitOpening,
    ) -> Result<Self, ProofError> {
        let bit = opening.bit;
        let commitment = opening.commitment;
        let y0 = commitment;
        let y1 = commitment - RISTRETTO_BASEPOINT_POINT;

        let nonce = random_scalar()?;
        let fake_challenge = random_scalar()?;
        let fake_response = random_scalar()?;

        // The simulated branch is the one the bit does not select.
        let y_fake = RistrettoPoint::conditional_select(&y1, &y0, bit);
        let a_real = mul_h(&nonce);
        let a_fake = mul_h(&fake_response) - fake_challenge * y_fake;

        let a0 = RistrettoPoint::conditional_select(&a_real, &a_fake, bit);
        let a1 = RistrettoPoint::conditional_select(&a_fake, &a_real, bit);

        let compressed = commitment.compress();
        let challenge = bit_transcript(base, index, &compressed, &a0, &a1);
        let real_challenge = challenge - fake_challenge;
        let real_response = nonce + real_challenge * opening.blinding;

        let c0 = Scalar::conditional_select(&real_challenge, &fake_challenge, bit);
        let c1 = Scalar::conditional_select(&fake_challenge, &real_challenge, bit);
        let z0 = Scalar::conditional_select(&real_response, &fake_response, bit);
        let z1 = Scalar::conditional_select(&fake_response, &real_response, bit);

        Ok(Self {
            commitment: compressed.to_bytes(),
            c0: c0.to_bytes(),
            c1: c1.to_bytes(),
            z0: z0.to_bytes(),
            z1: z1.to_bytes(),
        })
    }

    /// Returns the validity of this bit proof and the decompressed commitment.
    ///
    /// Always performs the full computation, even for malformed input.
    pub(crate) fn verify(&self, base: &Transcript, index: usize) -> (Choice, RistrettoPoint) {
        let (point_ok, commitment) = parse_point(&self.commitment);
        let (c0_ok, c0) = parse_scalar(&self.c0);
        let (c1_ok, c1) = parse_scalar(&self.c1);
        let (z0_ok, z0) = parse_scalar(&self.z0);
        let (z1_ok, z1) = parse_scalar(&self.z1);

        let y0 = commitment;
        let y1 = commitment - RISTRETTO_BASEPOINT_POINT;
        let a0 = mul_h(&z0) - c0 * y0;
        let a1 = mul_h(&z1) - c1 * y1;

        let challenge = bit_transcript(
            base,
            index,
            &CompressedRistretto(self.commitment),
            &a0,
            &a1,
        );
        let sums = (c0 + c1).ct_eq(&challenge);

        (
            point_ok & c0_ok & c1_ok & z0_ok & z1_ok & sums,
            commitment,
        )
    }
}
