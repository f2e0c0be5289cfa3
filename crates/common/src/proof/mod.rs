//! Zero-knowledge proof of knowledge of critical bytes
//!
//! The prover shows it holds critical bytes `x` behind a public signal
//! `commit(x)` without revealing `x`. The relation is a Fiat-Shamir sigma
//! protocol over Ristretto255:
//!
//! - witness `w = SHA-256(domain || salt || x)` truncated to 248 bits
//! - one Pedersen commitment `C_i = b_i·G + r_i·H` per witness bit, each with
//!   an OR-proof that `b_i ∈ {0,1}`
//! - the witness key `W = w·G`
//! - a Schnorr proof that `Σ 2^i·C_i - W` is a multiple of `H` alone, tying the
//!   bits to `W`
//!
//! Every challenge is drawn from a transcript that has absorbed the schema
//! version, the public signal, the salt, `W` and all bit commitments, so a
//! proof produced for one commitment never verifies against another.
//!
//! The sigma protocol alone only shows knowledge of *some* `w` behind `W`.
//! What ties `W` to `x` is the anchor `commit(salt || W)`, which the owner
//! registers next to the critical bytes commitment. [`ProofSystem::verify`]
//! requires both, so a verifier holding only the public commitment cannot be
//! fooled by a proof over a witness of the forger's choosing. Anyone who
//! later learns `x` (a grantee after unwrapping) can recompute `W` with
//! [`ProofPackage::binds`].

mod bits;
mod transcript;

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::crypto::{Commitment, CriticalBytes};

pub use bits::BitProof;
use bits::{mul_g, mul_h, parse_point, parse_scalar, random_scalar, BitOpening};
use transcript::Transcript;

/// Current wire schema of [`ProofPackage`].
pub const PROOF_SCHEMA_VERSION: u16 = 1;
/// Number of witness bits committed to.
pub const WITNESS_BITS: usize = 248;
/// Size of the proof salt in bytes.
pub const SALT_SIZE: usize = 32;

const WITNESS_DOMAIN: &[u8] = b"vaultline-proof-witness-v1";
const PROTOCOL_LABEL: &[u8] = b"vaultline-critical-knowledge";
const ANCHOR_DOMAIN: &[u8] = b"vaultline-proof-anchor-v1";

#[derive(Debug, thiserror::Error)]
pub enum ProofError {
    #[error("malformed proof package: {0}")]
    Malformed(String),
    #[error("unsupported proof schema version {0}")]
    UnsupportedSchema(u16),
    #[error("proof worker failed: {0}")]
    Worker(String),
    #[error("proof error: {0}")]
    Default(#[from] anyhow::Error),
}

/// The sigma proof itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeProof {
    /// Compressed `W = w·G`.
    pub witness_key: [u8; 32],
    pub bits: Vec<BitProof>,
    /// Schnorr challenge and response for the blinding sum.
    pub challenge: [u8; 32],
    pub response: [u8; 32],
}

/// Stored proof artifact: `{ schema_version, public_signal, salt, proof }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofPackage {
    pub schema_version: u16,
    pub public_signal: Commitment,
    pub salt: [u8; SALT_SIZE],
    pub proof: KnowledgeProof,
}

impl ProofPackage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProofError> {
        bincode::serialize(self).map_err(|e| ProofError::Malformed(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProofError> {
        let package: ProofPackage =
            bincode::deserialize(bytes).map_err(|e| ProofError::Malformed(e.to_string()))?;
        if package.schema_version != PROOF_SCHEMA_VERSION {
            return Err(ProofError::UnsupportedSchema(package.schema_version));
        }
        Ok(package)
    }

    /// Commitment to the salt and witness key, registered with the file.
    pub fn anchor(&self) -> Commitment {
        Commitment::commit_parts(&[ANCHOR_DOMAIN, &self.salt, &self.proof.witness_key])
    }

    /// Whether `critical` is the witness this package was proven for.
    pub fn binds(&self, critical: &[u8]) -> bool {
        let w = witness_scalar(critical, &self.salt);
        let key = mul_g(&w).compress();
        key.as_bytes().ct_eq(&self.proof.witness_key).into()
    }
}

fn witness_bytes(critical: &[u8], salt: &[u8; SALT_SIZE]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(WITNESS_DOMAIN);
    hasher.update(salt);
    hasher.update(critical);
    let mut bytes: [u8; 32] = hasher.finalize().into();
    // 248 bits keeps the witness canonical without reduction.
    bytes[31] = 0;
    bytes
}

fn witness_scalar(critical: &[u8], salt: &[u8; SALT_SIZE]) -> Scalar {
    Scalar::from_bytes_mod_order(witness_bytes(critical, salt))
}

fn base_transcript(
    public_signal: &Commitment,
    salt: &[u8; SALT_SIZE],
    witness_key: &[u8; 32],
    bit_commitments: &[[u8; 32]],
) -> Transcript {
    let mut transcript = Transcript::new(PROTOCOL_LABEL);
    transcript.append_u64(b"schema-version", PROOF_SCHEMA_VERSION as u64);
    transcript.append(b"public-signal", public_signal.as_bytes());
    transcript.append(b"salt", salt);
    transcript.append(b"witness-key", witness_key);
    transcript.append_u64(b"bit-count", bit_commitments.len() as u64);
    for commitment in bit_commitments {
        transcript.append(b"bit-commitment", commitment);
    }
    transcript
}

/// Stateless prover / verifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProofSystem;

impl ProofSystem {
    pub fn generate_salt() -> Result<[u8; SALT_SIZE], ProofError> {
        let mut salt = [0u8; SALT_SIZE];
        getrandom::getrandom(&mut salt)
            .map_err(|e| anyhow::anyhow!("failed to generate salt: {}", e))?;
        Ok(salt)
    }

    /// Prove knowledge of `critical` on the current thread.
    pub fn prove_blocking(
        critical: &[u8],
        salt: [u8; SALT_SIZE],
    ) -> Result<ProofPackage, ProofError> {
        Self::prove_witness(
            Commitment::commit(critical),
            salt,
            witness_bytes(critical, &salt),
        )
    }

    fn prove_witness(
        public_signal: Commitment,
        salt: [u8; SALT_SIZE],
        witness: [u8; 32],
    ) -> Result<ProofPackage, ProofError> {
        let w = Scalar::from_bytes_mod_order(witness);
        let witness_key = mul_g(&w).compress().to_bytes();

        let mut openings = Vec::with_capacity(WITNESS_BITS);
        for index in 0..WITNESS_BITS {
            let bit = (witness[index / 8] >> (index % 8)) & 1;
            openings.push(BitOpening::commit(bit)?);
        }
        let compressed: Vec<[u8; 32]> = openings
            .iter()
            .map(|o| o.commitment.compress().to_bytes())
            .collect();
        let base = base_transcript(&public_signal, &salt, &witness_key, &compressed);

        let mut bits = Vec::with_capacity(WITNESS_BITS);
        for (index, opening) in openings.iter().enumerate() {
            bits.push(BitProof::prove(&base, index, opening)?);
        }

        // Σ 2^i·C_i - W = (Σ 2^i·r_i)·H
        let mut blinding_sum = Scalar::ZERO;
        let mut power = Scalar::ONE;
        for opening in &openings {
            blinding_sum += power * opening.blinding;
            power += power;
        }
        let nonce = random_scalar()?;
        let mut transcript = base.clone();
        transcript.append_point(b"sum-nonce", &mul_h(&nonce).compress());
        let challenge = transcript.challenge(b"sum-challenge");
        let response = nonce + challenge * blinding_sum;

        Ok(ProofPackage {
            schema_version: PROOF_SCHEMA_VERSION,
            public_signal,
            salt,
            proof: KnowledgeProof {
                witness_key,
                bits,
                challenge: challenge.to_bytes(),
                response: response.to_bytes(),
            },
        })
    }

    /// Prove on the blocking pool so the async scheduler keeps running.
    pub async fn prove(
        critical: CriticalBytes,
        salt: [u8; SALT_SIZE],
    ) -> Result<ProofPackage, ProofError> {
        tokio::task::spawn_blocking(move || Self::prove_blocking(critical.as_slice(), salt))
            .await
            .map_err(|e| ProofError::Worker(e.to_string()))?
    }

    /// Verify `package` against the registered `public_signal` and `anchor`.
    ///
    /// Every bit is checked and the results are folded with constant-time
    /// operations; the only early exits depend on public structure.
    pub fn verify(
        package: &ProofPackage,
        public_signal: &Commitment,
        anchor: &Commitment,
    ) -> bool {
        if package.schema_version != PROOF_SCHEMA_VERSION
            || package.proof.bits.len() != WITNESS_BITS
        {
            return false;
        }
        let proof = &package.proof;

        let mut valid = package.public_signal.ct_eq(public_signal);
        valid &= package.anchor().ct_eq(anchor);
        let (key_ok, witness_key) = parse_point(&proof.witness_key);
        valid &= key_ok;

        let compressed: Vec<[u8; 32]> = proof.bits.iter().map(|b| b.commitment).collect();
        let base = base_transcript(public_signal, &package.salt, &proof.witness_key, &compressed);

        let mut weighted = RistrettoPoint::identity();
        let mut power = Scalar::ONE;
        for (index, bit) in proof.bits.iter().enumerate() {
            let (bit_ok, commitment) = bit.verify(&base, index);
            valid &= bit_ok;
            weighted += commitment * power;
            power += power;
        }

        let (challenge_ok, challenge) = parse_scalar(&proof.challenge);
        let (response_ok, response) = parse_scalar(&proof.response);
        let difference = weighted - witness_key;
        let nonce_point = mul_h(&response) - challenge * difference;
        let mut transcript = base;
        transcript.append_point(b"sum-nonce", &nonce_point.compress());
        let expected = transcript.challenge(b"sum-challenge");

        valid &= challenge_ok & response_ok & expected.ct_eq(&challenge);
        bool::from(valid)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn critical(seed: u8, len: usize) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31) ^ seed).collect()
    }

    fn verify(package: &ProofPackage, critical: &[u8]) -> bool {
        ProofSystem::verify(package, &Commitment::commit(critical), &package.anchor())
    }

    #[test]
    fn test_prove_verify() {
        let x = critical(1, 1024);
        let salt = ProofSystem::generate_salt().unwrap();
        let package = ProofSystem::prove_blocking(&x, salt).unwrap();

        assert_eq!(package.public_signal, Commitment::commit(&x));
        assert!(verify(&package, &x));
        assert!(package.binds(&x));
    }

    #[test]
    fn test_rejects_other_commitment() {
        let x = critical(1, 1024);
        let y = critical(2, 1024);
        let package = ProofSystem::prove_blocking(&x, [5u8; SALT_SIZE]).unwrap();

        assert!(!verify(&package, &y));
        assert!(!package.binds(&y));

        // Relabelling the package does not help either.
        let mut relabelled = package.clone();
        relabelled.public_signal = Commitment::commit(&y);
        assert!(!verify(&relabelled, &y));
    }

    #[test]
    fn test_tampering_is_detected() {
        let x = critical(9, 16);
        let signal = Commitment::commit(&x);
        let package = ProofSystem::prove_blocking(&x, [1u8; SALT_SIZE]).unwrap();
        let anchor = package.anchor();

        let mut swapped_salt = package.clone();
        swapped_salt.salt = [2u8; SALT_SIZE];
        assert!(!ProofSystem::verify(&swapped_salt, &signal, &anchor));

        let mut dropped_bit = package.clone();
        dropped_bit.proof.bits.pop();
        assert!(!ProofSystem::verify(&dropped_bit, &signal, &anchor));

        let mut swapped_bits = package.clone();
        swapped_bits.proof.bits.swap(0, 1);
        assert!(!ProofSystem::verify(&swapped_bits, &signal, &anchor));

        let mut forged_key = package.clone();
        forged_key.proof.witness_key = mul_g(&Scalar::from(7u64)).compress().to_bytes();
        assert!(!ProofSystem::verify(&forged_key, &signal, &anchor));

        let mut bad_response = package;
        bad_response.proof.response = [0u8; 32];
        assert!(!ProofSystem::verify(&bad_response, &signal, &anchor));
    }

    #[test]
    fn test_package_bytes_roundtrip() {
        let x = critical(3, 64);
        let package = ProofSystem::prove_blocking(&x, [0u8; SALT_SIZE]).unwrap();
        let bytes = package.to_bytes().unwrap();
        let decoded = ProofPackage::from_bytes(&bytes).unwrap();
        assert!(verify(&decoded, &x));

        let mut future = package;
        future.schema_version = 2;
        assert!(matches!(
            ProofPackage::from_bytes(&future.to_bytes().unwrap()),
            Err(ProofError::UnsupportedSchema(2))
        ));
    }

    #[tokio::test]
    async fn test_async_prove_uses_worker() {
        let x = CriticalBytes::from(critical(4, 3072));
        let signal = Commitment::commit(x.as_slice());
        let package = ProofSystem::prove(x, [8u8; SALT_SIZE]).await.unwrap();
        assert!(ProofSystem::verify(&package, &signal, &package.anchor()));
    }

    #[test]
    fn test_unanchored_witness_is_rejected() {
        let x = critical(6, 256);
        let signal = Commitment::commit(&x);
        let honest = ProofSystem::prove_blocking(&x, [3u8; SALT_SIZE]).unwrap();

        // A well-formed proof over a witness unrelated to `x`, built from
        // nothing but the public commitment.
        let mut junk = [0x5a; 32];
        junk[31] = 0;
        let forged = ProofSystem::prove_witness(signal, [3u8; SALT_SIZE], junk).unwrap();
        assert!(!forged.binds(&x));
        assert!(ProofSystem::verify(&forged, &signal, &forged.anchor()));
        assert!(!ProofSystem::verify(&forged, &signal, &honest.anchor()));
        assert!(ProofSystem::verify(&honest, &signal, &honest.anchor()));
    }
}
