use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::{Choice, ConstantTimeEq};

/// Size of a commitment digest in bytes, identical for every security level.
pub const COMMITMENT_SIZE: usize = 32;

/// SHA-256 digest binding a value without revealing it.
///
/// Used as the critical bytes commitment (over the critical prefix), the
/// encryption commitment (over the whole ciphertext) and the delegation
/// payload commitment. Registry values are the source of truth, so
/// verification always compares against an anchored commitment.
#[derive(Clone, Copy, Default, Hash, Serialize, Deserialize)]
pub struct Commitment([u8; COMMITMENT_SIZE]);

impl Commitment {
    pub fn commit(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// Commitment over several parts as if they were concatenated.
    pub fn commit_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        Self(hasher.finalize().into())
    }

    /// Constant-time check of `bytes` against this anchored commitment.
    pub fn verify(&self, bytes: &[u8]) -> bool {
        self.ct_eq(&Self::commit(bytes)).into()
    }

    pub fn verify_parts(&self, parts: &[&[u8]]) -> bool {
        self.ct_eq(&Self::commit_parts(parts)).into()
    }

    pub fn as_bytes(&self) -> &[u8; COMMITMENT_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex prefix for logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl ConstantTimeEq for Commitment {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.0.ct_eq(&other.0)
    }
}

impl PartialEq for Commitment {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl Eq for Commitment {}

impl From<[u8; COMMITMENT_SIZE]> for Commitment {
    fn from(bytes: [u8; COMMITMENT_SIZE]) -> Self {
        Commitment(bytes)
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", self.to_hex())
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_commitment_is_fixed_size() {
        assert_eq!(Commitment::commit(&[]).as_bytes().len(), COMMITMENT_SIZE);
        assert_eq!(Commitment::commit(&[0u8; 5120]).as_bytes().len(), COMMITMENT_SIZE);
    }

    #[test]
    fn test_single_bit_flip_changes_commitment() {
        let data = vec![0x5a; 1024];
        let original = Commitment::commit(&data);
        for bit in [0usize, 7, 4096, 8191] {
            let mut mutated = data.clone();
            mutated[bit / 8] ^= 1 << (bit % 8);
            assert_ne!(original, Commitment::commit(&mutated));
            assert!(!original.verify(&mutated));
        }
        assert!(original.verify(&data));
    }

    #[test]
    fn test_parts_match_concatenation() {
        let whole = Commitment::commit(b"criticalremainder");
        assert_eq!(whole, Commitment::commit_parts(&[b"critical", b"remainder"]));
        assert!(whole.verify_parts(&[b"crit", b"icalremainder"]));
    }
}
