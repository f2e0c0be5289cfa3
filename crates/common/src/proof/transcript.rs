use curve25519_dalek::ristretto::CompressedRistretto;
use curve25519_dalek::scalar::Scalar;
use sha2::{Digest, Sha512};

const DOMAIN: &[u8] = b"vaultline-transcript-v1";

/// Fiat-Shamir transcript over SHA-512.
///
/// Every append is length-prefixed and labelled, so no two distinct
/// sequences of messages hash the same. Challenges are derived from a clone
/// of the running state, which lets a shared prefix be forked per bit.
#[derive(Clone)]
pub(crate) struct Transcript {
    hasher: Sha512,
}

impl Transcript {
    pub fn new(protocol: &'static [u8]) -> Self {
        let mut transcript = Self {
            hasher: Sha512::new(),
        };
        transcript.append(b"domain", DOMAIN);
        transcript.append(b"protocol", protocol);
        transcript
    }

    pub fn append(&mut self, label: &'static [u8], message: &[u8]) {
        self.hasher.update((label.len() as u64).to_le_bytes());
        self.hasher.update(label);
        self.hasher.update((message.len() as u64).to_le_bytes());
        self.hasher.update(message);
    }

    pub fn append_u64(&mut self, label: &'static [u8], value: u64) {
        self.append(label, &value.to_le_bytes());
    }

    pub fn append_point(&mut self, label: &'static [u8], point: &CompressedRistretto) {
        self.append(label, point.as_bytes());
    }

    pub fn challenge(&self, label: &'static [u8]) -> Scalar {
        let mut hasher = self.hasher.clone();
        hasher.update((label.len() as u64).to_le_bytes());
        hasher.update(label);
        let digest = hasher.finalize();
        let mut wide = [0u8; 64];
        wide.copy_from_slice(&digest);
        Scalar::from_bytes_mod_order_wide(&wide)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_challenges_depend_on_every_message() {
        let mut a = Transcript::new(b"test");
        a.append(b"x", b"hello");
        let mut b = Transcript::new(b"test");
        b.append(b"x", b"hellp");
        assert_ne!(a.challenge(b"c"), b.challenge(b"c"));
    }

    #[test]
    fn test_framing_is_unambiguous() {
        let mut a = Transcript::new(b"test");
        a.append(b"x", b"ab");
        a.append(b"x", b"c");
        let mut b = Transcript::new(b"test");
        b.append(b"x", b"a");
        b.append(b"x", b"bc");
        assert_ne!(a.challenge(b"c"), b.challenge(b"c"));
    }

    #[test]
    fn test_fork_leaves_parent_untouched() {
        let base = Transcript::new(b"test");
        let before = base.challenge(b"c");
        let mut fork = base.clone();
        fork.append_u64(b"bit", 3);
        assert_eq!(before, base.challenge(b"c"));
        assert_ne!(before, fork.challenge(b"c"));
    }
}
