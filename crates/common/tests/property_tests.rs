//! Property-based tests for the split cipher and commitments
//!
//! These tests verify invariants that should hold for all inputs.

use common::crypto::{
    Commitment, FileKey, KeyDerivation, LevelKey, SecurityLevel, SplitCipher, TAG_SIZE,
};
use proptest::prelude::*;

fn arb_level() -> impl Strategy<Value = SecurityLevel> {
    prop_oneof![
        Just(SecurityLevel::Standard),
        Just(SecurityLevel::Sensitive),
        Just(SecurityLevel::Maximum),
    ]
}

fn level_key(seed: [u8; 32], level: SecurityLevel) -> LevelKey {
    KeyDerivation::new()
        .derive(&seed)
        .unwrap()
        .get(level)
        .clone()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_roundtrip(
        plaintext in prop::collection::vec(any::<u8>(), 0..20_000),
        level in arb_level(),
        seed in any::<[u8; 32]>(),
    ) {
        let key = level_key(seed, level);
        let split = SplitCipher::encrypt(&plaintext, &key, level).unwrap();

        prop_assert_eq!(split.critical.len(), level.critical_len());
        prop_assert!(split.remainder.len() >= TAG_SIZE);
        prop_assert_eq!(split.len(), SplitCipher::ciphertext_len(plaintext.len(), level));

        let recovered = SplitCipher::decrypt(
            split.critical.as_slice(),
            &split.remainder,
            &split.iv,
            &key,
            level,
        )
        .unwrap();
        prop_assert_eq!(recovered, plaintext);
    }

    /// The remainder alone, even with the right key, never yields plaintext.
    #[test]
    fn prop_remainder_alone_is_insufficient(
        plaintext in prop::collection::vec(any::<u8>(), 0..8_000),
        level in arb_level(),
        seed in any::<[u8; 32]>(),
        guess in any::<u8>(),
    ) {
        let key = level_key(seed, level);
        let split = SplitCipher::encrypt(&plaintext, &key, level).unwrap();

        prop_assert!(SplitCipher::decrypt(&[], &split.remainder, &split.iv, &key, level).is_err());
        let forged = vec![guess; level.critical_len()];
        prop_assume!(forged.as_slice() != split.critical.as_slice());
        prop_assert!(SplitCipher::decrypt(&forged, &split.remainder, &split.iv, &key, level).is_err());
    }

    #[test]
    fn prop_file_keys_do_not_repeat(
        seed in any::<[u8; 32]>(),
        level in arb_level(),
    ) {
        let key = level_key(seed, level);
        let first = SplitCipher::encrypt(b"same", &key, level).unwrap();
        let second = SplitCipher::encrypt(b"same", &key, level).unwrap();
        prop_assert_ne!(first.critical.as_slice(), second.critical.as_slice());
        prop_assert_ne!(
            FileKey::derive(&key, &first.iv).unwrap(),
            FileKey::derive(&key, &second.iv).unwrap()
        );
    }

    #[test]
    fn prop_commitment_binding(
        a in prop::collection::vec(any::<u8>(), 0..512),
        b in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let commitment = Commitment::commit(&a);
        prop_assert!(commitment.verify(&a));
        prop_assert_eq!(commitment.verify(&b), a == b);
    }

    /// Splitting the committed bytes differently changes nothing; changing
    /// any byte does.
    #[test]
    fn prop_commit_parts_is_concatenation(
        data in prop::collection::vec(any::<u8>(), 1..512),
        cut in any::<prop::sample::Index>(),
        flip in any::<prop::sample::Index>(),
    ) {
        let at = cut.index(data.len());
        let (head, tail) = data.split_at(at);
        let commitment = Commitment::commit(&data);
        prop_assert!(commitment.verify_parts(&[head, tail]));

        let mut tampered = data.clone();
        tampered[flip.index(data.len())] ^= 0x01;
        prop_assert!(!commitment.verify(&tampered));
    }
}
