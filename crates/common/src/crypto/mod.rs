//! Cryptographic primitives for Vaultline
//!
//! - **Identity**: Ed25519 keypairs (`SecretKey`/`PublicKey`) for owners,
//!   grantees and relayers
//! - **Key derivation**: one wallet signature expands into three level keys
//!   through HKDF-SHA256
//! - **Split encryption**: AES-256-GCM with the ciphertext cut into a withheld
//!   critical prefix and a storable remainder
//! - **Commitments**: fixed-size SHA-256 digests compared in constant time
//! - **Delegation exchange**: ECDH (X25519 converted from Ed25519) + HKDF +
//!   ChaCha20-Poly1305 re-encryption of critical bytes and the file key for
//!   one grantee
//!
//! # Write path
//!
//! ```text
//! signature --HKDF--> LevelKey --HKDF(iv)--> FileKey --AES-GCM--> critical || remainder
//!                                                                   |           |
//!                                                            commit/prove     storage
//! ```

mod commitment;
mod derivation;
mod exchange;
mod keys;
mod split_cipher;

pub use commitment::{Commitment, COMMITMENT_SIZE};
pub use derivation::{
    DerivationError, DerivedKeys, KeyDerivation, LevelKey, SecurityLevel, DERIVATION_MESSAGE,
    HKDF_SALT, LEVEL_KEY_SIZE, MIN_CRITICAL_LEN,
};
pub use ed25519_dalek::Signature;
pub use exchange::{
    DelegationExchange, ExchangeError, UnwrappedGrant, WrappedCriticalBytes, EXCHANGE_INFO,
};
pub use keys::{KeyError, PublicKey, SecretKey, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};
pub use split_cipher::{
    CipherError, CriticalBytes, FileKey, Iv, SplitCipher, SplitCiphertext, FILE_KEY_SIZE, IV_SIZE,
    TAG_SIZE,
};
