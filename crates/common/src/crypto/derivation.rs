//! Wallet-signature key derivation
//!
//! A wallet signs [`DERIVATION_MESSAGE`] once per session. The signature is the
//! input keying material for HKDF-SHA256, expanded under one context string per
//! [`SecurityLevel`] into three independent 256-bit keys. Ed25519 signatures are
//! deterministic, so the same wallet always recovers the same keys without any
//! server-side key storage.

use std::fmt;
use std::str::FromStr;

use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::commitment::Commitment;
use super::keys::PublicKey;

/// Message every wallet signs to unlock its keys.
///
/// Changing this string changes every derived key for every user.
pub const DERIVATION_MESSAGE: &str = "Vaultline Key Derivation v1";
/// HKDF extract salt.
pub const HKDF_SALT: &[u8] = b"Vaultline-HKDF-Salt-v1";
/// Size of a derived level key in bytes.
pub const LEVEL_KEY_SIZE: usize = 32;
/// No level ever extracts fewer critical bytes than this.
pub const MIN_CRITICAL_LEN: usize = 16;

const FINGERPRINT_CONTEXT: &[u8] = b"vaultline-master-key-commitment";

#[derive(Debug, thiserror::Error)]
pub enum DerivationError {
    #[error("wallet could not produce a derivation signature: {0}")]
    SignatureUnavailable(String),
    #[error("wallet is disconnected")]
    WalletDisconnected,
    #[error("derivation signature rejected: {0}")]
    InvalidSignature(String),
    #[error("derivation error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Encryption strength profile of a file.
///
/// Each level owns its own derived key, HKDF context and critical block length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    Standard,
    Sensitive,
    Maximum,
}

impl SecurityLevel {
    pub const ALL: [SecurityLevel; 3] = [
        SecurityLevel::Standard,
        SecurityLevel::Sensitive,
        SecurityLevel::Maximum,
    ];

    /// Number of leading ciphertext bytes withheld from storage.
    pub const fn critical_len(self) -> usize {
        match self {
            SecurityLevel::Standard => 1024,
            SecurityLevel::Sensitive => 3072,
            SecurityLevel::Maximum => 5120,
        }
    }

    /// HKDF info string for this level's key.
    pub const fn context(self) -> &'static [u8] {
        match self {
            SecurityLevel::Standard => b"vaultline-level-1-encryption",
            SecurityLevel::Sensitive => b"vaultline-level-2-encryption",
            SecurityLevel::Maximum => b"vaultline-level-3-encryption",
        }
    }

    /// Tag used in ledger account layouts.
    pub const fn tag(self) -> u8 {
        match self {
            SecurityLevel::Standard => 1,
            SecurityLevel::Sensitive => 2,
            SecurityLevel::Maximum => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(SecurityLevel::Standard),
            2 => Some(SecurityLevel::Sensitive),
            3 => Some(SecurityLevel::Maximum),
            _ => None,
        }
    }

    pub(crate) const fn index(self) -> usize {
        self.tag() as usize - 1
    }
}

const fn bytes_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

const fn contexts_are_distinct() -> bool {
    let levels = SecurityLevel::ALL;
    let mut i = 0;
    while i < levels.len() {
        if levels[i].critical_len() < MIN_CRITICAL_LEN {
            return false;
        }
        let mut j = i + 1;
        while j < levels.len() {
            if bytes_eq(levels[i].context(), levels[j].context()) {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

const _: () = assert!(
    contexts_are_distinct(),
    "security level HKDF contexts must be pairwise distinct"
);

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecurityLevel::Standard => "standard",
            SecurityLevel::Sensitive => "sensitive",
            SecurityLevel::Maximum => "maximum",
        };
        f.write_str(name)
    }
}

impl FromStr for SecurityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" | "1" => Ok(SecurityLevel::Standard),
            "sensitive" | "2" => Ok(SecurityLevel::Sensitive),
            "maximum" | "3" => Ok(SecurityLevel::Maximum),
            other => Err(format!("unknown security level: {}", other)),
        }
    }
}

/// A 256-bit AES key for one security level. Wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct LevelKey([u8; LEVEL_KEY_SIZE]);

impl fmt::Debug for LevelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LevelKey(..)")
    }
}

impl From<[u8; LEVEL_KEY_SIZE]> for LevelKey {
    fn from(bytes: [u8; LEVEL_KEY_SIZE]) -> Self {
        LevelKey(bytes)
    }
}

impl LevelKey {
    pub fn bytes(&self) -> &[u8; LEVEL_KEY_SIZE] {
        &self.0
    }
}

/// The three level keys recovered from one signature.
#[derive(Clone, Debug, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKeys {
    keys: [LevelKey; 3],
}

impl DerivedKeys {
    pub fn get(&self, level: SecurityLevel) -> &LevelKey {
        &self.keys[level.index()]
    }

    /// Commitment anchored in the vault as its master key commitment.
    ///
    /// Lets a client confirm it re-derived the same key set without revealing
    /// any key.
    pub fn fingerprint(&self) -> Commitment {
        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_CONTEXT);
        for key in &self.keys {
            hasher.update(key.bytes());
        }
        Commitment::from(<[u8; 32]>::from(hasher.finalize()))
    }
}

/// Pure signature-to-keys derivation. Holds no state beyond the message.
#[derive(Debug, Clone)]
pub struct KeyDerivation {
    message: &'static str,
}

impl Default for KeyDerivation {
    fn default() -> Self {
        Self {
            message: DERIVATION_MESSAGE,
        }
    }
}

impl KeyDerivation {
    pub fn new() -> Self {
        Self::default()
    }

    /// The message the wallet must sign.
    pub fn message(&self) -> &'static [u8] {
        self.message.as_bytes()
    }

    /// Derive all three level keys from raw signature bytes.
    pub fn derive(&self, signature: &[u8]) -> Result<DerivedKeys, DerivationError> {
        if signature.is_empty() {
            return Err(DerivationError::InvalidSignature(
                "empty signature".to_string(),
            ));
        }
        let hkdf = Hkdf::<Sha256>::new(Some(HKDF_SALT), signature);
        let mut keys = [
            LevelKey([0; LEVEL_KEY_SIZE]),
            LevelKey([0; LEVEL_KEY_SIZE]),
            LevelKey([0; LEVEL_KEY_SIZE]),
        ];
        for level in SecurityLevel::ALL {
            hkdf.expand(level.context(), &mut keys[level.index()].0)
                .map_err(|e| anyhow::anyhow!("hkdf expand failed: {}", e))?;
        }
        Ok(DerivedKeys { keys })
    }

    /// Check the signature against the signer before deriving from it.
    pub fn derive_verified(
        &self,
        signer: &PublicKey,
        signature: &ed25519_dalek::Signature,
    ) -> Result<DerivedKeys, DerivationError> {
        signer
            .verify(self.message(), signature)
            .map_err(|e| DerivationError::InvalidSignature(e.to_string()))?;
        self.derive(&signature.to_bytes())
    }
}
