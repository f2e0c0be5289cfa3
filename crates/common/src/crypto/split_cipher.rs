//! Split-ciphertext encryption
//!
//! Files are encrypted with AES-256-GCM under a per-file key, then the first
//! `level.critical_len()` ciphertext bytes are cut off as the *critical bytes*.
//! Only the remainder ever reaches a storage provider. Without the critical
//! prefix the GCM tag cannot be checked, and the keystream offset of every
//! remaining block is unknown to anyone holding only storage-side data.
//!
//! The plaintext is framed with ISO/IEC 7816-4 padding (`0x80` followed by
//! zeros) up to at least the critical length, so even an empty file yields a
//! full critical block and a non-empty remainder:
//!
//! ```text
//! file_key   = HKDF-SHA256(level_key, info = "vaultline-file-key-v1" || iv)
//! ciphertext = AES-GCM(plaintext || 0x80 || 0x00..)   len = max(n + 1, critical_len) + 16
//!            = critical (critical_len) || remainder (>= 16)
//! ```
//!
//! The owner re-derives the file key from the level key; a grantee receives
//! it wrapped together with the critical bytes, so sharing one file never
//! exposes the level key.

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::derivation::{LevelKey, SecurityLevel, LEVEL_KEY_SIZE};

/// Size of the AES-GCM IV in bytes
pub const IV_SIZE: usize = 12;
/// Size of the AES-GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

const PADDING_MARKER: u8 = 0x80;
const ENVELOPE_AAD: &[u8] = b"vaultline-critical-envelope-v1";
const FILE_KEY_INFO: &[u8] = b"vaultline-file-key-v1";
/// Size of a per-file content key in bytes
pub const FILE_KEY_SIZE: usize = LEVEL_KEY_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("critical bytes are missing")]
    MissingCriticalBytes,
    #[error("critical bytes have wrong length: expected {expected}, got {actual}")]
    CriticalLengthMismatch { expected: usize, actual: usize },
    #[error("ciphertext is truncated")]
    Truncated,
    #[error("authentication tag did not verify")]
    AuthenticationFailed,
    #[error("plaintext framing is malformed")]
    MalformedPadding,
    #[error("cipher error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Random per-file AES-GCM IV.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Iv([u8; IV_SIZE]);

impl Iv {
    pub fn generate() -> Result<Self, CipherError> {
        let mut bytes = [0u8; IV_SIZE];
        getrandom::getrandom(&mut bytes)
            .map_err(|e| anyhow::anyhow!("failed to generate iv: {}", e))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; IV_SIZE] {
        &self.0
    }
}

impl From<[u8; IV_SIZE]> for Iv {
    fn from(bytes: [u8; IV_SIZE]) -> Self {
        Iv(bytes)
    }
}

impl fmt::Debug for Iv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Iv({})", hex::encode(self.0))
    }
}

/// AES-256 key for exactly one file. Wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct FileKey([u8; FILE_KEY_SIZE]);

impl FileKey {
    pub fn derive(level_key: &LevelKey, iv: &Iv) -> Result<Self, CipherError> {
        let mut info = Vec::with_capacity(FILE_KEY_INFO.len() + IV_SIZE);
        info.extend_from_slice(FILE_KEY_INFO);
        info.extend_from_slice(iv.as_bytes());

        let mut key = FileKey([0u8; FILE_KEY_SIZE]);
        Hkdf::<Sha256>::new(None, level_key.bytes())
            .expand(&info, &mut key.0)
            .map_err(|e| anyhow::anyhow!("hkdf expand failed: {}", e))?;
        Ok(key)
    }

    pub fn bytes(&self) -> &[u8; FILE_KEY_SIZE] {
        &self.0
    }
}

impl From<[u8; FILE_KEY_SIZE]> for FileKey {
    fn from(bytes: [u8; FILE_KEY_SIZE]) -> Self {
        FileKey(bytes)
    }
}

impl fmt::Debug for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FileKey(..)")
    }
}

/// The withheld ciphertext prefix. Wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct CriticalBytes(Vec<u8>);

impl CriticalBytes {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for CriticalBytes {
    fn from(bytes: Vec<u8>) -> Self {
        CriticalBytes(bytes)
    }
}

impl fmt::Debug for CriticalBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CriticalBytes({} bytes)", self.0.len())
    }
}

/// Output of [`SplitCipher::encrypt`].
#[derive(Debug, Clone)]
pub struct SplitCiphertext {
    pub level: SecurityLevel,
    pub critical: CriticalBytes,
    pub remainder: Vec<u8>,
    pub iv: Iv,
}

impl SplitCiphertext {
    /// Length of the joined ciphertext.
    pub fn len(&self) -> usize {
        self.critical.len() + self.remainder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stateless AES-256-GCM split cipher.
pub struct SplitCipher;

impl SplitCipher {
    /// Ciphertext length produced for a plaintext of `plaintext_len` bytes.
    pub fn ciphertext_len(plaintext_len: usize, level: SecurityLevel) -> usize {
        (plaintext_len + 1).max(level.critical_len()) + TAG_SIZE
    }

    pub fn encrypt(
        plaintext: &[u8],
        key: &LevelKey,
        level: SecurityLevel,
    ) -> Result<SplitCiphertext, CipherError> {
        let iv = Iv::generate()?;
        Self::encrypt_with_iv(plaintext, key, level, iv)
    }

    pub(crate) fn encrypt_with_iv(
        plaintext: &[u8],
        key: &LevelKey,
        level: SecurityLevel,
        iv: Iv,
    ) -> Result<SplitCiphertext, CipherError> {
        let critical_len = level.critical_len();
        let padded_len = (plaintext.len() + 1).max(critical_len);

        let mut framed = Zeroizing::new(Vec::with_capacity(padded_len));
        framed.extend_from_slice(plaintext);
        framed.push(PADDING_MARKER);
        framed.resize(padded_len, 0);

        let file_key = FileKey::derive(key, &iv)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(file_key.bytes()));
        let mut ciphertext = cipher
            .encrypt(Nonce::from_slice(iv.as_bytes()), framed.as_slice())
            .map_err(|_| anyhow::anyhow!("encrypt error"))?;

        let remainder = ciphertext.split_off(critical_len);
        Ok(SplitCiphertext {
            level,
            critical: CriticalBytes(ciphertext),
            remainder,
            iv,
        })
    }

    /// Rejoin and decrypt. Fails closed: no plaintext is returned unless the
    /// tag verifies and the framing is intact.
    pub fn decrypt(
        critical: &[u8],
        remainder: &[u8],
        iv: &Iv,
        key: &LevelKey,
        level: SecurityLevel,
    ) -> Result<Vec<u8>, CipherError> {
        let file_key = FileKey::derive(key, iv)?;
        Self::decrypt_with_file_key(critical, remainder, iv, &file_key, level)
    }

    /// [`SplitCipher::decrypt`] for a holder of the file key alone.
    pub fn decrypt_with_file_key(
        critical: &[u8],
        remainder: &[u8],
        iv: &Iv,
        file_key: &FileKey,
        level: SecurityLevel,
    ) -> Result<Vec<u8>, CipherError> {
        if critical.is_empty() {
            return Err(CipherError::MissingCriticalBytes);
        }
        if critical.len() != level.critical_len() {
            return Err(CipherError::CriticalLengthMismatch {
                expected: level.critical_len(),
                actual: critical.len(),
            });
        }
        if remainder.len() < TAG_SIZE {
            return Err(CipherError::Truncated);
        }

        let mut joined = Vec::with_capacity(critical.len() + remainder.len());
        joined.extend_from_slice(critical);
        joined.extend_from_slice(remainder);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(file_key.bytes()));
        let mut framed = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(iv.as_bytes()), joined.as_slice())
                .map_err(|_| CipherError::AuthenticationFailed)?,
        );

        let marker = framed
            .iter()
            .rposition(|b| *b != 0)
            .ok_or(CipherError::MalformedPadding)?;
        if framed[marker] != PADDING_MARKER {
            return Err(CipherError::MalformedPadding);
        }
        framed.truncate(marker);
        Ok(std::mem::take(&mut *framed))
    }

    /// Encrypt the owner's copy of `critical || iv` under the level key.
    ///
    /// Output is `nonce (12) || ciphertext || tag (16)`.
    pub fn seal_critical(
        split: &SplitCiphertext,
        key: &LevelKey,
    ) -> Result<Vec<u8>, CipherError> {
        let nonce = Iv::generate()?;
        let mut payload = Zeroizing::new(Vec::with_capacity(split.critical.len() + IV_SIZE));
        payload.extend_from_slice(split.critical.as_slice());
        payload.extend_from_slice(split.iv.as_bytes());

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.bytes()));
        let sealed = cipher
            .encrypt(
                Nonce::from_slice(nonce.as_bytes()),
                Payload {
                    msg: payload.as_slice(),
                    aad: ENVELOPE_AAD,
                },
            )
            .map_err(|_| anyhow::anyhow!("envelope encrypt error"))?;

        let mut out = Vec::with_capacity(IV_SIZE + sealed.len());
        out.extend_from_slice(nonce.as_bytes());
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Inverse of [`SplitCipher::seal_critical`].
    pub fn open_critical(
        envelope: &[u8],
        key: &LevelKey,
        level: SecurityLevel,
    ) -> Result<(CriticalBytes, Iv), CipherError> {
        if envelope.len() < IV_SIZE + TAG_SIZE {
            return Err(CipherError::Truncated);
        }
        let (nonce, sealed) = envelope.split_at(IV_SIZE);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.bytes()));
        let payload = Zeroizing::new(
            cipher
                .decrypt(
                    Nonce::from_slice(nonce),
                    Payload {
                        msg: sealed,
                        aad: ENVELOPE_AAD,
                    },
                )
                .map_err(|_| CipherError::AuthenticationFailed)?,
        );
        split_critical_and_iv(&payload, level)
    }
}

/// Parse a `critical || iv` payload for `level`.
pub(crate) fn split_critical_and_iv(
    payload: &[u8],
    level: SecurityLevel,
) -> Result<(CriticalBytes, Iv), CipherError> {
    let expected = level.critical_len() + IV_SIZE;
    if payload.len() != expected {
        return Err(CipherError::CriticalLengthMismatch {
            expected: level.critical_len(),
            actual: payload.len().saturating_sub(IV_SIZE),
        });
    }
    let (critical, iv) = payload.split_at(level.critical_len());
    let mut iv_bytes = [0u8; IV_SIZE];
    iv_bytes.copy_from_slice(iv);
    Ok((CriticalBytes(critical.to_vec()), Iv(iv_bytes)))
}
