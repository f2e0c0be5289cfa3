//! Delegation key exchange
//!
//! Re-encrypts a file's `critical || iv || file_key` for one grantee:
//! 1. **Generate ephemeral keypair**: a fresh Ed25519 identity per delegation
//! 2. **Perform ECDH**: convert both keys to X25519 and compute the shared secret
//! 3. **Derive key**: HKDF-SHA256 over the shared secret, bound to both public keys
//! 4. **Encrypt**: ChaCha20-Poly1305 over the grant with a random nonce
//!
//! The grantee reverses it with their long-lived identity key. Every delegation
//! uses its own ephemeral secret, which is dropped as soon as the payload is
//! sealed, so one leaked exchange key exposes nothing about any other grant.
//! Revocation is not handled here; it is the deletion of the delegation record.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use super::commitment::Commitment;
use super::derivation::SecurityLevel;
use super::keys::{KeyError, PublicKey, SecretKey, PUBLIC_KEY_SIZE};
use super::split_cipher::{
    split_critical_and_iv, CipherError, CriticalBytes, FileKey, Iv, FILE_KEY_SIZE, IV_SIZE,
};

/// HKDF info prefix for exchange keys.
pub const EXCHANGE_INFO: &[u8] = b"vaultline-delegation-v1";
/// Size of the ChaCha20-Poly1305 nonce in bytes
pub const EXCHANGE_NONCE_SIZE: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("shared secret is not contributory")]
    NonContributory,
    #[error("wrapped critical bytes did not authenticate for this recipient")]
    UnwrapFailed,
    #[error("malformed wrapped payload: {0}")]
    Malformed(String),
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),
    #[error("exchange error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Critical bytes sealed for a single grantee.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedCriticalBytes {
    pub ephemeral_public_key: PublicKey,
    pub nonce: [u8; EXCHANGE_NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

impl WrappedCriticalBytes {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ExchangeError> {
        bincode::serialize(self).map_err(|e| ExchangeError::Malformed(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ExchangeError> {
        bincode::deserialize(bytes).map_err(|e| ExchangeError::Malformed(e.to_string()))
    }

    /// Commitment anchored in the delegation record.
    pub fn commitment(&self) -> Result<Commitment, ExchangeError> {
        Ok(Commitment::commit(&self.to_bytes()?))
    }
}

fn exchange_key(
    shared_secret: &[u8; 32],
    ephemeral: &PublicKey,
    recipient: &PublicKey,
) -> Result<Zeroizing<[u8; 32]>, ExchangeError> {
    let mut info = Vec::with_capacity(EXCHANGE_INFO.len() + 2 * PUBLIC_KEY_SIZE);
    info.extend_from_slice(EXCHANGE_INFO);
    info.extend_from_slice(ephemeral.as_bytes());
    info.extend_from_slice(recipient.as_bytes());

    let mut okm = Zeroizing::new([0u8; 32]);
    Hkdf::<Sha256>::new(None, shared_secret)
        .expand(&info, okm.as_mut())
        .map_err(|e| anyhow::anyhow!("hkdf expand failed: {}", e))?;
    Ok(okm)
}

/// Everything a grantee needs to decrypt one file.
#[derive(Debug, Clone)]
pub struct UnwrappedGrant {
    pub critical: CriticalBytes,
    pub iv: Iv,
    pub file_key: FileKey,
}

pub struct DelegationExchange;

impl DelegationExchange {
    /// Seal `critical || iv || file_key` for `recipient` under a fresh
    /// ephemeral key.
    pub fn wrap_for_recipient(
        critical: &CriticalBytes,
        iv: &Iv,
        file_key: &FileKey,
        recipient: &PublicKey,
    ) -> Result<WrappedCriticalBytes, ExchangeError> {
        let ephemeral_private = SecretKey::try_generate()?;
        let ephemeral_public = ephemeral_private.public();

        let shared_secret = ephemeral_private
            .to_x25519()
            .diffie_hellman(&recipient.to_x25519()?);
        if !shared_secret.was_contributory() {
            return Err(ExchangeError::NonContributory);
        }
        let key = exchange_key(shared_secret.as_bytes(), &ephemeral_public, recipient)?;

        let mut nonce = [0u8; EXCHANGE_NONCE_SIZE];
        getrandom::getrandom(&mut nonce)
            .map_err(|e| anyhow::anyhow!("failed to generate nonce: {}", e))?;

        let mut payload =
            Zeroizing::new(Vec::with_capacity(critical.len() + IV_SIZE + FILE_KEY_SIZE));
        payload.extend_from_slice(critical.as_slice());
        payload.extend_from_slice(iv.as_bytes());
        payload.extend_from_slice(file_key.bytes());

        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_ref()));
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: payload.as_slice(),
                    aad: ephemeral_public.as_bytes(),
                },
            )
            .map_err(|_| anyhow::anyhow!("encrypt error"))?;

        Ok(WrappedCriticalBytes {
            ephemeral_public_key: ephemeral_public,
            nonce,
            ciphertext,
        })
    }

    /// Recover the grant with the grantee's identity key.
    pub fn unwrap(
        wrapped: &WrappedCriticalBytes,
        recipient_secret: &SecretKey,
        level: SecurityLevel,
    ) -> Result<UnwrappedGrant, ExchangeError> {
        let recipient = recipient_secret.public();
        let shared_secret = recipient_secret
            .to_x25519()
            .diffie_hellman(&wrapped.ephemeral_public_key.to_x25519()?);
        if !shared_secret.was_contributory() {
            return Err(ExchangeError::NonContributory);
        }
        let key = exchange_key(
            shared_secret.as_bytes(),
            &wrapped.ephemeral_public_key,
            &recipient,
        )?;

        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_ref()));
        let payload = Zeroizing::new(
            cipher
                .decrypt(
                    Nonce::from_slice(&wrapped.nonce),
                    Payload {
                        msg: &wrapped.ciphertext,
                        aad: wrapped.ephemeral_public_key.as_bytes(),
                    },
                )
                .map_err(|_| ExchangeError::UnwrapFailed)?,
        );

        if payload.len() < FILE_KEY_SIZE {
            return Err(ExchangeError::Malformed("grant is truncated".to_string()));
        }
        let (head, key) = payload.split_at(payload.len() - FILE_KEY_SIZE);
        let (critical, iv) = split_critical_and_iv(head, level)?;
        let mut key_bytes = [0u8; FILE_KEY_SIZE];
        key_bytes.copy_from_slice(key);
        let file_key = FileKey::from(key_bytes);
        key_bytes.zeroize();
        Ok(UnwrappedGrant {
            critical,
            iv,
            file_key,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::{KeyDerivation, SplitCipher};

    fn sample(level: SecurityLevel) -> (CriticalBytes, Iv, FileKey) {
        let key = KeyDerivation::new().derive(&[3u8; 64]).unwrap().get(level).clone();
        let split = SplitCipher::encrypt(b"delegated", &key, level).unwrap();
        let file_key = FileKey::derive(&key, &split.iv).unwrap();
        (split.critical.clone(), split.iv, file_key)
    }

    fn wrap(level: SecurityLevel, recipient: &PublicKey) -> (WrappedCriticalBytes, CriticalBytes) {
        let (critical, iv, file_key) = sample(level);
        let wrapped =
            DelegationExchange::wrap_for_recipient(&critical, &iv, &file_key, recipient).unwrap();
        (wrapped, critical)
    }

    #[test]
    fn test_wrap_unwrap() {
        let level = SecurityLevel::Sensitive;
        let (critical, iv, file_key) = sample(level);
        let bob = SecretKey::generate();

        let wrapped =
            DelegationExchange::wrap_for_recipient(&critical, &iv, &file_key, &bob.public())
                .unwrap();
        let grant = DelegationExchange::unwrap(&wrapped, &bob, level).unwrap();
        assert_eq!(grant.critical, critical);
        assert_eq!(grant.iv, iv);
        assert_eq!(grant.file_key, file_key);
    }

    #[test]
    fn test_other_identity_cannot_unwrap() {
        let level = SecurityLevel::Standard;
        let bob = SecretKey::generate();
        let eve = SecretKey::generate();
        let (wrapped, _) = wrap(level, &bob.public());
        assert!(matches!(
            DelegationExchange::unwrap(&wrapped, &eve, level),
            Err(ExchangeError::UnwrapFailed)
        ));
    }

    #[test]
    fn test_ephemeral_keys_are_single_use() {
        let level = SecurityLevel::Standard;
        let (critical, iv, file_key) = sample(level);
        let bob = SecretKey::generate();

        let first =
            DelegationExchange::wrap_for_recipient(&critical, &iv, &file_key, &bob.public())
                .unwrap();
        let second =
            DelegationExchange::wrap_for_recipient(&critical, &iv, &file_key, &bob.public())
                .unwrap();
        assert_ne!(first.ephemeral_public_key, second.ephemeral_public_key);
        assert_ne!(first.ciphertext, second.ciphertext);
    }

    #[test]
    fn test_swapped_ephemeral_key_is_rejected() {
        let level = SecurityLevel::Standard;
        let bob = SecretKey::generate();
        let (mut wrapped, _) = wrap(level, &bob.public());
        wrapped.ephemeral_public_key = SecretKey::generate().public();
        assert!(DelegationExchange::unwrap(&wrapped, &bob, level).is_err());
    }

    #[test]
    fn test_bytes_and_commitment() {
        let bob = SecretKey::generate();
        let (wrapped, _) = wrap(SecurityLevel::Maximum, &bob.public());

        let bytes = wrapped.to_bytes().unwrap();
        let decoded = WrappedCriticalBytes::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, wrapped);
        assert!(wrapped.commitment().unwrap().verify(&bytes));
        assert!(WrappedCriticalBytes::from_bytes(&bytes[..10]).is_err());
    }

    #[test]
    fn test_unwrap_checks_level_length() {
        let bob = SecretKey::generate();
        let (wrapped, _) = wrap(SecurityLevel::Maximum, &bob.public());
        assert!(matches!(
            DelegationExchange::unwrap(&wrapped, &bob, SecurityLevel::Standard),
            Err(ExchangeError::Cipher(CipherError::CriticalLengthMismatch { .. }))
        ));
    }
}
