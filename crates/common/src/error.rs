use crate::crypto::{CipherError, DerivationError, ExchangeError};
use crate::proof::ProofError;
use crate::registry::{Permission, RegistryError};
use crate::session::KeyCacheError;
use crate::storage::StorageError;

/// What a failure means for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Data is intact but temporarily out of reach; wait and retry
    Unreachable,
    /// A cryptographic check failed; never trust this artifact again
    Void,
    /// The caller has no (or no longer any) right to this data
    Denied,
    /// The request itself cannot be satisfied as asked
    Rejected,
}

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),
    #[error("keys unavailable: session expired and the wallet is disconnected")]
    KeysUnavailable,
    #[error("ciphertext failed authentication: {0}")]
    CipherAuthenticationFailed(String),
    #[error("{0} does not match its anchored commitment")]
    CommitmentMismatch(&'static str),
    #[error("proof rejected")]
    ProofInvalid,
    #[error("no proof artifact for this file; it cannot be shared")]
    ProofMissing,
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),
    #[error("vault reached its shard limit of {0}")]
    ShardCapacityExceeded(u8),
    #[error("delegation expired")]
    DelegationExpired,
    #[error("delegation revoked")]
    DelegationRevoked,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("{0:?} permission does not allow this")]
    InsufficientPermission(Permission),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("vault error: {0}")]
    Default(#[from] anyhow::Error),
}

impl VaultError {
    pub fn class(&self) -> FailureClass {
        match self {
            VaultError::KeyDerivationFailed(_)
            | VaultError::KeysUnavailable
            | VaultError::StorageUnavailable(_)
            | VaultError::RegistryUnavailable(_) => FailureClass::Unreachable,
            VaultError::CipherAuthenticationFailed(_)
            | VaultError::CommitmentMismatch(_)
            | VaultError::ProofInvalid => FailureClass::Void,
            VaultError::DelegationExpired
            | VaultError::DelegationRevoked
            | VaultError::Unauthorized(_)
            | VaultError::InsufficientPermission(_) => FailureClass::Denied,
            VaultError::ProofMissing
            | VaultError::ShardCapacityExceeded(_)
            | VaultError::NotFound(_)
            | VaultError::InvalidInput(_)
            | VaultError::Conflict(_)
            | VaultError::Default(_) => FailureClass::Rejected,
        }
    }

    /// Only transient infrastructure failures are worth retrying.
    /// Verification failures never are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VaultError::KeyDerivationFailed(_)
                | VaultError::StorageUnavailable(_)
                | VaultError::RegistryUnavailable(_)
        )
    }
}

impl From<DerivationError> for VaultError {
    fn from(err: DerivationError) -> Self {
        match err {
            DerivationError::WalletDisconnected => VaultError::KeysUnavailable,
            other => VaultError::KeyDerivationFailed(other.to_string()),
        }
    }
}

impl From<KeyCacheError> for VaultError {
    fn from(err: KeyCacheError) -> Self {
        match err {
            KeyCacheError::KeysUnavailable => VaultError::KeysUnavailable,
            KeyCacheError::PrincipalChanged(_) => VaultError::Unauthorized(err.to_string()),
            KeyCacheError::Derivation(e) => e.into(),
        }
    }
}

impl From<CipherError> for VaultError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::Default(e) => VaultError::Default(e),
            other => VaultError::CipherAuthenticationFailed(other.to_string()),
        }
    }
}

impl From<ExchangeError> for VaultError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::UnwrapFailed => {
                VaultError::CipherAuthenticationFailed(err.to_string())
            }
            ExchangeError::Cipher(e) => e.into(),
            ExchangeError::Default(e) => VaultError::Default(e),
            other => VaultError::InvalidInput(other.to_string()),
        }
    }
}

impl From<ProofError> for VaultError {
    fn from(err: ProofError) -> Self {
        match err {
            ProofError::Malformed(_) | ProofError::UnsupportedSchema(_) => VaultError::ProofInvalid,
            ProofError::Worker(e) => VaultError::Default(anyhow::anyhow!(e)),
            ProofError::Default(e) => VaultError::Default(e),
        }
    }
}

impl From<StorageError> for VaultError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable { .. } | StorageError::NotFound(_) => {
                VaultError::StorageUnavailable(err.to_string())
            }
            StorageError::CorruptManifest(_) => VaultError::CommitmentMismatch("chunk manifest"),
            StorageError::InvalidRedundancy { .. } | StorageError::Configuration(_) => {
                VaultError::InvalidInput(err.to_string())
            }
            StorageError::Default(e) => VaultError::Default(e),
        }
    }
}

impl From<RegistryError> for VaultError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Unavailable { .. } => VaultError::RegistryUnavailable(err.to_string()),
            RegistryError::ShardCapacityExceeded { shards } => {
                VaultError::ShardCapacityExceeded(shards)
            }
            RegistryError::VaultNotFound(_) | RegistryError::FileNotFound(_) => {
                VaultError::NotFound(err.to_string())
            }
            // A grantee cannot tell a revoked delegation from one that never
            // existed, and both must fail closed.
            RegistryError::DelegationNotFound => VaultError::DelegationRevoked,
            RegistryError::DelegationExpired => VaultError::DelegationExpired,
            RegistryError::InsufficientPermission(permission) => {
                VaultError::InsufficientPermission(permission)
            }
            RegistryError::Unauthorized(_)
            | RegistryError::SessionNotFound
            | RegistryError::SessionExpired
            | RegistryError::SessionExhausted
            | RegistryError::SessionPermissionDenied(_) => VaultError::Unauthorized(err.to_string()),
            RegistryError::SelfDelegation
            | RegistryError::InvalidExpiry(_)
            | RegistryError::InvalidNonce { .. }
            | RegistryError::InvalidSessionDuration(_)
            | RegistryError::UnanchoredProof => VaultError::InvalidInput(err.to_string()),
            RegistryError::VaultAlreadyExists(_)
            | RegistryError::VaultInactive(_)
            | RegistryError::InvalidTransition { .. }
            | RegistryError::FileAlreadyExists(_)
            | RegistryError::FileInactive(_)
            | RegistryError::HasDelegations { .. }
            | RegistryError::DelegationExists
            | RegistryError::SessionExists
            | RegistryError::Conflict(_) => VaultError::Conflict(err.to_string()),
            RegistryError::Corrupt(_) | RegistryError::Inconsistent(_) => {
                VaultError::Default(anyhow::anyhow!(err.to_string()))
            }
            RegistryError::Default(e) => VaultError::Default(e),
        }
    }
}
