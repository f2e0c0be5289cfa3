use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::crypto::PublicKey;

pub const VAULT_SEED: &[u8] = b"vault";
pub const SHARD_SEED: &[u8] = b"vault_shard";
pub const FILE_SEED: &[u8] = b"file";
pub const DELEGATION_SEED: &[u8] = b"delegation";
pub const SESSION_SEED: &[u8] = b"session";

/// Deterministic ledger account address: `SHA-256(seed || parts...)`.
///
/// Every record can be located from its owner key and indices alone, so the
/// registry never needs an external index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct AccountAddress([u8; 32]);

impl AccountAddress {
    pub fn derive(seed: &[u8], parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        for part in parts {
            hasher.update(part);
        }
        Self(hasher.finalize().into())
    }

    pub fn vault(owner: &PublicKey) -> Self {
        Self::derive(VAULT_SEED, &[owner.as_bytes()])
    }

    pub fn shard(vault: &AccountAddress, index: u8) -> Self {
        Self::derive(SHARD_SEED, &[vault.as_bytes(), &[index]])
    }

    pub fn file(vault: &AccountAddress, file_id: &Uuid) -> Self {
        Self::derive(FILE_SEED, &[vault.as_bytes(), file_id.as_bytes()])
    }

    pub fn delegation(file: &AccountAddress, grantee: &PublicKey) -> Self {
        Self::derive(DELEGATION_SEED, &[file.as_bytes(), grantee.as_bytes()])
    }

    pub fn session(owner: &PublicKey, relayer: &PublicKey) -> Self {
        Self::derive(SESSION_SEED, &[owner.as_bytes(), relayer.as_bytes()])
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl From<[u8; 32]> for AccountAddress {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountAddress({})", self.short())
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::SecretKey;

    #[test]
    fn test_addresses_are_deterministic_and_distinct() {
        let owner = SecretKey::generate().public();
        let vault = AccountAddress::vault(&owner);
        assert_eq!(vault, AccountAddress::vault(&owner));

        assert_ne!(AccountAddress::shard(&vault, 0), AccountAddress::shard(&vault, 1));

        let id = Uuid::new_v4();
        let file = AccountAddress::file(&vault, &id);
        assert_eq!(file, AccountAddress::file(&vault, &id));
        assert_ne!(file, AccountAddress::file(&vault, &Uuid::new_v4()));

        let other = SecretKey::generate().public();
        assert_ne!(
            AccountAddress::session(&owner, &other),
            AccountAddress::session(&other, &owner)
        );
    }
}
