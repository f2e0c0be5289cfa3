use uuid::Uuid;

use super::accounts::Permission;
use crate::crypto::{Commitment, PublicKey};

/// Emitted after every committed registry mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    VaultCreated {
        owner: PublicKey,
        master_key_commitment: Commitment,
    },
    MasterKeyRotated {
        owner: PublicKey,
        master_key_commitment: Commitment,
    },
    VaultFrozen {
        owner: PublicKey,
    },
    VaultUnfrozen {
        owner: PublicKey,
    },
    VaultDeleted {
        owner: PublicKey,
    },
    ShardAllocated {
        owner: PublicKey,
        index: u8,
    },
    FileRegistered {
        owner: PublicKey,
        file_id: Uuid,
        encrypted_size: u64,
        shard_index: u8,
    },
    FileArchived {
        owner: PublicKey,
        file_id: Uuid,
    },
    FileDeleted {
        owner: PublicKey,
        file_id: Uuid,
    },
    DelegationCreated {
        owner: PublicKey,
        file_id: Uuid,
        grantee: PublicKey,
        permission: Permission,
    },
    DelegationAccepted {
        owner: PublicKey,
        file_id: Uuid,
        grantee: PublicKey,
    },
    DelegationUpdated {
        owner: PublicKey,
        file_id: Uuid,
        grantee: PublicKey,
        permission: Permission,
    },
    DelegationRevoked {
        owner: PublicKey,
        file_id: Uuid,
        grantee: PublicKey,
    },
    SessionCreated {
        owner: PublicKey,
        relayer: PublicKey,
    },
    SessionRevoked {
        owner: PublicKey,
        relayer: PublicKey,
    },
    VaultReconciled {
        owner: PublicKey,
        file_count: u64,
        total_storage: u64,
    },
}
