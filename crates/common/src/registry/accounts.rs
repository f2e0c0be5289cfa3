//! On-ledger account records.
//!
//! | Account | Size |
//! |---|---|
//! | [`Vault`] | 170 |
//! | [`FileRecord`] | 406 |
//! | [`Delegation`] | 302 |
//! | [`SessionDelegation`] | 138 |
//! | [`Shard`] | `64 + 16 * capacity` |

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::address::AccountAddress;
use super::layout::{AccountData, AccountReader, AccountWriter, LayoutError};
use crate::crypto::{Commitment, PublicKey, SecurityLevel};
use crate::storage::{ContentHash, Locator};

pub const VAULT_SIZE: usize = 170;
pub const FILE_RECORD_SIZE: usize = 406;
pub const DELEGATION_SIZE: usize = 302;
pub const SESSION_SIZE: usize = 138;
pub const SHARD_HEADER_SIZE: usize = 64;
pub const SHARD_SLOT_SIZE: usize = 16;

/// Longest session delegation, in seconds.
pub const MAX_SESSION_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultStatus {
    Active,
    Frozen,
    Deleted,
}

impl VaultStatus {
    fn tag(self) -> u8 {
        match self {
            VaultStatus::Active => 0,
            VaultStatus::Frozen => 1,
            VaultStatus::Deleted => 2,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, LayoutError> {
        match tag {
            0 => Ok(VaultStatus::Active),
            1 => Ok(VaultStatus::Frozen),
            2 => Ok(VaultStatus::Deleted),
            other => Err(LayoutError::InvalidValue("vault status", other as u64)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Active,
    Archived,
    Deleted,
}

impl FileStatus {
    fn tag(self) -> u8 {
        match self {
            FileStatus::Active => 0,
            FileStatus::Archived => 1,
            FileStatus::Deleted => 2,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, LayoutError> {
        match tag {
            0 => Ok(FileStatus::Active),
            1 => Ok(FileStatus::Archived),
            2 => Ok(FileStatus::Deleted),
            other => Err(LayoutError::InvalidValue("file status", other as u64)),
        }
    }
}

/// What a grantee may do with a delegated file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Metadata only
    View,
    Download,
    /// Download, and delegate onward
    Reshare,
}

impl Permission {
    pub fn can_unwrap(self) -> bool {
        self >= Permission::Download
    }

    pub fn can_reshare(self) -> bool {
        self == Permission::Reshare
    }

    fn tag(self) -> u8 {
        match self {
            Permission::View => 0,
            Permission::Download => 1,
            Permission::Reshare => 2,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, LayoutError> {
        match tag {
            0 => Ok(Permission::View),
            1 => Ok(Permission::Download),
            2 => Ok(Permission::Reshare),
            other => Err(LayoutError::InvalidValue("permission", other as u64)),
        }
    }
}

impl std::str::FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "view" => Ok(Permission::View),
            "download" => Ok(Permission::Download),
            "reshare" => Ok(Permission::Reshare),
            other => Err(format!("unknown permission {other}")),
        }
    }
}

/// Operations a relayer may perform under a session delegation.
///
/// Hard deletes have no bit and so can never be delegated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionPermissions(u8);

impl SessionPermissions {
    pub const UPLOAD: Self = Self(1);
    pub const UPDATE: Self = Self(1 << 1);
    pub const CREATE_SHARD: Self = Self(1 << 2);
    pub const ARCHIVE: Self = Self(1 << 3);
    pub const ALL: Self = Self(0b1111);

    /// `None` if `bits` is empty or names an unknown operation.
    pub fn from_bits(bits: u8) -> Option<Self> {
        (bits != 0 && bits & !Self::ALL.0 == 0).then_some(Self(bits))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for SessionPermissions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One per owner. Counters move only with file registration and removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vault {
    pub owner: PublicKey,
    pub master_key_commitment: Commitment,
    pub file_count: u64,
    pub total_storage: u64,
    pub status: VaultStatus,
    pub shard_count: u8,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Vault {
    pub fn is_active(&self) -> bool {
        self.status == VaultStatus::Active
    }

    pub fn add_file(&mut self, encrypted_size: u64) {
        self.file_count = self.file_count.saturating_add(1);
        self.total_storage = self.total_storage.saturating_add(encrypted_size);
    }

    pub fn remove_file(&mut self, encrypted_size: u64) {
        self.file_count = self.file_count.saturating_sub(1);
        self.total_storage = self.total_storage.saturating_sub(encrypted_size);
    }
}

impl AccountData for Vault {
    const DISCRIMINATOR: [u8; 8] = *b"vl:vault";

    fn encode(&self) -> Vec<u8> {
        AccountWriter::new(&Self::DISCRIMINATOR, VAULT_SIZE)
            .key(&self.owner)
            .commitment(&self.master_key_commitment)
            .u64(self.file_count)
            .u64(self.total_storage)
            .i64(self.created_at)
            .i64(self.updated_at)
            .u8(self.status.tag())
            .u8(self.shard_count)
            .finish()
    }

    fn decode(data: &[u8]) -> Result<Self, LayoutError> {
        let mut r = AccountReader::new(data, &Self::DISCRIMINATOR, VAULT_SIZE)?;
        let owner = r.key()?;
        let master_key_commitment = r.commitment()?;
        let file_count = r.u64()?;
        let total_storage = r.u64()?;
        let created_at = r.i64()?;
        let updated_at = r.i64()?;
        let status = VaultStatus::from_tag(r.u8()?)?;
        let shard_count = r.u8()?;
        Ok(Self {
            owner,
            master_key_commitment,
            file_count,
            total_storage,
            status,
            shard_count,
            created_at,
            updated_at,
        })
    }
}

/// Bounded container of file ids belonging to one vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    pub vault: AccountAddress,
    pub index: u8,
    pub count: u16,
    /// `None` marks a free slot
    pub slots: Vec<Option<Uuid>>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Shard {
    pub fn size_for(capacity: u16) -> usize {
        SHARD_HEADER_SIZE + SHARD_SLOT_SIZE * capacity as usize
    }
}

impl AccountData for Shard {
    const DISCRIMINATOR: [u8; 8] = *b"vl:shard";

    fn encode(&self) -> Vec<u8> {
        let capacity = self.slots.len() as u16;
        let mut writer = AccountWriter::new(&Self::DISCRIMINATOR, Self::size_for(capacity));
        writer
            .bytes(self.vault.as_bytes())
            .u8(self.index)
            .u16(self.count)
            .u16(capacity)
            .i64(self.created_at)
            .i64(self.updated_at)
            .bytes(&[0u8; 3]);
        for slot in &self.slots {
            writer.uuid(&slot.unwrap_or(Uuid::nil()));
        }
        writer.finish()
    }

    fn decode(data: &[u8]) -> Result<Self, LayoutError> {
        // Capacity sits after discriminator, vault, index and count.
        let capacity = data
            .get(43..45)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .ok_or(LayoutError::WrongSize {
                expected: SHARD_HEADER_SIZE,
                actual: data.len(),
            })?;
        let mut r = AccountReader::new(data, &Self::DISCRIMINATOR, Self::size_for(capacity))?;
        let vault = AccountAddress::from(r.array::<32>()?);
        let index = r.u8()?;
        let count = r.u16()?;
        let _capacity = r.u16()?;
        let created_at = r.i64()?;
        let updated_at = r.i64()?;
        let _reserved = r.array::<3>()?;
        let mut slots = Vec::with_capacity(capacity as usize);
        for _ in 0..capacity {
            let id = r.uuid()?;
            slots.push((!id.is_nil()).then_some(id));
        }
        Ok(Self {
            vault,
            index,
            count,
            slots,
            created_at,
            updated_at,
        })
    }
}

/// Registry entry for one uploaded file.
///
/// `encryption_commitment` and `critical_bytes_commitment` are written once
/// at registration; nothing in the registry ever rewrites them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub vault: AccountAddress,
    pub owner: PublicKey,
    pub file_id: Uuid,
    pub filename_hash: Commitment,
    pub mime_type_hash: Commitment,
    pub file_size: u64,
    pub encrypted_size: u64,
    pub security_level: SecurityLevel,
    pub encryption_commitment: Commitment,
    pub critical_bytes_commitment: Commitment,
    pub remainder: ContentHash,
    pub remainder_chunked: bool,
    /// Owner's sealed copy of the critical bytes
    pub envelope: ContentHash,
    pub envelope_chunked: bool,
    pub proof: Option<ContentHash>,
    /// Commitment to the proof's salt and witness key, fixed at registration
    pub proof_anchor: Option<Commitment>,
    pub provider_count: u8,
    pub created_at: i64,
    pub last_accessed: i64,
    pub access_count: u64,
    pub status: FileStatus,
    pub is_shared: bool,
    pub delegation_count: u16,
    pub shard_index: u8,
    pub slot: u16,
}

const REMAINDER_CHUNKED: u8 = 1;
const ENVELOPE_CHUNKED: u8 = 1 << 1;

impl FileRecord {
    pub fn remainder_locator(&self) -> Locator {
        Locator::bare(self.remainder, self.remainder_chunked)
    }

    pub fn envelope_locator(&self) -> Locator {
        Locator::bare(self.envelope, self.envelope_chunked)
    }

    pub fn proof_locator(&self) -> Option<Locator> {
        self.proof.map(|content| Locator::bare(content, false))
    }

    pub fn is_active(&self) -> bool {
        self.status == FileStatus::Active
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.remainder_chunked {
            flags |= REMAINDER_CHUNKED;
        }
        if self.envelope_chunked {
            flags |= ENVELOPE_CHUNKED;
        }
        flags
    }
}

impl AccountData for FileRecord {
    const DISCRIMINATOR: [u8; 8] = *b"vl:file\0";

    fn encode(&self) -> Vec<u8> {
        AccountWriter::new(&Self::DISCRIMINATOR, FILE_RECORD_SIZE)
            .bytes(self.vault.as_bytes())
            .key(&self.owner)
            .uuid(&self.file_id)
            .commitment(&self.filename_hash)
            .commitment(&self.mime_type_hash)
            .u64(self.file_size)
            .u64(self.encrypted_size)
            .u8(self.security_level.tag())
            .commitment(&self.encryption_commitment)
            .commitment(&self.critical_bytes_commitment)
            .content(&self.remainder)
            .content(&self.envelope)
            .content(&self.proof.unwrap_or_default())
            .commitment(&self.proof_anchor.unwrap_or_default())
            .u8(self.flags())
            .u8(self.provider_count)
            .i64(self.created_at)
            .i64(self.last_accessed)
            .u64(self.access_count)
            .u8(self.status.tag())
            .bool(self.is_shared)
            .u16(self.delegation_count)
            .u8(self.shard_index)
            .u16(self.slot)
            .finish()
    }

    fn decode(data: &[u8]) -> Result<Self, LayoutError> {
        let mut r = AccountReader::new(data, &Self::DISCRIMINATOR, FILE_RECORD_SIZE)?;
        let vault = AccountAddress::from(r.array::<32>()?);
        let owner = r.key()?;
        let file_id = r.uuid()?;
        let filename_hash = r.commitment()?;
        let mime_type_hash = r.commitment()?;
        let file_size = r.u64()?;
        let encrypted_size = r.u64()?;
        let tag = r.u8()?;
        let security_level = SecurityLevel::from_tag(tag)
            .ok_or(LayoutError::InvalidValue("security level", tag as u64))?;
        let encryption_commitment = r.commitment()?;
        let critical_bytes_commitment = r.commitment()?;
        let remainder = r.content()?;
        let envelope = r.content()?;
        let proof = r.content()?;
        let proof_anchor = r.commitment()?;
        let flags = r.u8()?;
        let provider_count = r.u8()?;
        let created_at = r.i64()?;
        let last_accessed = r.i64()?;
        let access_count = r.u64()?;
        let status = FileStatus::from_tag(r.u8()?)?;
        let is_shared = r.bool()?;
        let delegation_count = r.u16()?;
        let shard_index = r.u8()?;
        let slot = r.u16()?;
        Ok(Self {
            vault,
            owner,
            file_id,
            filename_hash,
            mime_type_hash,
            file_size,
            encrypted_size,
            security_level,
            encryption_commitment,
            critical_bytes_commitment,
            remainder,
            remainder_chunked: flags & REMAINDER_CHUNKED != 0,
            envelope,
            envelope_chunked: flags & ENVELOPE_CHUNKED != 0,
            proof: (!proof.is_zero()).then_some(proof),
            proof_anchor: (!proof_anchor.is_zero()).then_some(proof_anchor),
            provider_count,
            created_at,
            last_accessed,
            access_count,
            status,
            is_shared,
            delegation_count,
            shard_index,
            slot,
        })
    }
}

/// Grant of one file's critical bytes to one grantee. Revoked by deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    pub file: AccountAddress,
    pub grantor: PublicKey,
    pub grantee: PublicKey,
    pub ephemeral_public_key: PublicKey,
    /// Wrapped critical bytes, held by the storage layer
    pub payload: ContentHash,
    pub payload_chunked: bool,
    pub payload_commitment: Commitment,
    pub payload_size: u64,
    pub permission: Permission,
    pub expires_at: Option<i64>,
    pub created_at: i64,
    pub accepted: bool,
    pub access_count: u64,
    pub last_accessed: i64,
}

impl Delegation {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expires| now >= expires)
    }

    pub fn payload_locator(&self) -> Locator {
        Locator::bare(self.payload, self.payload_chunked)
    }
}

impl AccountData for Delegation {
    const DISCRIMINATOR: [u8; 8] = *b"vl:deleg";

    fn encode(&self) -> Vec<u8> {
        AccountWriter::new(&Self::DISCRIMINATOR, DELEGATION_SIZE)
            .bytes(self.file.as_bytes())
            .key(&self.grantor)
            .key(&self.grantee)
            .key(&self.ephemeral_public_key)
            .content(&self.payload)
            .commitment(&self.payload_commitment)
            .u64(self.payload_size)
            .bool(self.payload_chunked)
            .u8(self.permission.tag())
            .i64(self.expires_at.unwrap_or(0))
            .i64(self.created_at)
            .bool(self.accepted)
            .u64(self.access_count)
            .i64(self.last_accessed)
            .finish()
    }

    fn decode(data: &[u8]) -> Result<Self, LayoutError> {
        let mut r = AccountReader::new(data, &Self::DISCRIMINATOR, DELEGATION_SIZE)?;
        let file = AccountAddress::from(r.array::<32>()?);
        let grantor = r.key()?;
        let grantee = r.key()?;
        let ephemeral_public_key = r.key()?;
        let payload = r.content()?;
        let payload_commitment = r.commitment()?;
        let payload_size = r.u64()?;
        let payload_chunked = r.bool()?;
        let permission = Permission::from_tag(r.u8()?)?;
        let expires_at = r.i64()?;
        let created_at = r.i64()?;
        let accepted = r.bool()?;
        let access_count = r.u64()?;
        let last_accessed = r.i64()?;
        Ok(Self {
            file,
            grantor,
            grantee,
            ephemeral_public_key,
            payload,
            payload_chunked,
            payload_commitment,
            payload_size,
            permission,
            expires_at: (expires_at != 0).then_some(expires_at),
            created_at,
            accepted,
            access_count,
            last_accessed,
        })
    }
}

/// Bounded capability for a relayer to submit registry writes for an owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDelegation {
    pub owner: PublicKey,
    pub relayer: PublicKey,
    /// Next nonce the relayer must present
    pub nonce: u64,
    pub permissions: SessionPermissions,
    pub created_at: i64,
    pub expires_at: i64,
    /// Zero means unlimited
    pub max_operations: u32,
    pub operations_used: u32,
}

impl SessionDelegation {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_operations != 0 && self.operations_used >= self.max_operations
    }
}

impl AccountData for SessionDelegation {
    const DISCRIMINATOR: [u8; 8] = *b"vl:sessn";

    fn encode(&self) -> Vec<u8> {
        AccountWriter::new(&Self::DISCRIMINATOR, SESSION_SIZE)
            .key(&self.owner)
            .key(&self.relayer)
            .u64(self.nonce)
            .u8(self.permissions.bits())
            .i64(self.created_at)
            .i64(self.expires_at)
            .u32(self.max_operations)
            .u32(self.operations_used)
            .finish()
    }

    fn decode(data: &[u8]) -> Result<Self, LayoutError> {
        let mut r = AccountReader::new(data, &Self::DISCRIMINATOR, SESSION_SIZE)?;
        let owner = r.key()?;
        let relayer = r.key()?;
        let nonce = r.u64()?;
        let bits = r.u8()?;
        let permissions = SessionPermissions::from_bits(bits)
            .ok_or(LayoutError::InvalidValue("session permissions", bits as u64))?;
        let created_at = r.i64()?;
        let expires_at = r.i64()?;
        let max_operations = r.u32()?;
        let operations_used = r.u32()?;
        Ok(Self {
            owner,
            relayer,
            nonce,
            permissions,
            created_at,
            expires_at,
            max_operations,
            operations_used,
        })
    }
}
