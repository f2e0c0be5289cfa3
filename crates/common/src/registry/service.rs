use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::timeout;
use uuid::Uuid;

use super::accounts::{
    Delegation, FileRecord, FileStatus, Permission, SessionDelegation, SessionPermissions, Shard,
    Vault, VaultStatus, MAX_SESSION_SECS,
};
use super::address::AccountAddress;
use super::clock::{Clock, SystemClock};
use super::events::RegistryEvent;
use super::layout::{AccountData, LayoutError};
use super::ledger::{Account, Ledger, LedgerError, TxReceipt, Write};
use super::shard::first_fit;
use crate::config::RegistryConfig;
use crate::crypto::{Commitment, PublicKey, SecurityLevel};
use crate::storage::ContentHash;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry unavailable after {attempts} attempts: {reason}")]
    Unavailable { attempts: u32, reason: String },
    #[error("vault already holds the maximum of {shards} shards")]
    ShardCapacityExceeded { shards: u8 },
    #[error("no vault for {0}")]
    VaultNotFound(PublicKey),
    #[error("vault for {0} already exists")]
    VaultAlreadyExists(PublicKey),
    #[error("vault is {0:?}")]
    VaultInactive(VaultStatus),
    #[error("vault cannot move from {from:?} to {to:?}")]
    InvalidTransition { from: VaultStatus, to: VaultStatus },
    #[error("file {0} not found")]
    FileNotFound(Uuid),
    #[error("file {0} is already registered")]
    FileAlreadyExists(Uuid),
    #[error("file {0} is not active")]
    FileInactive(Uuid),
    #[error("a proof must be registered together with its anchor")]
    UnanchoredProof,
    #[error("file {file_id} still has {count} delegations")]
    HasDelegations { file_id: Uuid, count: u16 },
    #[error("delegation not found")]
    DelegationNotFound,
    #[error("delegation already exists for this grantee")]
    DelegationExists,
    #[error("delegation expired")]
    DelegationExpired,
    #[error("cannot delegate to yourself")]
    SelfDelegation,
    #[error("expiry {0} is not in the future")]
    InvalidExpiry(i64),
    #[error("{0:?} permission does not allow this")]
    InsufficientPermission(Permission),
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),
    #[error("session delegation not found")]
    SessionNotFound,
    #[error("session delegation already exists")]
    SessionExists,
    #[error("session delegation expired")]
    SessionExpired,
    #[error("session delegation has no operations left")]
    SessionExhausted,
    #[error("session delegation does not permit {0}")]
    SessionPermissionDenied(&'static str),
    #[error("invalid session nonce: expected {expected}, got {actual}")]
    InvalidNonce { expected: u64, actual: u64 },
    #[error("session duration {0}s is outside 1s..=7d")]
    InvalidSessionDuration(i64),
    #[error("write conflict on account {0}")]
    Conflict(AccountAddress),
    #[error("corrupt account: {0}")]
    Corrupt(#[from] LayoutError),
    #[error("registry inconsistent: {0}")]
    Inconsistent(String),
    #[error("registry error: {0}")]
    Default(#[from] anyhow::Error),
}

impl From<LedgerError> for RegistryError {
    fn from(err: LedgerError) -> Self {
        match err {
            // A vanished account is a lost race like any other.
            LedgerError::Conflict(address) | LedgerError::NotFound(address) => {
                RegistryError::Conflict(address)
            }
            LedgerError::Unavailable(_) | LedgerError::Timeout => RegistryError::Unavailable {
                attempts: 1,
                reason: err.to_string(),
            },
        }
    }
}

/// Everything `register_file` needs beyond the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
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
    pub envelope: ContentHash,
    pub envelope_chunked: bool,
    pub proof: Option<ContentHash>,
    /// Binds the proof's salt and witness key; set exactly when `proof` is
    pub proof_anchor: Option<Commitment>,
    pub provider_count: u8,
}

impl NewFile {
    /// Whether `record` is this registration, committed by an earlier
    /// attempt whose reply was lost.
    fn registered_as(&self, record: &FileRecord) -> bool {
        record.file_id == self.file_id
            && record.encrypted_size == self.encrypted_size
            && record.security_level == self.security_level
            && record.encryption_commitment == self.encryption_commitment
            && record.critical_bytes_commitment == self.critical_bytes_commitment
            && record.remainder == self.remainder
            && record.envelope == self.envelope
            && record.proof == self.proof
            && record.proof_anchor == self.proof_anchor
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDelegation {
    pub grantee: PublicKey,
    pub ephemeral_public_key: PublicKey,
    pub payload: ContentHash,
    pub payload_chunked: bool,
    pub payload_commitment: Commitment,
    pub payload_size: u64,
    pub permission: Permission,
    pub expires_at: Option<i64>,
}

impl NewDelegation {
    /// Whether `delegation` is this grant, committed by an earlier attempt.
    fn granted_as(&self, grantor: &PublicKey, delegation: &Delegation) -> bool {
        delegation.grantor == *grantor
            && delegation.grantee == self.grantee
            && delegation.ephemeral_public_key == self.ephemeral_public_key
            && delegation.payload == self.payload
            && delegation.payload_commitment == self.payload_commitment
            && delegation.permission == self.permission
            && delegation.expires_at == self.expires_at
    }
}

/// Outcome of [`Registry::reconcile_vault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub previous_file_count: u64,
    pub previous_total_storage: u64,
    pub file_count: u64,
    pub total_storage: u64,
    /// Shards whose stored count disagreed with their slots
    pub shards_repaired: usize,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        self.previous_file_count != self.file_count
            || self.previous_total_storage != self.total_storage
            || self.shards_repaired > 0
    }
}

struct Loaded<A> {
    version: u64,
    value: A,
}

impl<A: AccountData> Loaded<A> {
    fn update(&self, address: AccountAddress) -> Write {
        Write::Update {
            address,
            expected_version: self.version,
            data: self.value.encode(),
        }
    }

    fn delete(&self, address: AccountAddress) -> Write {
        Write::Delete {
            address,
            expected_version: self.version,
        }
    }
}

/// A transaction ready to submit, plus what to report once it commits.
struct Plan<T> {
    writes: Vec<Write>,
    output: T,
    events: Vec<RegistryEvent>,
}

impl<T> Plan<T> {
    fn new(writes: Vec<Write>, output: T) -> Self {
        Self {
            writes,
            output,
            events: Vec::new(),
        }
    }

    fn event(mut self, event: RegistryEvent) -> Self {
        self.events.push(event);
        self
    }
}

fn create(address: AccountAddress, account: &impl AccountData) -> Write {
    Write::Create {
        address,
        data: account.encode(),
    }
}

/// Typed, sharded view over the ledger.
///
/// Every mutation reads the accounts it touches, plans a batch with the
/// versions it saw and submits it atomically. A batch that loses a race is
/// re-planned from fresh state, so uniqueness checks such as "one record per
/// (vault, file id)" always run against committed data. Unavailable or slow
/// ledger calls are retried with capped exponential backoff.
#[derive(Debug, Clone)]
pub struct Registry {
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
    config: RegistryConfig,
    events: broadcast::Sender<RegistryEvent>,
}

impl Registry {
    pub fn new(ledger: Arc<dyn Ledger>, config: RegistryConfig) -> Self {
        Self::with_clock(ledger, Arc::new(SystemClock), config)
    }

    pub fn with_clock(ledger: Arc<dyn Ledger>, clock: Arc<dyn Clock>, config: RegistryConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            ledger,
            clock,
            config,
            events,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /* Ledger plumbing */

    async fn call<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, RegistryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let attempts = self.config.max_attempts.max(1);
        let mut last = LedgerError::Timeout;
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.config.backoff(attempt - 1)).await;
            }
            match timeout(self.config.call_timeout(), call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if e.is_transient() => {
                    tracing::warn!(op, attempt, error = %e, "ledger call failed");
                    last = e;
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    tracing::warn!(op, attempt, "ledger call timed out");
                    last = LedgerError::Timeout;
                }
            }
        }
        tracing::error!(op, attempts, "ledger unreachable");
        Err(RegistryError::Unavailable {
            attempts,
            reason: last.to_string(),
        })
    }

    async fn fetch(&self, address: &AccountAddress) -> Result<Option<Account>, RegistryError> {
        self.call("fetch", || self.ledger.fetch(address)).await
    }

    async fn submit(&self, writes: Vec<Write>) -> Result<TxReceipt, RegistryError> {
        self.call("submit", || self.ledger.submit(writes.clone())).await
    }

    async fn load<A: AccountData>(
        &self,
        address: &AccountAddress,
    ) -> Result<Option<Loaded<A>>, RegistryError> {
        match self.fetch(address).await? {
            Some(account) => Ok(Some(Loaded {
                version: account.version,
                value: A::decode(&account.data)?,
            })),
            None => Ok(None),
        }
    }

    async fn transact<T, F, Fut>(&self, op: &'static str, mut plan: F) -> Result<T, RegistryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Plan<T>, RegistryError>>,
    {
        let attempts = self.config.max_attempts.max(1);
        let mut contended = AccountAddress::default();
        for attempt in 0..attempts {
            let Plan {
                writes,
                output,
                events,
            } = plan().await?;
            if writes.is_empty() {
                return Ok(output);
            }
            match self.submit(writes).await {
                Ok(receipt) => {
                    tracing::debug!(op, sequence = receipt.sequence, writes = receipt.writes, "committed");
                    for event in events {
                        // No subscribers is fine.
                        let _ = self.events.send(event);
                    }
                    return Ok(output);
                }
                Err(RegistryError::Conflict(address)) => {
                    tracing::debug!(op, attempt, account = %address.short(), "write conflict, replanning");
                    contended = address;
                }
                Err(e) => return Err(e),
            }
        }
        Err(RegistryError::Conflict(contended))
    }

    /* Account helpers */

    async fn vault_loaded(&self, owner: &PublicKey) -> Result<Loaded<Vault>, RegistryError> {
        self.load(&AccountAddress::vault(owner))
            .await?
            .ok_or(RegistryError::VaultNotFound(*owner))
    }

    async fn active_vault(&self, owner: &PublicKey) -> Result<Loaded<Vault>, RegistryError> {
        let vault = self.vault_loaded(owner).await?;
        if !vault.value.is_active() {
            return Err(RegistryError::VaultInactive(vault.value.status));
        }
        Ok(vault)
    }

    async fn shards_loaded(
        &self,
        vault: &AccountAddress,
        count: u8,
    ) -> Result<Vec<Loaded<Shard>>, RegistryError> {
        let mut shards = Vec::with_capacity(count as usize);
        for index in 0..count {
            let shard = self
                .load(&AccountAddress::shard(vault, index))
                .await?
                .ok_or_else(|| RegistryError::Inconsistent(format!("shard {index} missing")))?;
            shards.push(shard);
        }
        Ok(shards)
    }

    async fn file_loaded(
        &self,
        vault: &AccountAddress,
        file_id: &Uuid,
    ) -> Result<Loaded<FileRecord>, RegistryError> {
        self.load(&AccountAddress::file(vault, file_id))
            .await?
            .ok_or(RegistryError::FileNotFound(*file_id))
    }

    async fn delegation_loaded(
        &self,
        file: &AccountAddress,
        grantee: &PublicKey,
    ) -> Result<Loaded<Delegation>, RegistryError> {
        self.load(&AccountAddress::delegation(file, grantee))
            .await?
            .ok_or(RegistryError::DelegationNotFound)
    }

    /* Reads */

    pub async fn vault(&self, owner: &PublicKey) -> Result<Option<Vault>, RegistryError> {
        Ok(self
            .load::<Vault>(&AccountAddress::vault(owner))
            .await?
            .map(|l| l.value))
    }

    pub async fn shards(&self, owner: &PublicKey) -> Result<Vec<Shard>, RegistryError> {
        let vault = self.vault_loaded(owner).await?;
        let shards = self
            .shards_loaded(&AccountAddress::vault(owner), vault.value.shard_count)
            .await?;
        Ok(shards.into_iter().map(|l| l.value).collect())
    }

    pub async fn file(
        &self,
        owner: &PublicKey,
        file_id: &Uuid,
    ) -> Result<Option<FileRecord>, RegistryError> {
        let vault = AccountAddress::vault(owner);
        Ok(self
            .load::<FileRecord>(&AccountAddress::file(&vault, file_id))
            .await?
            .map(|l| l.value))
    }

    /// Every file in the vault, in shard and slot order.
    pub async fn list_files(&self, owner: &PublicKey) -> Result<Vec<FileRecord>, RegistryError> {
        let vault = AccountAddress::vault(owner);
        let mut files = Vec::new();
        for shard in self.shards(owner).await? {
            for file_id in shard.file_ids() {
                files.push(self.file_loaded(&vault, file_id).await?.value);
            }
        }
        Ok(files)
    }

    pub async fn delegation(
        &self,
        owner: &PublicKey,
        file_id: &Uuid,
        grantee: &PublicKey,
    ) -> Result<Option<Delegation>, RegistryError> {
        let file = AccountAddress::file(&AccountAddress::vault(owner), file_id);
        Ok(self
            .load::<Delegation>(&AccountAddress::delegation(&file, grantee))
            .await?
            .map(|l| l.value))
    }

    pub async fn session(
        &self,
        owner: &PublicKey,
        relayer: &PublicKey,
    ) -> Result<Option<SessionDelegation>, RegistryError> {
        Ok(self
            .load::<SessionDelegation>(&AccountAddress::session(owner, relayer))
            .await?
            .map(|l| l.value))
    }

    /* Vaults */

    /// Create the owner's vault together with its first shard.
    pub async fn initialize_vault(
        &self,
        owner: &PublicKey,
        master_key_commitment: Commitment,
    ) -> Result<Vault, RegistryError> {
        let vault = self
            .transact("initialize_vault", || {
                self.plan_initialize(owner, master_key_commitment)
            })
            .await?;
        tracing::info!(owner = %owner.to_hex(), commitment = %master_key_commitment.short(), "vault initialized");
        Ok(vault)
    }

    async fn plan_initialize(
        &self,
        owner: &PublicKey,
        master_key_commitment: Commitment,
    ) -> Result<Plan<Vault>, RegistryError> {
        let address = AccountAddress::vault(owner);
        if self.fetch(&address).await?.is_some() {
            return Err(RegistryError::VaultAlreadyExists(*owner));
        }
        let now = self.now();
        let vault = Vault {
            owner: *owner,
            master_key_commitment,
            file_count: 0,
            total_storage: 0,
            status: VaultStatus::Active,
            shard_count: 1,
            created_at: now,
            updated_at: now,
        };
        let shard = Shard::allocate(address, 0, self.config.shard_capacity, now);
        Ok(Plan::new(
            vec![
                create(address, &vault),
                create(AccountAddress::shard(&address, 0), &shard),
            ],
            vault,
        )
        .event(RegistryEvent::VaultCreated {
            owner: *owner,
            master_key_commitment,
        })
        .event(RegistryEvent::ShardAllocated {
            owner: *owner,
            index: 0,
        }))
    }

    pub async fn rotate_master_key(
        &self,
        owner: &PublicKey,
        master_key_commitment: Commitment,
    ) -> Result<Vault, RegistryError> {
        self.transact("rotate_master_key", || async move {
            let mut vault = self.active_vault(owner).await?;
            vault.value.master_key_commitment = master_key_commitment;
            vault.value.updated_at = self.now();
            Ok(Plan::new(
                vec![vault.update(AccountAddress::vault(owner))],
                vault.value,
            )
            .event(RegistryEvent::MasterKeyRotated {
                owner: *owner,
                master_key_commitment,
            }))
        })
        .await
    }

    pub async fn freeze_vault(&self, owner: &PublicKey) -> Result<Vault, RegistryError> {
        self.set_vault_status(owner, &[VaultStatus::Active], VaultStatus::Frozen)
            .await
    }

    pub async fn unfreeze_vault(&self, owner: &PublicKey) -> Result<Vault, RegistryError> {
        self.set_vault_status(owner, &[VaultStatus::Frozen], VaultStatus::Active)
            .await
    }

    /// Soft delete. The account stays on the ledger with `Deleted` status.
    pub async fn delete_vault(&self, owner: &PublicKey) -> Result<Vault, RegistryError> {
        self.set_vault_status(
            owner,
            &[VaultStatus::Active, VaultStatus::Frozen],
            VaultStatus::Deleted,
        )
        .await
    }

    async fn set_vault_status(
        &self,
        owner: &PublicKey,
        from: &[VaultStatus],
        to: VaultStatus,
    ) -> Result<Vault, RegistryError> {
        let vault = self
            .transact("set_vault_status", || async move {
                let mut vault = self.vault_loaded(owner).await?;
                if !from.contains(&vault.value.status) {
                    return Err(RegistryError::InvalidTransition {
                        from: vault.value.status,
                        to,
                    });
                }
                vault.value.status = to;
                vault.value.updated_at = self.now();
                let event = match to {
                    VaultStatus::Active => RegistryEvent::VaultUnfrozen { owner: *owner },
                    VaultStatus::Frozen => RegistryEvent::VaultFrozen { owner: *owner },
                    VaultStatus::Deleted => RegistryEvent::VaultDeleted { owner: *owner },
                };
                Ok(Plan::new(
                    vec![vault.update(AccountAddress::vault(owner))],
                    vault.value,
                )
                .event(event))
            })
            .await?;
        tracing::info!(owner = %owner.to_hex(), status = ?to, "vault status changed");
        Ok(vault)
    }

    /* Shards */

    /// Append an empty shard to the vault, returning its index.
    pub async fn allocate_shard(&self, owner: &PublicKey) -> Result<u8, RegistryError> {
        let index = self
            .transact("allocate_shard", || async move {
                let mut vault = self.active_vault(owner).await?;
                if vault.value.shard_count >= self.config.max_shards {
                    return Err(RegistryError::ShardCapacityExceeded {
                        shards: vault.value.shard_count,
                    });
                }
                let address = AccountAddress::vault(owner);
                let index = vault.value.shard_count;
                let now = self.now();
                let shard = Shard::allocate(address, index, self.config.shard_capacity, now);
                vault.value.shard_count += 1;
                vault.value.updated_at = now;
                Ok(Plan::new(
                    vec![
                        create(AccountAddress::shard(&address, index), &shard),
                        vault.update(address),
                    ],
                    index,
                )
                .event(RegistryEvent::ShardAllocated {
                    owner: *owner,
                    index,
                }))
            })
            .await?;
        tracing::info!(owner = %owner.to_hex(), index, "shard allocated");
        Ok(index)
    }

    /* Files */

    /// Record a stored file. The file account, its shard slot and the vault
    /// counters commit in one batch. A full vault grows a new shard in the
    /// same batch.
    pub async fn register_file(
        &self,
        owner: &PublicKey,
        file: NewFile,
    ) -> Result<FileRecord, RegistryError> {
        let record = self
            .transact("register_file", || self.plan_register(owner, &file, true))
            .await?;
        tracing::info!(
            owner = %owner.to_hex(),
            file_id = %record.file_id,
            shard = record.shard_index,
            slot = record.slot,
            "file registered"
        );
        Ok(record)
    }

    /// Register on the owner's behalf under a session delegation. The
    /// session's nonce and usage counter advance in the same batch.
    pub async fn register_file_via_session(
        &self,
        relayer: &PublicKey,
        owner: &PublicKey,
        nonce: u64,
        file: NewFile,
    ) -> Result<FileRecord, RegistryError> {
        let file = &file;
        self.transact("register_file_via_session", || async move {
            // The nonce already moved if an earlier attempt committed.
            if let Some(record) = self.committed_registration(owner, file).await? {
                return Ok(Plan::new(Vec::new(), record));
            }
            let address = AccountAddress::session(owner, relayer);
            let mut session = self
                .load::<SessionDelegation>(&address)
                .await?
                .ok_or(RegistryError::SessionNotFound)?;
            if session.value.is_expired(self.now()) {
                return Err(RegistryError::SessionExpired);
            }
            if !session.value.permissions.contains(SessionPermissions::UPLOAD) {
                return Err(RegistryError::SessionPermissionDenied("upload"));
            }
            if session.value.nonce != nonce {
                return Err(RegistryError::InvalidNonce {
                    expected: session.value.nonce,
                    actual: nonce,
                });
            }
            if session.value.is_exhausted() {
                return Err(RegistryError::SessionExhausted);
            }

            let allow_shard = session
                .value
                .permissions
                .contains(SessionPermissions::CREATE_SHARD);
            let mut plan = self.plan_register(owner, file, allow_shard).await?;
            session.value.nonce += 1;
            session.value.operations_used = session.value.operations_used.saturating_add(1);
            plan.writes.push(session.update(address));
            Ok(plan)
        })
        .await
    }

    /// The record an earlier attempt of this same registration committed.
    /// A different record under the same id is a conflict.
    async fn committed_registration(
        &self,
        owner: &PublicKey,
        file: &NewFile,
    ) -> Result<Option<FileRecord>, RegistryError> {
        let address = AccountAddress::file(&AccountAddress::vault(owner), &file.file_id);
        match self.load::<FileRecord>(&address).await? {
            Some(existing) if file.registered_as(&existing.value) => {
                tracing::debug!(file_id = %file.file_id, "registration already committed");
                Ok(Some(existing.value))
            }
            Some(_) => Err(RegistryError::FileAlreadyExists(file.file_id)),
            None => Ok(None),
        }
    }

    async fn plan_register(
        &self,
        owner: &PublicKey,
        file: &NewFile,
        allow_new_shard: bool,
    ) -> Result<Plan<FileRecord>, RegistryError> {
        if file.proof.is_some() != file.proof_anchor.is_some() {
            return Err(RegistryError::UnanchoredProof);
        }
        let vault_address = AccountAddress::vault(owner);
        let mut vault = self.active_vault(owner).await?;
        let file_address = AccountAddress::file(&vault_address, &file.file_id);
        if let Some(record) = self.committed_registration(owner, file).await? {
            return Ok(Plan::new(Vec::new(), record));
        }

        let now = self.now();
        let mut shards = self
            .shards_loaded(&vault_address, vault.value.shard_count)
            .await?;
        let values: Vec<Shard> = shards.iter().map(|l| l.value.clone()).collect();

        let mut writes = Vec::with_capacity(3);
        let mut events = Vec::with_capacity(2);
        let (shard_index, slot) = match first_fit(&values) {
            Some(position) => {
                let shard = &mut shards[position];
                let slot = shard
                    .value
                    .insert(file.file_id, now)
                    .ok_or_else(|| RegistryError::Inconsistent("first fit shard is full".into()))?;
                writes.push(shard.update(AccountAddress::shard(&vault_address, shard.value.index)));
                (shard.value.index, slot)
            }
            None => {
                if vault.value.shard_count >= self.config.max_shards {
                    return Err(RegistryError::ShardCapacityExceeded {
                        shards: vault.value.shard_count,
                    });
                }
                if !allow_new_shard {
                    return Err(RegistryError::SessionPermissionDenied("create_shard"));
                }
                let index = vault.value.shard_count;
                let mut shard = Shard::allocate(vault_address, index, self.config.shard_capacity, now);
                let slot = shard
                    .insert(file.file_id, now)
                    .ok_or_else(|| RegistryError::Inconsistent("new shard has no capacity".into()))?;
                writes.push(create(AccountAddress::shard(&vault_address, index), &shard));
                vault.value.shard_count += 1;
                events.push(RegistryEvent::ShardAllocated {
                    owner: *owner,
                    index,
                });
                tracing::info!(owner = %owner.to_hex(), index, "allocating shard for new file");
                (index, slot)
            }
        };

        vault.value.add_file(file.encrypted_size);
        vault.value.updated_at = now;
        writes.push(vault.update(vault_address));

        let record = FileRecord {
            vault: vault_address,
            owner: *owner,
            file_id: file.file_id,
            filename_hash: file.filename_hash,
            mime_type_hash: file.mime_type_hash,
            file_size: file.file_size,
            encrypted_size: file.encrypted_size,
            security_level: file.security_level,
            encryption_commitment: file.encryption_commitment,
            critical_bytes_commitment: file.critical_bytes_commitment,
            remainder: file.remainder,
            remainder_chunked: file.remainder_chunked,
            envelope: file.envelope,
            envelope_chunked: file.envelope_chunked,
            proof: file.proof,
            proof_anchor: file.proof_anchor,
            provider_count: file.provider_count,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            status: FileStatus::Active,
            is_shared: false,
            delegation_count: 0,
            shard_index,
            slot,
        };
        writes.push(create(file_address, &record));
        events.push(RegistryEvent::FileRegistered {
            owner: *owner,
            file_id: file.file_id,
            encrypted_size: file.encrypted_size,
            shard_index,
        });

        Ok(Plan {
            writes,
            output: record,
            events,
        })
    }

    pub async fn update_file_storage(
        &self,
        owner: &PublicKey,
        file_id: &Uuid,
        provider_count: u8,
    ) -> Result<FileRecord, RegistryError> {
        self.transact("update_file_storage", || async move {
            let vault = AccountAddress::vault(owner);
            self.active_vault(owner).await?;
            let mut file = self.file_loaded(&vault, file_id).await?;
            file.value.provider_count = provider_count;
            Ok(Plan::new(
                vec![file.update(AccountAddress::file(&vault, file_id))],
                file.value,
            ))
        })
        .await
    }

    /// Archived files stay readable but can no longer be shared.
    pub async fn archive_file(
        &self,
        owner: &PublicKey,
        file_id: &Uuid,
    ) -> Result<FileRecord, RegistryError> {
        self.transact("archive_file", || async move {
            let vault = AccountAddress::vault(owner);
            self.active_vault(owner).await?;
            let mut file = self.file_loaded(&vault, file_id).await?;
            if !file.value.is_active() {
                return Err(RegistryError::FileInactive(*file_id));
            }
            file.value.status = FileStatus::Archived;
            Ok(Plan::new(
                vec![file.update(AccountAddress::file(&vault, file_id))],
                file.value,
            )
            .event(RegistryEvent::FileArchived {
                owner: *owner,
                file_id: *file_id,
            }))
        })
        .await
    }

    pub async fn record_access(
        &self,
        owner: &PublicKey,
        file_id: &Uuid,
    ) -> Result<FileRecord, RegistryError> {
        self.transact("record_access", || async move {
            let vault = AccountAddress::vault(owner);
            let mut file = self.file_loaded(&vault, file_id).await?;
            file.value.last_accessed = self.now();
            file.value.access_count = file.value.access_count.saturating_add(1);
            Ok(Plan::new(
                vec![file.update(AccountAddress::file(&vault, file_id))],
                file.value,
            ))
        })
        .await
    }

    /// Remove the record, its shard slot and its share of the vault counters
    /// in one batch. Refused while delegations are outstanding.
    pub async fn delete_file(
        &self,
        owner: &PublicKey,
        file_id: &Uuid,
    ) -> Result<FileRecord, RegistryError> {
        let record = self
            .transact("delete_file", || async move {
                let vault_address = AccountAddress::vault(owner);
                let mut vault = self.active_vault(owner).await?;
                let file = self.file_loaded(&vault_address, file_id).await?;
                if file.value.delegation_count > 0 {
                    return Err(RegistryError::HasDelegations {
                        file_id: *file_id,
                        count: file.value.delegation_count,
                    });
                }

                let shard_address = AccountAddress::shard(&vault_address, file.value.shard_index);
                let mut shard = self
                    .load::<Shard>(&shard_address)
                    .await?
                    .ok_or_else(|| RegistryError::Inconsistent("file shard missing".into()))?;
                let now = self.now();
                shard.value.remove(file_id, now);
                vault.value.remove_file(file.value.encrypted_size);
                vault.value.updated_at = now;

                Ok(Plan::new(
                    vec![
                        file.delete(AccountAddress::file(&vault_address, file_id)),
                        shard.update(shard_address),
                        vault.update(vault_address),
                    ],
                    file.value,
                )
                .event(RegistryEvent::FileDeleted {
                    owner: *owner,
                    file_id: *file_id,
                }))
            })
            .await?;
        tracing::info!(owner = %owner.to_hex(), file_id = %file_id, "file deleted");
        Ok(record)
    }

    /* Delegations */

    /// Grant `delegation.grantee` access to one file. The grantor is the
    /// owner, or a grantee holding an unexpired `Reshare` delegation.
    pub async fn create_delegation(
        &self,
        grantor: &PublicKey,
        owner: &PublicKey,
        file_id: &Uuid,
        delegation: NewDelegation,
    ) -> Result<Delegation, RegistryError> {
        let created = self
            .transact("create_delegation", || {
                self.plan_delegation(grantor, owner, file_id, &delegation)
            })
            .await?;
        tracing::info!(
            file_id = %file_id,
            grantee = %created.grantee.to_hex(),
            permission = ?created.permission,
            "delegation created"
        );
        Ok(created)
    }

    async fn plan_delegation(
        &self,
        grantor: &PublicKey,
        owner: &PublicKey,
        file_id: &Uuid,
        new: &NewDelegation,
    ) -> Result<Plan<Delegation>, RegistryError> {
        if new.grantee == *grantor || new.grantee == *owner {
            return Err(RegistryError::SelfDelegation);
        }
        let now = self.now();
        if let Some(expires_at) = new.expires_at {
            if expires_at <= now {
                return Err(RegistryError::InvalidExpiry(expires_at));
            }
        }

        let vault = AccountAddress::vault(owner);
        self.active_vault(owner).await?;
        let file_address = AccountAddress::file(&vault, file_id);
        let mut file = self.file_loaded(&vault, file_id).await?;
        if !file.value.is_active() {
            return Err(RegistryError::FileInactive(*file_id));
        }
        if grantor != owner {
            let held = match self.delegation_loaded(&file_address, grantor).await {
                Err(RegistryError::DelegationNotFound) => {
                    return Err(RegistryError::Unauthorized("grantor holds no delegation"))
                }
                other => other?,
            };
            if held.value.is_expired(now) {
                return Err(RegistryError::DelegationExpired);
            }
            if !held.value.permission.can_reshare() {
                return Err(RegistryError::InsufficientPermission(held.value.permission));
            }
        }

        let address = AccountAddress::delegation(&file_address, &new.grantee);
        match self.load::<Delegation>(&address).await? {
            Some(existing) if new.granted_as(grantor, &existing.value) => {
                tracing::debug!(file_id = %file_id, "delegation already committed");
                return Ok(Plan::new(Vec::new(), existing.value));
            }
            Some(_) => return Err(RegistryError::DelegationExists),
            None => {}
        }

        let delegation = Delegation {
            file: file_address,
            grantor: *grantor,
            grantee: new.grantee,
            ephemeral_public_key: new.ephemeral_public_key,
            payload: new.payload,
            payload_chunked: new.payload_chunked,
            payload_commitment: new.payload_commitment,
            payload_size: new.payload_size,
            permission: new.permission,
            expires_at: new.expires_at,
            created_at: now,
            accepted: false,
            access_count: 0,
            last_accessed: 0,
        };
        file.value.delegation_count = file.value.delegation_count.saturating_add(1);
        file.value.is_shared = true;

        Ok(Plan::new(
            vec![create(address, &delegation), file.update(file_address)],
            delegation,
        )
        .event(RegistryEvent::DelegationCreated {
            owner: *owner,
            file_id: *file_id,
            grantee: new.grantee,
            permission: new.permission,
        }))
    }

    /// Mark a delegation accepted. Only the grantee can do this, which the
    /// grantee-derived address enforces.
    pub async fn accept_delegation(
        &self,
        grantee: &PublicKey,
        owner: &PublicKey,
        file_id: &Uuid,
    ) -> Result<Delegation, RegistryError> {
        self.transact("accept_delegation", || async move {
            let file = AccountAddress::file(&AccountAddress::vault(owner), file_id);
            let mut delegation = self.delegation_loaded(&file, grantee).await?;
            if delegation.value.is_expired(self.now()) {
                return Err(RegistryError::DelegationExpired);
            }
            delegation.value.accepted = true;
            Ok(Plan::new(
                vec![delegation.update(AccountAddress::delegation(&file, grantee))],
                delegation.value,
            )
            .event(RegistryEvent::DelegationAccepted {
                owner: *owner,
                file_id: *file_id,
                grantee: *grantee,
            }))
        })
        .await
    }

    pub async fn update_delegation(
        &self,
        grantor: &PublicKey,
        owner: &PublicKey,
        file_id: &Uuid,
        grantee: &PublicKey,
        permission: Permission,
        expires_at: Option<i64>,
    ) -> Result<Delegation, RegistryError> {
        self.transact("update_delegation", || async move {
            let file = AccountAddress::file(&AccountAddress::vault(owner), file_id);
            let mut delegation = self.delegation_loaded(&file, grantee).await?;
            if delegation.value.grantor != *grantor && owner != grantor {
                return Err(RegistryError::Unauthorized("only the grantor or owner may update"));
            }
            if let Some(expires_at) = expires_at {
                if expires_at <= self.now() {
                    return Err(RegistryError::InvalidExpiry(expires_at));
                }
            }
            delegation.value.permission = permission;
            delegation.value.expires_at = expires_at;
            Ok(Plan::new(
                vec![delegation.update(AccountAddress::delegation(&file, grantee))],
                delegation.value,
            )
            .event(RegistryEvent::DelegationUpdated {
                owner: *owner,
                file_id: *file_id,
                grantee: *grantee,
                permission,
            }))
        })
        .await
    }

    /// Count one access by the grantee. Fails closed on expiry and on
    /// permissions that do not allow unwrapping.
    pub async fn record_delegation_access(
        &self,
        grantee: &PublicKey,
        owner: &PublicKey,
        file_id: &Uuid,
    ) -> Result<Delegation, RegistryError> {
        self.transact("record_delegation_access", || async move {
            let vault = AccountAddress::vault(owner);
            let file = AccountAddress::file(&vault, file_id);
            // Reads of archived files are refused, so they are not counted.
            if !self.file_loaded(&vault, file_id).await?.value.is_active() {
                return Err(RegistryError::FileInactive(*file_id));
            }
            let mut delegation = self.delegation_loaded(&file, grantee).await?;
            let now = self.now();
            if delegation.value.is_expired(now) {
                return Err(RegistryError::DelegationExpired);
            }
            if !delegation.value.permission.can_unwrap() {
                return Err(RegistryError::InsufficientPermission(
                    delegation.value.permission,
                ));
            }
            delegation.value.access_count = delegation.value.access_count.saturating_add(1);
            delegation.value.last_accessed = now;
            Ok(Plan::new(
                vec![delegation.update(AccountAddress::delegation(&file, grantee))],
                delegation.value,
            ))
        })
        .await
    }

    /// Delete the delegation. This is the only way to revoke access.
    pub async fn revoke_delegation(
        &self,
        grantor: &PublicKey,
        owner: &PublicKey,
        file_id: &Uuid,
        grantee: &PublicKey,
    ) -> Result<Delegation, RegistryError> {
        let revoked = self
            .transact("revoke_delegation", || async move {
                let vault = AccountAddress::vault(owner);
                let file_address = AccountAddress::file(&vault, file_id);
                let delegation = self.delegation_loaded(&file_address, grantee).await?;
                if delegation.value.grantor != *grantor && owner != grantor {
                    return Err(RegistryError::Unauthorized("only the grantor or owner may revoke"));
                }
                let mut file = self.file_loaded(&vault, file_id).await?;
                file.value.delegation_count = file.value.delegation_count.saturating_sub(1);
                file.value.is_shared = file.value.delegation_count > 0;
                Ok(Plan::new(
                    vec![
                        delegation.delete(AccountAddress::delegation(&file_address, grantee)),
                        file.update(file_address),
                    ],
                    delegation.value,
                )
                .event(RegistryEvent::DelegationRevoked {
                    owner: *owner,
                    file_id: *file_id,
                    grantee: *grantee,
                }))
            })
            .await?;
        tracing::info!(file_id = %file_id, grantee = %grantee.to_hex(), "delegation revoked");
        Ok(revoked)
    }

    /* Session delegations */

    pub async fn create_session(
        &self,
        owner: &PublicKey,
        relayer: &PublicKey,
        permissions: SessionPermissions,
        duration_secs: i64,
        max_operations: u32,
    ) -> Result<SessionDelegation, RegistryError> {
        if owner == relayer {
            return Err(RegistryError::SelfDelegation);
        }
        if duration_secs <= 0 || duration_secs > MAX_SESSION_SECS {
            return Err(RegistryError::InvalidSessionDuration(duration_secs));
        }
        self.transact("create_session", || async move {
            self.active_vault(owner).await?;
            let address = AccountAddress::session(owner, relayer);
            if self.fetch(&address).await?.is_some() {
                return Err(RegistryError::SessionExists);
            }
            let now = self.now();
            let session = SessionDelegation {
                owner: *owner,
                relayer: *relayer,
                nonce: 0,
                permissions,
                created_at: now,
                expires_at: now + duration_secs,
                max_operations,
                operations_used: 0,
            };
            Ok(Plan::new(vec![create(address, &session)], session).event(
                RegistryEvent::SessionCreated {
                    owner: *owner,
                    relayer: *relayer,
                },
            ))
        })
        .await
    }

    /// Push the expiry out by `extra_secs`, never beyond seven days from now.
    pub async fn extend_session(
        &self,
        owner: &PublicKey,
        relayer: &PublicKey,
        extra_secs: i64,
    ) -> Result<SessionDelegation, RegistryError> {
        self.transact("extend_session", || async move {
            let address = AccountAddress::session(owner, relayer);
            let mut session = self
                .load::<SessionDelegation>(&address)
                .await?
                .ok_or(RegistryError::SessionNotFound)?;
            let now = self.now();
            let expires_at = session.value.expires_at.max(now).saturating_add(extra_secs);
            if extra_secs <= 0 || expires_at - now > MAX_SESSION_SECS {
                return Err(RegistryError::InvalidSessionDuration(expires_at - now));
            }
            session.value.expires_at = expires_at;
            Ok(Plan::new(vec![session.update(address)], session.value))
        })
        .await
    }

    pub async fn revoke_session(
        &self,
        owner: &PublicKey,
        relayer: &PublicKey,
    ) -> Result<(), RegistryError> {
        self.transact("revoke_session", || async move {
            let address = AccountAddress::session(owner, relayer);
            let session = self
                .load::<SessionDelegation>(&address)
                .await?
                .ok_or(RegistryError::SessionNotFound)?;
            Ok(Plan::new(vec![session.delete(address)], ()).event(
                RegistryEvent::SessionRevoked {
                    owner: *owner,
                    relayer: *relayer,
                },
            ))
        })
        .await
    }

    /* Reconciliation */

    /// Recompute vault counters from shard contents, which are ground truth.
    /// Slots pointing at missing file records are cleared.
    pub async fn reconcile_vault(&self, owner: &PublicKey) -> Result<ReconcileReport, RegistryError> {
        let report = self
            .transact("reconcile_vault", || self.plan_reconcile(owner))
            .await?;
        if report.changed() {
            tracing::warn!(
                owner = %owner.to_hex(),
                file_count = report.file_count,
                previous_file_count = report.previous_file_count,
                total_storage = report.total_storage,
                previous_total_storage = report.previous_total_storage,
                "vault counters repaired"
            );
        }
        Ok(report)
    }

    async fn plan_reconcile(&self, owner: &PublicKey) -> Result<Plan<ReconcileReport>, RegistryError> {
        let vault_address = AccountAddress::vault(owner);
        let mut vault = self.vault_loaded(owner).await?;
        let shards = self
            .shards_loaded(&vault_address, vault.value.shard_count)
            .await?;
        let now = self.now();

        let mut writes = Vec::new();
        let mut file_count = 0u64;
        let mut total_storage = 0u64;
        let mut shards_repaired = 0;
        for mut shard in shards {
            let mut dirty = false;
            let ids: Vec<Uuid> = shard.value.file_ids().copied().collect();
            for file_id in ids {
                match self
                    .load::<FileRecord>(&AccountAddress::file(&vault_address, &file_id))
                    .await?
                {
                    Some(file) => {
                        file_count += 1;
                        total_storage = total_storage.saturating_add(file.value.encrypted_size);
                    }
                    None => {
                        shard.value.remove(&file_id, now);
                        dirty = true;
                    }
                }
            }
            let occupied = shard.value.occupied();
            if dirty || shard.value.count != occupied {
                shard.value.count = occupied;
                shard.value.updated_at = now;
                shards_repaired += 1;
                writes.push(shard.update(AccountAddress::shard(&vault_address, shard.value.index)));
            }
        }

        let report = ReconcileReport {
            previous_file_count: vault.value.file_count,
            previous_total_storage: vault.value.total_storage,
            file_count,
            total_storage,
            shards_repaired,
        };
        let mut plan = Plan::new(Vec::new(), report);
        if vault.value.file_count != file_count || vault.value.total_storage != total_storage {
            vault.value.file_count = file_count;
            vault.value.total_storage = total_storage;
            vault.value.updated_at = now;
            writes.push(vault.update(vault_address));
            plan = plan.event(RegistryEvent::VaultReconciled {
                owner: *owner,
                file_count,
                total_storage,
            });
        }
        plan.writes = writes;
        Ok(plan)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::crypto::SecretKey;
    use crate::registry::{ManualClock, MemoryLedger};

    const NOW: i64 = 1_700_000_000;

    fn registry_with(config: RegistryConfig) -> (Registry, MemoryLedger, ManualClock) {
        let ledger = MemoryLedger::new();
        let clock = ManualClock::new(NOW);
        let registry = Registry::with_clock(
            Arc::new(ledger.clone()),
            Arc::new(clock.clone()),
            config,
        );
        (registry, ledger, clock)
    }

    fn registry() -> (Registry, MemoryLedger, ManualClock) {
        registry_with(RegistryConfig::default())
    }

    fn key() -> PublicKey {
        SecretKey::generate().public()
    }

    fn new_file(size: u64) -> NewFile {
        NewFile {
            file_id: Uuid::new_v4(),
            filename_hash: Commitment::commit(b"name"),
            mime_type_hash: Commitment::commit(b"mime"),
            file_size: size,
            encrypted_size: size + 16,
            security_level: SecurityLevel::Standard,
            encryption_commitment: Commitment::commit(b"ct"),
            critical_bytes_commitment: Commitment::commit(b"crit"),
            remainder: ContentHash::of(b"rem"),
            remainder_chunked: false,
            envelope: ContentHash::of(b"env"),
            envelope_chunked: false,
            proof: Some(ContentHash::of(b"proof")),
            proof_anchor: Some(Commitment::commit(b"anchor")),
            provider_count: 2,
        }
    }

    fn new_delegation(grantee: PublicKey, permission: Permission) -> NewDelegation {
        NewDelegation {
            grantee,
            ephemeral_public_key: key(),
            payload: ContentHash::of(b"wrapped"),
            payload_chunked: false,
            payload_commitment: Commitment::commit(b"wrapped"),
            payload_size: 1100,
            permission,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_initialize_vault_once() {
        let (registry, ledger, _) = registry();
        let owner = key();
        let mut events = registry.subscribe();

        let vault = registry
            .initialize_vault(&owner, Commitment::commit(b"master"))
            .await
            .unwrap();
        assert_eq!(vault.shard_count, 1);
        assert_eq!(vault.file_count, 0);
        // Vault plus shard 0 in one transaction.
        assert_eq!(ledger.account_count(), 2);
        assert_eq!(ledger.submit_count(), 1);
        assert!(matches!(events.recv().await.unwrap(), RegistryEvent::VaultCreated { .. }));

        assert!(matches!(
            registry.initialize_vault(&owner, Commitment::default()).await,
            Err(RegistryError::VaultAlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_register_updates_counters_atomically() {
        let (registry, _, _) = registry();
        let owner = key();
        registry.initialize_vault(&owner, Commitment::default()).await.unwrap();

        let file = new_file(100);
        let record = registry.register_file(&owner, file.clone()).await.unwrap();
        assert_eq!((record.shard_index, record.slot), (0, 0));

        let vault = registry.vault(&owner).await.unwrap().unwrap();
        assert_eq!(vault.file_count, 1);
        assert_eq!(vault.total_storage, 116);
        assert_eq!(registry.file(&owner, &file.file_id).await.unwrap(), Some(record.clone()));

        // The same registration again is the committed record, not a second one.
        assert_eq!(registry.register_file(&owner, file.clone()).await.unwrap(), record);
        let mut other = file;
        other.remainder = ContentHash::of(b"other remainder");
        assert!(matches!(
            registry.register_file(&owner, other).await,
            Err(RegistryError::FileAlreadyExists(_))
        ));
        assert_eq!(registry.vault(&owner).await.unwrap().unwrap().file_count, 1);
    }

    #[tokio::test]
    async fn test_overflow_allocates_exactly_one_shard() {
        let (registry, _, _) = registry_with(RegistryConfig {
            shard_capacity: 3,
            ..Default::default()
        });
        let owner = key();
        registry.initialize_vault(&owner, Commitment::default()).await.unwrap();

        for _ in 0..4 {
            registry.register_file(&owner, new_file(10)).await.unwrap();
        }
        let shards = registry.shards(&owner).await.unwrap();
        assert_eq!(shards.len(), 2);
        assert_eq!(shards[0].count, 3);
        assert_eq!(shards[1].count, 1);

        let vault = registry.vault(&owner).await.unwrap().unwrap();
        assert_eq!(vault.shard_count, 2);
        let total: u64 = shards.iter().map(|s| s.count as u64).sum();
        assert_eq!(vault.file_count, total);
        assert_eq!(registry.list_files(&owner).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_shard_cap_is_enforced() {
        let (registry, _, _) = registry_with(RegistryConfig {
            shard_capacity: 1,
            max_shards: 2,
            ..Default::default()
        });
        let owner = key();
        registry.initialize_vault(&owner, Commitment::default()).await.unwrap();
        registry.register_file(&owner, new_file(1)).await.unwrap();
        registry.register_file(&owner, new_file(1)).await.unwrap();
        assert!(matches!(
            registry.register_file(&owner, new_file(1)).await,
            Err(RegistryError::ShardCapacityExceeded { shards: 2 })
        ));
        assert!(matches!(
            registry.allocate_shard(&owner).await,
            Err(RegistryError::ShardCapacityExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_explicit_allocation_and_first_fit() {
        let (registry, _, _) = registry_with(RegistryConfig {
            shard_capacity: 2,
            ..Default::default()
        });
        let owner = key();
        registry.initialize_vault(&owner, Commitment::default()).await.unwrap();
        assert_eq!(registry.allocate_shard(&owner).await.unwrap(), 1);

        let a = registry.register_file(&owner, new_file(1)).await.unwrap();
        let b = registry.register_file(&owner, new_file(1)).await.unwrap();
        let c = registry.register_file(&owner, new_file(1)).await.unwrap();
        assert_eq!((a.shard_index, b.shard_index, c.shard_index), (0, 0, 1));

        // A freed slot in shard 0 is reused before shard 1 fills up.
        registry.delete_file(&owner, &a.file_id).await.unwrap();
        let d = registry.register_file(&owner, new_file(1)).await.unwrap();
        assert_eq!((d.shard_index, d.slot), (0, 0));
    }

    #[tokio::test]
    async fn test_frozen_vault_rejects_writes() {
        let (registry, _, _) = registry();
        let owner = key();
        registry.initialize_vault(&owner, Commitment::default()).await.unwrap();
        registry.freeze_vault(&owner).await.unwrap();
        assert!(matches!(
            registry.register_file(&owner, new_file(1)).await,
            Err(RegistryError::VaultInactive(VaultStatus::Frozen))
        ));
        assert!(matches!(
            registry.freeze_vault(&owner).await,
            Err(RegistryError::InvalidTransition { .. })
        ));
        registry.unfreeze_vault(&owner).await.unwrap();
        registry.register_file(&owner, new_file(1)).await.unwrap();

        let deleted = registry.delete_vault(&owner).await.unwrap();
        assert_eq!(deleted.status, VaultStatus::Deleted);
        // Soft delete keeps the account.
        assert!(registry.vault(&owner).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delegation_lifecycle() {
        let (registry, _, clock) = registry();
        let owner = key();
        let grantee = key();
        registry.initialize_vault(&owner, Commitment::default()).await.unwrap();
        let file = registry.register_file(&owner, new_file(10)).await.unwrap();

        assert!(matches!(
            registry
                .create_delegation(&owner, &owner, &file.file_id, new_delegation(owner, Permission::View))
                .await,
            Err(RegistryError::SelfDelegation)
        ));
        let mut expired = new_delegation(grantee, Permission::Download);
        expired.expires_at = Some(NOW - 1);
        assert!(matches!(
            registry.create_delegation(&owner, &owner, &file.file_id, expired).await,
            Err(RegistryError::InvalidExpiry(_))
        ));

        let mut grant = new_delegation(grantee, Permission::Download);
        grant.expires_at = Some(NOW + 60);
        let delegation = registry
            .create_delegation(&owner, &owner, &file.file_id, grant.clone())
            .await
            .unwrap();
        assert_eq!(delegation.access_count, 0);
        // Resubmitting the committed grant returns it unchanged.
        assert_eq!(
            registry
                .create_delegation(&owner, &owner, &file.file_id, grant.clone())
                .await
                .unwrap(),
            delegation
        );
        let mut other = grant;
        other.ephemeral_public_key = key();
        assert!(matches!(
            registry.create_delegation(&owner, &owner, &file.file_id, other).await,
            Err(RegistryError::DelegationExists)
        ));

        let record = registry.file(&owner, &file.file_id).await.unwrap().unwrap();
        assert!(record.is_shared);
        assert_eq!(record.delegation_count, 1);
        assert!(matches!(
            registry.delete_file(&owner, &file.file_id).await,
            Err(RegistryError::HasDelegations { count: 1, .. })
        ));

        let accepted = registry
            .accept_delegation(&grantee, &owner, &file.file_id)
            .await
            .unwrap();
        assert!(accepted.accepted);
        let accessed = registry
            .record_delegation_access(&grantee, &owner, &file.file_id)
            .await
            .unwrap();
        assert_eq!(accessed.access_count, 1);
        assert_eq!(accessed.last_accessed, NOW);

        clock.advance(60);
        assert!(matches!(
            registry.record_delegation_access(&grantee, &owner, &file.file_id).await,
            Err(RegistryError::DelegationExpired)
        ));

        registry
            .revoke_delegation(&owner, &owner, &file.file_id, &grantee)
            .await
            .unwrap();
        assert!(registry
            .delegation(&owner, &file.file_id, &grantee)
            .await
            .unwrap()
            .is_none());
        let record = registry.file(&owner, &file.file_id).await.unwrap().unwrap();
        assert!(!record.is_shared);
        registry.delete_file(&owner, &file.file_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_view_permission_cannot_unwrap() {
        let (registry, _, _) = registry();
        let owner = key();
        let grantee = key();
        registry.initialize_vault(&owner, Commitment::default()).await.unwrap();
        let file = registry.register_file(&owner, new_file(10)).await.unwrap();
        registry
            .create_delegation(&owner, &owner, &file.file_id, new_delegation(grantee, Permission::View))
            .await
            .unwrap();
        assert!(matches!(
            registry.record_delegation_access(&grantee, &owner, &file.file_id).await,
            Err(RegistryError::InsufficientPermission(Permission::View))
        ));

        registry
            .update_delegation(&owner, &owner, &file.file_id, &grantee, Permission::Download, None)
            .await
            .unwrap();
        registry
            .record_delegation_access(&grantee, &owner, &file.file_id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reshare_requires_reshare_permission() {
        let (registry, _, _) = registry();
        let owner = key();
        let first = key();
        let second = key();
        let third = key();
        registry.initialize_vault(&owner, Commitment::default()).await.unwrap();
        let file = registry.register_file(&owner, new_file(10)).await.unwrap();

        assert!(matches!(
            registry
                .create_delegation(&first, &owner, &file.file_id, new_delegation(second, Permission::View))
                .await,
            Err(RegistryError::Unauthorized(_))
        ));

        registry
            .create_delegation(&owner, &owner, &file.file_id, new_delegation(first, Permission::Reshare))
            .await
            .unwrap();
        registry
            .create_delegation(&owner, &owner, &file.file_id, new_delegation(third, Permission::Download))
            .await
            .unwrap();

        let onward = registry
            .create_delegation(&first, &owner, &file.file_id, new_delegation(second, Permission::View))
            .await
            .unwrap();
        assert_eq!(onward.grantor, first);
        assert!(matches!(
            registry
                .create_delegation(&third, &owner, &file.file_id, new_delegation(key(), Permission::View))
                .await,
            Err(RegistryError::InsufficientPermission(Permission::Download))
        ));

        // The owner can revoke what a resharer granted.
        registry
            .revoke_delegation(&owner, &owner, &file.file_id, &second)
            .await
            .unwrap();
        assert!(matches!(
            registry.revoke_delegation(&third, &owner, &file.file_id, &first).await,
            Err(RegistryError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_session_registration() {
        let (registry, _, clock) = registry_with(RegistryConfig {
            shard_capacity: 1,
            ..Default::default()
        });
        let owner = key();
        let relayer = key();
        registry.initialize_vault(&owner, Commitment::default()).await.unwrap();

        assert!(matches!(
            registry
                .create_session(&owner, &owner, SessionPermissions::UPLOAD, 60, 0)
                .await,
            Err(RegistryError::SelfDelegation)
        ));
        assert!(matches!(
            registry
                .create_session(&owner, &relayer, SessionPermissions::UPLOAD, MAX_SESSION_SECS + 1, 0)
                .await,
            Err(RegistryError::InvalidSessionDuration(_))
        ));
        registry
            .create_session(&owner, &relayer, SessionPermissions::UPLOAD, 3600, 2)
            .await
            .unwrap();

        registry
            .register_file_via_session(&relayer, &owner, 0, new_file(5))
            .await
            .unwrap();
        assert!(matches!(
            registry
                .register_file_via_session(&relayer, &owner, 0, new_file(5))
                .await,
            Err(RegistryError::InvalidNonce { expected: 1, actual: 0 })
        ));
        // Shard 0 is full and the session may not allocate.
        assert!(matches!(
            registry
                .register_file_via_session(&relayer, &owner, 1, new_file(5))
                .await,
            Err(RegistryError::SessionPermissionDenied("create_shard"))
        ));

        let session = registry.session(&owner, &relayer).await.unwrap().unwrap();
        assert_eq!((session.nonce, session.operations_used), (1, 1));

        clock.advance(3600);
        assert!(matches!(
            registry
                .register_file_via_session(&relayer, &owner, 1, new_file(5))
                .await,
            Err(RegistryError::SessionExpired)
        ));
        registry.extend_session(&owner, &relayer, 60).await.unwrap();
        registry.revoke_session(&owner, &relayer).await.unwrap();
        assert!(registry.session(&owner, &relayer).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_operation_cap() {
        let (registry, _, _) = registry();
        let owner = key();
        let relayer = key();
        registry.initialize_vault(&owner, Commitment::default()).await.unwrap();
        registry
            .create_session(&owner, &relayer, SessionPermissions::ALL, 3600, 1)
            .await
            .unwrap();
        registry
            .register_file_via_session(&relayer, &owner, 0, new_file(5))
            .await
            .unwrap();
        assert!(matches!(
            registry
                .register_file_via_session(&relayer, &owner, 1, new_file(5))
                .await,
            Err(RegistryError::SessionExhausted)
        ));
    }

    #[tokio::test]
    async fn test_reconcile_treats_shards_as_truth() {
        let (registry, ledger, _) = registry();
        let owner = key();
        registry.initialize_vault(&owner, Commitment::default()).await.unwrap();
        registry.register_file(&owner, new_file(100)).await.unwrap();
        registry.register_file(&owner, new_file(200)).await.unwrap();

        let report = registry.reconcile_vault(&owner).await.unwrap();
        assert!(!report.changed());

        // Corrupt the counters behind the registry's back.
        let address = AccountAddress::vault(&owner);
        let account = ledger.fetch(&address).await.unwrap().unwrap();
        let mut vault = Vault::decode(&account.data).unwrap();
        vault.file_count = 7;
        vault.total_storage = 1;
        ledger
            .submit(vec![Write::Update {
                address,
                expected_version: account.version,
                data: vault.encode(),
            }])
            .await
            .unwrap();

        let report = registry.reconcile_vault(&owner).await.unwrap();
        assert!(report.changed());
        assert_eq!(report.previous_file_count, 7);
        assert_eq!(report.file_count, 2);
        assert_eq!(report.total_storage, 116 + 216);

        let vault = registry.vault(&owner).await.unwrap().unwrap();
        assert_eq!((vault.file_count, vault.total_storage), (2, 332));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let (registry, ledger, _) = registry();
        let owner = key();
        ledger.fail_next(2);
        registry.initialize_vault(&owner, Commitment::default()).await.unwrap();
        assert!(registry.vault(&owner).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_after_bounded_attempts() {
        let (registry, ledger, _) = registry();
        ledger.set_offline(true);
        assert!(matches!(
            registry.vault(&key()).await,
            Err(RegistryError::Unavailable { attempts: 4, .. })
        ));

        ledger.set_offline(false);
        ledger.set_latency(Some(Duration::from_secs(60)));
        assert!(matches!(
            registry.vault(&key()).await,
            Err(RegistryError::Unavailable { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_registration_is_serialized() {
        let (registry, ledger, _) = registry();
        let owner = key();
        registry.initialize_vault(&owner, Commitment::default()).await.unwrap();
        // Latency lets both planners read before either submits.
        ledger.set_latency(Some(Duration::from_millis(10)));

        let file = new_file(10);
        let mut rival = file.clone();
        rival.envelope = ContentHash::of(b"rival envelope");
        let (a, b) = tokio::join!(
            registry.register_file(&owner, file.clone()),
            registry.register_file(&owner, rival)
        );
        let outcomes = [a.is_ok(), b.is_ok()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
        assert!(matches!(
            a.err().or(b.err()),
            Some(RegistryError::FileAlreadyExists(_))
        ));

        let (c, d) = tokio::join!(
            registry.register_file(&owner, new_file(10)),
            registry.register_file(&owner, new_file(10))
        );
        c.unwrap();
        d.unwrap();
        assert_eq!(registry.vault(&owner).await.unwrap().unwrap().file_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_with_lost_reply_is_not_a_conflict() {
        let (registry, ledger, _) = registry();
        let owner = key();
        let grantee = key();
        registry.initialize_vault(&owner, Commitment::default()).await.unwrap();

        ledger.stall_after_commit(1, Duration::from_secs(60));
        let file = new_file(10);
        let record = registry.register_file(&owner, file.clone()).await.unwrap();
        assert_eq!(record.file_id, file.file_id);
        let vault = registry.vault(&owner).await.unwrap().unwrap();
        assert_eq!(vault.file_count, 1);
        assert_eq!(registry.shards(&owner).await.unwrap()[0].count, 1);

        ledger.stall_after_commit(1, Duration::from_secs(60));
        let delegation = registry
            .create_delegation(
                &owner,
                &owner,
                &file.file_id,
                new_delegation(grantee, Permission::Download),
            )
            .await
            .unwrap();
        assert_eq!(delegation.grantee, grantee);
        let record = registry.file(&owner, &file.file_id).await.unwrap().unwrap();
        assert_eq!(record.delegation_count, 1);
    }

    #[tokio::test]
    async fn test_proof_requires_anchor() {
        let (registry, _, _) = registry();
        let owner = key();
        registry.initialize_vault(&owner, Commitment::default()).await.unwrap();

        let mut file = new_file(10);
        file.proof_anchor = None;
        assert!(matches!(
            registry.register_file(&owner, file).await,
            Err(RegistryError::UnanchoredProof)
        ));
    }

    #[tokio::test]
    async fn test_archived_file_access_is_refused() {
        let (registry, _, _) = registry();
        let owner = key();
        let grantee = key();
        registry.initialize_vault(&owner, Commitment::default()).await.unwrap();
        let file = registry.register_file(&owner, new_file(10)).await.unwrap();
        registry
            .create_delegation(
                &owner,
                &owner,
                &file.file_id,
                new_delegation(grantee, Permission::Download),
            )
            .await
            .unwrap();
        registry.archive_file(&owner, &file.file_id).await.unwrap();

        assert!(matches!(
            registry.record_delegation_access(&grantee, &owner, &file.file_id).await,
            Err(RegistryError::FileInactive(_))
        ));
        let delegation = registry
            .delegation(&owner, &file.file_id, &grantee)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delegation.access_count, 0);
    }
}
