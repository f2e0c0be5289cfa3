//! Client-side orchestration of the write, read and sharing paths.
//!
//! [`VaultClient`] is the only place where the primitives meet: keys come
//! from the [`SessionKeyCache`], bytes go through the [`SplitCipher`], proofs
//! through the [`ProofSystem`], artifacts through the [`StorageOrchestrator`]
//! and records through the [`Registry`].
//!
//! Objects are always stored before the record that points at them is
//! registered, and deleted only after the record is gone, so a committed
//! record never points at nothing. An interrupted upload can leave orphaned
//! objects behind, never a dangling record.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::try_join3;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::crypto::{
    Commitment, CriticalBytes, DelegationExchange, FileKey, Iv, KeyDerivation, LevelKey,
    PublicKey, SecretKey, SecurityLevel, SplitCipher, UnwrappedGrant, WrappedCriticalBytes,
};
use crate::error::VaultError;
use crate::proof::{ProofPackage, ProofSystem};
use crate::registry::{
    Delegation, FileRecord, NewDelegation, NewFile, Permission, ReconcileReport, Registry,
    RegistryError, Vault,
};
use crate::session::{SessionKeyCache, WalletSigner};
use crate::storage::{Locator, StorageOrchestrator};

const FILENAME_DOMAIN: &[u8] = b"vaultline-filename";
const MIME_DOMAIN: &[u8] = b"vaultline-mime";

/// Optional inputs to [`VaultClient::upload_with`].
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Overrides the type guessed from the filename
    pub mime_type: Option<String>,
    /// Overrides the orchestrator's default redundancy
    pub redundancy: Option<usize>,
    /// Skip proof generation; the file stays readable but cannot be shared
    pub skip_proof: bool,
}

/// One identity's view of the vault system.
///
/// The identity key owns a vault, signs the derivation message through the
/// wallet, and receives delegations.
#[derive(Debug, Clone)]
pub struct VaultClient {
    identity: Arc<SecretKey>,
    keys: Arc<SessionKeyCache>,
    storage: StorageOrchestrator,
    registry: Registry,
}

impl VaultClient {
    pub fn new(
        identity: SecretKey,
        wallet: Arc<dyn WalletSigner>,
        storage: StorageOrchestrator,
        registry: Registry,
        session: SessionConfig,
    ) -> Result<Self, VaultError> {
        if wallet.public_key() != identity.public() {
            return Err(VaultError::Unauthorized(
                "wallet signs for a different identity".to_string(),
            ));
        }
        let keys = SessionKeyCache::new(KeyDerivation::new(), wallet, session);
        Ok(Self {
            identity: Arc::new(identity),
            keys: Arc::new(keys),
            storage,
            registry,
        })
    }

    pub fn owner(&self) -> PublicKey {
        self.identity.public()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn storage(&self) -> &StorageOrchestrator {
        &self.storage
    }

    pub fn session(&self) -> &SessionKeyCache {
        &self.keys
    }

    /// Drop cached keys; the next operation prompts the wallet again.
    pub fn lock(&self) {
        self.keys.clear();
    }

    /// Create this identity's vault, anchored to the fingerprint of the
    /// derived keys. Idempotent for the same wallet.
    pub async fn initialize(&self) -> Result<Vault, VaultError> {
        let owner = self.owner();
        let fingerprint = self.keys.keys().await?.fingerprint();
        if let Some(vault) = self.registry.vault(&owner).await? {
            if vault.master_key_commitment != fingerprint {
                return Err(VaultError::CommitmentMismatch("master key"));
            }
            return Ok(vault);
        }
        Ok(self.registry.initialize_vault(&owner, fingerprint).await?)
    }

    pub async fn upload(
        &self,
        filename: &str,
        data: &[u8],
        level: SecurityLevel,
    ) -> Result<FileRecord, VaultError> {
        self.upload_with(filename, data, level, UploadOptions::default())
            .await
    }

    /// Encrypt, commit, prove, store, then register.
    pub async fn upload_with(
        &self,
        filename: &str,
        data: &[u8],
        level: SecurityLevel,
        options: UploadOptions,
    ) -> Result<FileRecord, VaultError> {
        if filename.is_empty() {
            return Err(VaultError::InvalidInput("filename is empty".to_string()));
        }
        let owner = self.owner();
        let key = self.keys.get(level).await?;
        let split = SplitCipher::encrypt(data, &key, level)?;

        let critical_commitment = Commitment::commit(split.critical.as_slice());
        let encryption_commitment =
            Commitment::commit_parts(&[split.critical.as_slice(), &split.remainder]);
        let encrypted_size = split.len() as u64;

        let proof = if options.skip_proof {
            None
        } else {
            let salt = ProofSystem::generate_salt()?;
            Some(ProofSystem::prove(split.critical.clone(), salt).await?)
        };
        let envelope = SplitCipher::seal_critical(&split, &key)?;

        let redundancy = options
            .redundancy
            .unwrap_or_else(|| self.storage.default_redundancy());
        let proof_anchor = proof.as_ref().map(ProofPackage::anchor);
        let proof_bytes = proof.map(|p| p.to_bytes()).transpose()?;
        let (remainder, envelope, proof) = try_join3(
            self.storage.put(Bytes::from(split.remainder), redundancy),
            self.storage.put(Bytes::from(envelope), redundancy),
            async {
                match proof_bytes {
                    Some(bytes) => self.storage.put(Bytes::from(bytes), redundancy).await.map(Some),
                    None => Ok(None),
                }
            },
        )
        .await?;

        let mime_type = options.mime_type.unwrap_or_else(|| {
            mime_guess::from_path(filename)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        });
        let provider_count = [Some(&remainder), Some(&envelope), proof.as_ref()]
            .into_iter()
            .flatten()
            .map(Locator::provider_count)
            .min()
            .unwrap_or(0);

        let file = NewFile {
            file_id: Uuid::new_v4(),
            filename_hash: self.name_hash(FILENAME_DOMAIN, filename),
            mime_type_hash: self.name_hash(MIME_DOMAIN, &mime_type),
            file_size: data.len() as u64,
            encrypted_size,
            security_level: level,
            encryption_commitment,
            critical_bytes_commitment: critical_commitment,
            remainder: remainder.content,
            remainder_chunked: remainder.chunked,
            envelope: envelope.content,
            envelope_chunked: envelope.chunked,
            proof: proof.as_ref().map(|p| p.content),
            proof_anchor,
            provider_count: u8::try_from(provider_count).unwrap_or(u8::MAX),
        };
        let file_id = file.file_id;

        match self.registry.register_file(&owner, file).await {
            Ok(record) => {
                tracing::info!(
                    file_id = %file_id,
                    level = ?level,
                    size = data.len(),
                    shard = record.shard_index,
                    "file uploaded"
                );
                Ok(record)
            }
            Err(err) => {
                // A record under this call's own id may point at these
                // objects, as may one an unreachable registry committed.
                let claimed = matches!(err, RegistryError::FileAlreadyExists(id) if id == file_id);
                let err = VaultError::from(err);
                if claimed || err.is_retryable() {
                    tracing::warn!(file_id = %file_id, error = %err, "registration outcome unknown, keeping stored objects");
                } else {
                    let locators = [Some(remainder), Some(envelope), proof];
                    self.discard(locators.iter().flatten()).await;
                }
                Err(err)
            }
        }
    }

    /// Fetch, verify and decrypt one of this identity's own files.
    pub async fn download(&self, file_id: &Uuid) -> Result<Vec<u8>, VaultError> {
        let owner = self.owner();
        let record = self.active_file(&owner, file_id).await?;
        let key = self.keys.get(record.security_level).await?;

        let (critical, iv) = self.open_envelope(&record, &key).await?;
        let plaintext = self.decrypt_with(&record, &critical, &iv, &key).await?;

        if let Err(err) = self.registry.record_access(&owner, file_id).await {
            tracing::warn!(file_id = %file_id, error = %err, "failed to record access");
        }
        Ok(plaintext)
    }

    /// Grant `grantee` access to one of this identity's files.
    pub async fn share(
        &self,
        file_id: &Uuid,
        grantee: &PublicKey,
        permission: Permission,
        expires_at: Option<i64>,
    ) -> Result<Delegation, VaultError> {
        let owner = self.owner();
        if grantee == &owner {
            return Err(VaultError::InvalidInput("cannot share with yourself".to_string()));
        }
        let record = self.active_file(&owner, file_id).await?;
        self.require_proof(&record).await?;

        let key = self.keys.get(record.security_level).await?;
        let (critical, iv) = self.open_envelope(&record, &key).await?;
        let grant = UnwrappedGrant {
            file_key: FileKey::derive(&key, &iv)?,
            critical,
            iv,
        };
        self.delegate(&owner, &record, &grant, grantee, permission, expires_at)
            .await
    }

    /// Pass on access to a file owned by `owner`, using this identity's own
    /// `Reshare` delegation.
    pub async fn reshare(
        &self,
        owner: &PublicKey,
        file_id: &Uuid,
        grantee: &PublicKey,
        permission: Permission,
        expires_at: Option<i64>,
    ) -> Result<Delegation, VaultError> {
        let me = self.owner();
        let mine = self
            .registry
            .delegation(owner, file_id, &me)
            .await?
            .ok_or(VaultError::DelegationRevoked)?;
        if mine.is_expired(self.registry.now()) {
            return Err(VaultError::DelegationExpired);
        }
        if !mine.permission.can_reshare() {
            return Err(VaultError::InsufficientPermission(mine.permission));
        }
        let record = self.active_file(owner, file_id).await?;
        self.require_proof(&record).await?;

        let wrapped = self.fetch_payload(&mine, None).await?;
        let grant = self.unwrap_grant(&record, &wrapped)?;
        self.delegate(&me, &record, &grant, grantee, permission, expires_at)
            .await
    }

    /// The wrapped critical bytes of a delegation to this identity.
    ///
    /// Holding a copy does not bypass revocation: [`open_shared`] checks the
    /// registry before using it.
    ///
    /// [`open_shared`]: VaultClient::open_shared
    pub async fn fetch_shared_payload(
        &self,
        owner: &PublicKey,
        file_id: &Uuid,
    ) -> Result<WrappedCriticalBytes, VaultError> {
        let delegation = self
            .registry
            .delegation(owner, file_id, &self.owner())
            .await?
            .ok_or(VaultError::DelegationRevoked)?;
        if !delegation.permission.can_unwrap() {
            return Err(VaultError::InsufficientPermission(delegation.permission));
        }
        self.fetch_payload(&delegation, None).await
    }

    pub async fn accept_share(
        &self,
        owner: &PublicKey,
        file_id: &Uuid,
    ) -> Result<Delegation, VaultError> {
        Ok(self
            .registry
            .accept_delegation(&self.owner(), owner, file_id)
            .await?)
    }

    /// Read a file shared with this identity.
    ///
    /// The file must be active, and the delegation is checked and its access
    /// recorded on the registry before anything is unwrapped, so a revoked
    /// or expired grant fails even when `cached` already holds the payload.
    pub async fn open_shared(
        &self,
        owner: &PublicKey,
        file_id: &Uuid,
        cached: Option<&WrappedCriticalBytes>,
    ) -> Result<Vec<u8>, VaultError> {
        let me = self.owner();
        let record = self.active_file(owner, file_id).await?;
        let delegation = self
            .registry
            .record_delegation_access(&me, owner, file_id)
            .await?;

        let wrapped = self.fetch_payload(&delegation, cached).await?;
        let grant = self.unwrap_grant(&record, &wrapped)?;

        let package = self.require_proof(&record).await?;
        if !package.binds(grant.critical.as_slice()) {
            return Err(VaultError::ProofInvalid);
        }

        let remainder = self.fetch_remainder(&record, &grant.critical).await?;
        Ok(SplitCipher::decrypt_with_file_key(
            grant.critical.as_slice(),
            &remainder,
            &grant.iv,
            &grant.file_key,
            record.security_level,
        )?)
    }

    /// Revoke `grantee`'s access and erase the wrapped payload.
    pub async fn revoke(
        &self,
        file_id: &Uuid,
        grantee: &PublicKey,
    ) -> Result<Delegation, VaultError> {
        let owner = self.owner();
        let revoked = self
            .registry
            .revoke_delegation(&owner, &owner, file_id, grantee)
            .await?;
        self.discard([revoked.payload_locator()].iter()).await;
        Ok(revoked)
    }

    pub async fn archive(&self, file_id: &Uuid) -> Result<FileRecord, VaultError> {
        Ok(self.registry.archive_file(&self.owner(), file_id).await?)
    }

    /// Unregister a file, then delete its objects. Refused while
    /// delegations are outstanding.
    pub async fn delete(&self, file_id: &Uuid) -> Result<FileRecord, VaultError> {
        let record = self.registry.delete_file(&self.owner(), file_id).await?;
        let locators = [
            Some(record.remainder_locator()),
            Some(record.envelope_locator()),
            record.proof_locator(),
        ];
        self.discard(locators.iter().flatten()).await;
        Ok(record)
    }

    pub async fn file(&self, file_id: &Uuid) -> Result<Option<FileRecord>, VaultError> {
        Ok(self.registry.file(&self.owner(), file_id).await?)
    }

    pub async fn list_files(&self) -> Result<Vec<FileRecord>, VaultError> {
        Ok(self.registry.list_files(&self.owner()).await?)
    }

    pub async fn reconcile(&self) -> Result<ReconcileReport, VaultError> {
        Ok(self.registry.reconcile_vault(&self.owner()).await?)
    }

    fn name_hash(&self, domain: &[u8], name: &str) -> Commitment {
        Commitment::commit_parts(&[domain, self.owner().as_bytes(), name.as_bytes()])
    }

    async fn active_file(
        &self,
        owner: &PublicKey,
        file_id: &Uuid,
    ) -> Result<FileRecord, VaultError> {
        let record = self
            .registry
            .file(owner, file_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("file {file_id}")))?;
        if !record.is_active() {
            return Err(VaultError::Conflict(format!(
                "file {file_id} is {:?}",
                record.status
            )));
        }
        Ok(record)
    }

    async fn open_envelope(
        &self,
        record: &FileRecord,
        key: &LevelKey,
    ) -> Result<(CriticalBytes, Iv), VaultError> {
        let envelope = self.storage.get(&record.envelope_locator()).await?;
        let (critical, iv) = SplitCipher::open_critical(&envelope, key, record.security_level)?;
        if !record.critical_bytes_commitment.verify(critical.as_slice()) {
            return Err(VaultError::CommitmentMismatch("critical bytes"));
        }
        Ok((critical, iv))
    }

    fn unwrap_grant(
        &self,
        record: &FileRecord,
        wrapped: &WrappedCriticalBytes,
    ) -> Result<UnwrappedGrant, VaultError> {
        let grant = DelegationExchange::unwrap(wrapped, &self.identity, record.security_level)?;
        if !record.critical_bytes_commitment.verify(grant.critical.as_slice()) {
            return Err(VaultError::CommitmentMismatch("critical bytes"));
        }
        Ok(grant)
    }

    /// Fetch the remainder and check the joined ciphertext against the
    /// anchored commitment before any decryption is attempted.
    async fn fetch_remainder(
        &self,
        record: &FileRecord,
        critical: &CriticalBytes,
    ) -> Result<Bytes, VaultError> {
        let remainder = self.storage.get(&record.remainder_locator()).await?;
        if !record
            .encryption_commitment
            .verify_parts(&[critical.as_slice(), &remainder])
        {
            return Err(VaultError::CommitmentMismatch("ciphertext"));
        }
        Ok(remainder)
    }

    async fn decrypt_with(
        &self,
        record: &FileRecord,
        critical: &CriticalBytes,
        iv: &Iv,
        key: &LevelKey,
    ) -> Result<Vec<u8>, VaultError> {
        let remainder = self.fetch_remainder(record, critical).await?;
        Ok(SplitCipher::decrypt(
            critical.as_slice(),
            &remainder,
            iv,
            key,
            record.security_level,
        )?)
    }

    /// Load and verify the proof package; sharing is impossible without one.
    async fn require_proof(&self, record: &FileRecord) -> Result<ProofPackage, VaultError> {
        let locator = record.proof_locator().ok_or(VaultError::ProofMissing)?;
        let bytes = match self.storage.get(&locator).await {
            Ok(bytes) => bytes,
            Err(crate::storage::StorageError::NotFound(_)) => {
                return Err(VaultError::ProofMissing)
            }
            Err(err) => return Err(err.into()),
        };
        let package = ProofPackage::from_bytes(&bytes)?;
        let anchor = record.proof_anchor.ok_or(VaultError::ProofMissing)?;
        if !ProofSystem::verify(&package, &record.critical_bytes_commitment, &anchor) {
            return Err(VaultError::ProofInvalid);
        }
        Ok(package)
    }

    async fn fetch_payload(
        &self,
        delegation: &Delegation,
        cached: Option<&WrappedCriticalBytes>,
    ) -> Result<WrappedCriticalBytes, VaultError> {
        let wrapped = match cached {
            Some(wrapped) => wrapped.clone(),
            None => {
                let bytes = self.storage.get(&delegation.payload_locator()).await?;
                WrappedCriticalBytes::from_bytes(&bytes)?
            }
        };
        if wrapped.ephemeral_public_key != delegation.ephemeral_public_key
            || wrapped.commitment()? != delegation.payload_commitment
        {
            return Err(VaultError::CommitmentMismatch("delegation payload"));
        }
        Ok(wrapped)
    }

    async fn delegate(
        &self,
        grantor: &PublicKey,
        record: &FileRecord,
        grant: &UnwrappedGrant,
        grantee: &PublicKey,
        permission: Permission,
        expires_at: Option<i64>,
    ) -> Result<Delegation, VaultError> {
        let wrapped = DelegationExchange::wrap_for_recipient(
            &grant.critical,
            &grant.iv,
            &grant.file_key,
            grantee,
        )?;
        let payload = wrapped.to_bytes()?;
        let payload_commitment = Commitment::commit(&payload);
        let payload_size = payload.len() as u64;
        let locator = self
            .storage
            .put(Bytes::from(payload), self.storage.default_redundancy())
            .await?;

        let delegation = NewDelegation {
            grantee: *grantee,
            ephemeral_public_key: wrapped.ephemeral_public_key,
            payload: locator.content,
            payload_chunked: locator.chunked,
            payload_commitment,
            payload_size,
            permission,
            expires_at,
        };
        match self
            .registry
            .create_delegation(grantor, &record.owner, &record.file_id, delegation)
            .await
        {
            Ok(created) => Ok(created),
            Err(err) => {
                let err = VaultError::from(err);
                if !err.is_retryable() {
                    self.discard([locator].iter()).await;
                }
                Err(err)
            }
        }
    }

    /// Best-effort deletion; leftovers are orphans, never dangling records.
    async fn discard<'a>(&self, locators: impl Iterator<Item = &'a Locator>) {
        for locator in locators {
            if let Err(err) = self.storage.delete(locator).await {
                tracing::warn!(content = %locator.content.short(), error = %err, "failed to delete object");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    use crate::registry::{AccountAddress, AccountData, MemoryLedger};
    use crate::session::LocalWallet;
    use crate::testkit::TestNetwork;

    #[tokio::test]
    async fn test_wallet_must_match_identity() {
        let net = TestNetwork::new().unwrap();
        let wallet = Arc::new(LocalWallet::new(SecretKey::generate()));
        let err = VaultClient::new(
            SecretKey::generate(),
            wallet,
            net.storage().clone(),
            net.registry().clone(),
            SessionConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, VaultError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_initialize_rejects_foreign_master_key() {
        let mut net = TestNetwork::new().unwrap();
        let alice = net.add_identity("alice").await.unwrap();

        // Re-anchor the vault to some other key set.
        let ledger: &MemoryLedger = net.ledger();
        let address = AccountAddress::vault(&alice.public());
        let mut snapshot = ledger.snapshot();
        for (a, account) in snapshot.accounts.iter_mut() {
            if *a == address {
                let mut vault = Vault::decode(&account.data).unwrap();
                vault.master_key_commitment = Commitment::commit(b"other wallet");
                account.data = vault.encode();
            }
        }
        ledger.restore(snapshot);

        assert!(matches!(
            alice.client().initialize().await,
            Err(VaultError::CommitmentMismatch("master key"))
        ));
    }

    #[tokio::test]
    async fn test_metadata_hashes_hide_names() {
        let mut net = TestNetwork::new().unwrap();
        let alice = net.add_identity("alice").await.unwrap();
        let bob = net.add_identity("bob").await.unwrap();
        let options = || UploadOptions {
            skip_proof: true,
            ..Default::default()
        };

        let a = alice
            .client()
            .upload_with("report.pdf", b"x", SecurityLevel::Standard, options())
            .await
            .unwrap();
        let b = bob
            .client()
            .upload_with("report.pdf", b"x", SecurityLevel::Standard, options())
            .await
            .unwrap();
        assert_ne!(a.filename_hash, Commitment::commit(b"report.pdf"));
        assert_ne!(a.filename_hash, b.filename_hash);
        assert_eq!(
            a.mime_type_hash,
            Commitment::commit_parts(&[MIME_DOMAIN, alice.public().as_bytes(), b"application/pdf"])
        );
    }

    #[tokio::test]
    async fn test_rejected_registration_discards_objects() {
        let mut net = TestNetwork::new().unwrap();
        let alice = net.add_uninitialized("alice").unwrap();
        let before: usize = net.providers().iter().map(|p| p.object_count()).sum();

        let err = alice
            .client()
            .upload("a.txt", b"orphan", SecurityLevel::Standard)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
        let after: usize = net.providers().iter().map(|p| p.object_count()).sum();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_share_with_self_is_rejected() {
        let mut net = TestNetwork::new().unwrap();
        let alice = net.add_identity("alice").await.unwrap();
        let record = alice
            .client()
            .upload("a.txt", b"mine", SecurityLevel::Standard)
            .await
            .unwrap();
        assert!(matches!(
            alice
                .client()
                .share(&record.file_id, &alice.public(), Permission::Download, None)
                .await,
            Err(VaultError::InvalidInput(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_registration_reply_keeps_record_and_objects() {
        let mut net = TestNetwork::new().unwrap();
        let alice = net.add_identity("alice").await.unwrap();
        net.ledger().stall_after_commit(1, Duration::from_secs(60));

        let record = alice
            .client()
            .upload_with(
                "a.txt",
                b"committed once",
                SecurityLevel::Standard,
                UploadOptions {
                    skip_proof: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let files = alice.client().list_files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_id, record.file_id);
        let vault = net.registry().vault(&alice.public()).await.unwrap().unwrap();
        assert_eq!(vault.file_count, 1);
        assert_eq!(
            alice.client().download(&record.file_id).await.unwrap(),
            b"committed once"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_delegation_reply_keeps_payload() {
        let mut net = TestNetwork::new().unwrap();
        let alice = net.add_identity("alice").await.unwrap();
        let bob = net.add_identity("bob").await.unwrap();
        let record = alice
            .client()
            .upload("a.txt", b"shared once", SecurityLevel::Sensitive)
            .await
            .unwrap();

        net.ledger().stall_after_commit(1, Duration::from_secs(60));
        alice
            .client()
            .share(&record.file_id, &bob.public(), Permission::Download, None)
            .await
            .unwrap();

        let file = alice.client().file(&record.file_id).await.unwrap().unwrap();
        assert_eq!(file.delegation_count, 1);
        assert_eq!(
            bob.client()
                .open_shared(&alice.public(), &record.file_id, None)
                .await
                .unwrap(),
            b"shared once"
        );
    }

    #[tokio::test]
    async fn test_archived_file_read_is_not_counted() {
        let mut net = TestNetwork::new().unwrap();
        let alice = net.add_identity("alice").await.unwrap();
        let bob = net.add_identity("bob").await.unwrap();
        let record = alice
            .client()
            .upload("a.txt", b"old news", SecurityLevel::Standard)
            .await
            .unwrap();
        alice
            .client()
            .share(&record.file_id, &bob.public(), Permission::Download, None)
            .await
            .unwrap();
        alice.client().archive(&record.file_id).await.unwrap();

        assert!(matches!(
            bob.client()
                .open_shared(&alice.public(), &record.file_id, None)
                .await,
            Err(VaultError::Conflict(_))
        ));
        let delegation = net
            .registry()
            .delegation(&alice.public(), &record.file_id, &bob.public())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delegation.access_count, 0);
    }
}
