/**
 * Client facade tying keys, cipher, proofs,
 *  storage and registry into upload, download,
 *  share and revoke.
 */
pub mod client;
/**
 * Tunables for the storage orchestrator, the
 *  registry and the session key cache.
 */
pub mod config;
/**
 * Cryptographic types and operations.
 *  - Identity keys and wallet-signature key derivation
 *  - Split-ciphertext encryption and commitments
 *  - Key-to-key delegation of critical bytes
 */
pub mod crypto;
/**
 * Protocol-level error taxonomy shared by
 *  every client operation.
 */
pub mod error;
/**
 * Zero-knowledge proof that a commitment hides
 *  critical bytes the prover actually holds.
 */
pub mod proof;
/**
 * Vault, shard, file and delegation records kept
 *  on an external ledger under deterministic
 *  addresses.
 */
pub mod registry;
/**
 * Time-bounded cache of wallet-derived keys.
 */
pub mod session;
/**
 * Redundant, health-aware placement of encrypted
 *  artifacts across storage providers.
 */
pub mod storage;
/**
 * In-process harness for multi-identity tests.
 */
pub mod testkit;

pub mod prelude {
    pub use crate::client::{UploadOptions, VaultClient};
    pub use crate::config::{RegistryConfig, SessionConfig, StorageConfig};
    pub use crate::crypto::{PublicKey, SecretKey, SecurityLevel};
    pub use crate::error::{FailureClass, VaultError};
    pub use crate::registry::{
        Delegation, FileRecord, MemoryLedger, Permission, Registry, Vault,
    };
    pub use crate::session::{LocalWallet, WalletSigner};
    pub use crate::storage::{MemoryProvider, ObjectStoreProvider, StorageOrchestrator, StorageProvider};
}
