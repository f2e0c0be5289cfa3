//! Sharded account registry over an external ledger
//!
//! The registry is the source of truth for commitments, storage locators and
//! live/revoked state. It holds four kinds of fixed-size accounts, each at an
//! address derived from its owner key and indices:
//!
//! - [`Vault`]: one per owner, with file and byte counters
//! - [`Shard`]: bounded list of file ids; a vault owns shards `0..shard_count`
//! - [`FileRecord`]: commitments and content addresses for one file
//! - [`Delegation`]: one grantee's wrapped critical bytes for one file
//!
//! plus [`SessionDelegation`] capabilities for relayers. Every mutation is a
//! single all-or-nothing ledger batch, so a vault's counters never drift from
//! its shards except through outside interference, which
//! [`Registry::reconcile_vault`] repairs.

mod accounts;
mod address;
mod clock;
mod events;
mod layout;
mod ledger;
mod memory;
mod service;
mod shard;

pub use accounts::{
    Delegation, FileRecord, FileStatus, Permission, SessionDelegation, SessionPermissions, Shard,
    Vault, VaultStatus, DELEGATION_SIZE, FILE_RECORD_SIZE, MAX_SESSION_SECS, SESSION_SIZE,
    SHARD_HEADER_SIZE, SHARD_SLOT_SIZE, VAULT_SIZE,
};
pub use address::AccountAddress;
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::RegistryEvent;
pub use layout::{AccountData, LayoutError};
pub use ledger::{Account, Ledger, LedgerError, TxReceipt, Write};
pub use memory::{LedgerSnapshot, MemoryLedger};
pub use service::{NewDelegation, NewFile, ReconcileReport, Registry, RegistryError};
pub use shard::first_fit;
