use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::address::AccountAddress;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The ledger could not be reached
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    #[error("ledger call timed out")]
    Timeout,
    /// An account already existed or changed since it was read
    #[error("write conflict on account {0}")]
    Conflict(AccountAddress),
    #[error("account {0} not found")]
    NotFound(AccountAddress),
}

impl LedgerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_) | LedgerError::Timeout)
    }
}

/// Raw account as stored on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Bumped by every committed update, starting at 1
    pub version: u64,
    pub data: Vec<u8>,
}

/// One account mutation inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    /// Fails with `Conflict` if the account exists
    Create {
        address: AccountAddress,
        data: Vec<u8>,
    },
    /// Fails with `Conflict` unless the account is at `expected_version`
    Update {
        address: AccountAddress,
        expected_version: u64,
        data: Vec<u8>,
    },
    Delete {
        address: AccountAddress,
        expected_version: u64,
    },
}

impl Write {
    pub fn address(&self) -> &AccountAddress {
        match self {
            Write::Create { address, .. }
            | Write::Update { address, .. }
            | Write::Delete { address, .. } => address,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    /// Ledger-wide transaction sequence number
    pub sequence: u64,
    pub writes: usize,
}

/// The external account ledger.
///
/// Implementations must apply a submitted batch atomically: either every
/// write commits or none does.
#[async_trait]
pub trait Ledger: Send + Sync + Debug {
    async fn fetch(&self, address: &AccountAddress) -> Result<Option<Account>, LedgerError>;

    async fn submit(&self, writes: Vec<Write>) -> Result<TxReceipt, LedgerError>;
}
