use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::address::AccountAddress;
use super::ledger::{Account, Ledger, LedgerError, TxReceipt, Write};

/// Serializable copy of a [`MemoryLedger`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub sequence: u64,
    pub accounts: Vec<(AccountAddress, Account)>,
}

impl LedgerSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// In-process ledger with atomic batches and fault injection.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    inner: Arc<MemoryLedgerInner>,
}

#[derive(Debug, Default)]
struct MemoryLedgerInner {
    accounts: RwLock<HashMap<AccountAddress, Account>>,
    sequence: AtomicU64,
    offline: AtomicBool,
    fail_next: AtomicUsize,
    latency: Mutex<Option<Duration>>,
    stall_next: AtomicUsize,
    stall: Mutex<Duration>,
    submits: AtomicUsize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        let ledger = Self::new();
        ledger.restore(snapshot);
        ledger
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut accounts: Vec<_> = self
            .inner
            .accounts
            .read()
            .iter()
            .map(|(address, account)| (*address, account.clone()))
            .collect();
        accounts.sort_by(|a, b| a.0.cmp(&b.0));
        LedgerSnapshot {
            sequence: self.inner.sequence.load(Ordering::SeqCst),
            accounts,
        }
    }

    pub fn restore(&self, snapshot: LedgerSnapshot) {
        *self.inner.accounts.write() = snapshot.accounts.into_iter().collect();
        self.inner.sequence.store(snapshot.sequence, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Fail this many upcoming calls as unavailable.
    pub fn fail_next(&self, calls: usize) {
        self.inner.fail_next.store(calls, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.inner.latency.lock() = latency;
    }

    /// Commit the next `calls` batches, then hold each reply for `stall`.
    pub fn stall_after_commit(&self, calls: usize, stall: Duration) {
        *self.inner.stall.lock() = stall;
        self.inner.stall_next.store(calls, Ordering::SeqCst);
    }

    pub fn account_count(&self) -> usize {
        self.inner.accounts.read().len()
    }

    /// Committed transactions so far.
    pub fn submit_count(&self) -> usize {
        self.inner.submits.load(Ordering::SeqCst)
    }

    async fn inject(&self) -> Result<(), LedgerError> {
        let latency = *self.inner.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("ledger offline".to_string()));
        }
        let failed = self
            .inner
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(LedgerError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn fetch(&self, address: &AccountAddress) -> Result<Option<Account>, LedgerError> {
        self.inject().await?;
        Ok(self.inner.accounts.read().get(address).cloned())
    }

    async fn submit(&self, writes: Vec<Write>) -> Result<TxReceipt, LedgerError> {
        self.inject().await?;
        let receipt = self.apply(&writes)?;
        let stalled = self
            .inner
            .stall_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stalled {
            let stall = *self.inner.stall.lock();
            tokio::time::sleep(stall).await;
        }
        Ok(receipt)
    }
}

impl MemoryLedger {
    fn apply(&self, writes: &[Write]) -> Result<TxReceipt, LedgerError> {
        let mut accounts = self.inner.accounts.write();

        // Validate the whole batch against a staged view before touching state.
        let mut staged: HashMap<AccountAddress, Option<Account>> = HashMap::new();
        for write in writes {
            let address = *write.address();
            let current = match staged.get(&address) {
                Some(staged) => staged.clone(),
                None => accounts.get(&address).cloned(),
            };
            let next = match (write, current) {
                (Write::Create { data, .. }, None) => Some(Account {
                    version: 1,
                    data: data.clone(),
                }),
                (Write::Create { .. }, Some(_)) => return Err(LedgerError::Conflict(address)),
                (Write::Update { expected_version, data, .. }, Some(account))
                    if account.version == *expected_version =>
                {
                    Some(Account {
                        version: account.version + 1,
                        data: data.clone(),
                    })
                }
                (Write::Delete { expected_version, .. }, Some(account))
                    if account.version == *expected_version =>
                {
                    None
                }
                (Write::Update { .. } | Write::Delete { .. }, Some(_)) => {
                    return Err(LedgerError::Conflict(address))
                }
                (Write::Update { .. } | Write::Delete { .. }, None) => {
                    return Err(LedgerError::NotFound(address))
                }
            };
            staged.insert(address, next);
        }

        for (address, account) in staged {
            match account {
                Some(account) => {
                    accounts.insert(address, account);
                }
                None => {
                    accounts.remove(&address);
                }
            }
        }
        let sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.submits.fetch_add(1, Ordering::SeqCst);
        Ok(TxReceipt {
            sequence,
            writes: writes.len(),
        })
    }
}
