use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::crypto::{DerivationError, PublicKey, SecretKey, Signature};

/// Whatever holds the user's signing key: a browser wallet, a hardware
/// device, or a local key file.
#[async_trait]
pub trait WalletSigner: Send + Sync + Debug {
    fn public_key(&self) -> PublicKey;

    fn is_connected(&self) -> bool;

    async fn sign_message(&self, message: &[u8]) -> Result<Signature, DerivationError>;
}

/// Wallet backed by a key held in process.
#[derive(Debug)]
pub struct LocalWallet {
    key: SecretKey,
    connected: AtomicBool,
}

impl LocalWallet {
    pub fn new(key: SecretKey) -> Self {
        Self {
            key,
            connected: AtomicBool::new(true),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl WalletSigner for LocalWallet {
    fn public_key(&self) -> PublicKey {
        self.key.public()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Signature, DerivationError> {
        if !self.is_connected() {
            return Err(DerivationError::WalletDisconnected);
        }
        Ok(self.key.sign(message))
    }
}

/// Counts signature prompts, optionally taking time to answer each one.
#[derive(Debug)]
pub struct CountingWallet {
    inner: Arc<dyn WalletSigner>,
    delay: Option<Duration>,
    prompts: AtomicUsize,
}

impl CountingWallet {
    pub fn new(inner: Arc<dyn WalletSigner>) -> Self {
        Self {
            inner,
            delay: None,
            prompts: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletSigner for CountingWallet {
    fn public_key(&self) -> PublicKey {
        self.inner.public_key()
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Signature, DerivationError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.sign_message(message).await
    }
}
