use std::sync::Arc;
use std::time::Duration;

use crate::client::VaultClient;
use crate::config::SessionConfig;
use crate::crypto::{PublicKey, SecretKey};
use crate::error::VaultError;
use crate::registry::Registry;
use crate::session::{CountingWallet, LocalWallet};
use crate::storage::StorageOrchestrator;

/// A named identity with its wallet and client
#[derive(Debug, Clone)]
pub struct TestIdentity {
    /// The name of this identity (for debugging)
    pub name: String,
    secret: SecretKey,
    /// The key holder; toggle it to simulate a disconnected wallet
    local: Arc<LocalWallet>,
    /// Wraps `local` and counts signature prompts
    wallet: Arc<CountingWallet>,
    client: VaultClient,
}

impl TestIdentity {
    pub(crate) fn new(
        name: impl Into<String>,
        secret: SecretKey,
        storage: StorageOrchestrator,
        registry: Registry,
        session: SessionConfig,
        prompt_delay: Option<Duration>,
    ) -> Result<Self, VaultError> {
        let local = Arc::new(LocalWallet::new(secret.clone()));
        let mut wallet = CountingWallet::new(local.clone());
        if let Some(delay) = prompt_delay {
            wallet = wallet.with_delay(delay);
        }
        let wallet = Arc::new(wallet);
        let client = VaultClient::new(secret.clone(), wallet.clone(), storage, registry, session)?;
        Ok(Self {
            name: name.into(),
            secret,
            local,
            wallet,
            client,
        })
    }

    pub fn public(&self) -> PublicKey {
        self.secret.public()
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    pub fn client(&self) -> &VaultClient {
        &self.client
    }

    /// Signature prompts answered or attempted so far
    pub fn prompts(&self) -> usize {
        self.wallet.prompts()
    }

    pub fn set_wallet_connected(&self, connected: bool) {
        self.local.set_connected(connected);
    }
}
