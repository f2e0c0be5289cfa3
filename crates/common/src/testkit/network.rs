use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use super::identity::TestIdentity;
use crate::config::{RegistryConfig, SessionConfig, StorageConfig};
use crate::crypto::SecretKey;
use crate::registry::{ManualClock, MemoryLedger, Registry};
use crate::storage::{MemoryProvider, StorageOrchestrator, StorageProvider};

/// Clock reading every test network starts at
pub const TEST_EPOCH: i64 = 1_700_000_000;

/// Configure a [`TestNetwork`] before building it
#[derive(Debug, Clone)]
pub struct TestNetworkBuilder {
    providers: usize,
    storage: StorageConfig,
    registry: RegistryConfig,
    session: SessionConfig,
    prompt_delay: Option<Duration>,
}

impl Default for TestNetworkBuilder {
    fn default() -> Self {
        Self {
            providers: 3,
            // Fast failure so fault-injection tests stay quick in real time
            storage: StorageConfig {
                call_timeout_ms: 2_000,
                retry_rounds: 2,
                retry_backoff_ms: 5,
                ..StorageConfig::default()
            },
            registry: RegistryConfig {
                base_backoff_ms: 5,
                max_backoff_ms: 20,
                ..RegistryConfig::default()
            },
            session: SessionConfig::default(),
            prompt_delay: None,
        }
    }
}

impl TestNetworkBuilder {
    pub fn providers(mut self, count: usize) -> Self {
        self.providers = count;
        self
    }

    pub fn storage(mut self, config: StorageConfig) -> Self {
        self.storage = config;
        self
    }

    pub fn registry(mut self, config: RegistryConfig) -> Self {
        self.registry = config;
        self
    }

    pub fn session(mut self, config: SessionConfig) -> Self {
        self.session = config;
        self
    }

    /// Make every wallet take `delay` to answer a signature prompt
    pub fn prompt_delay(mut self, delay: Duration) -> Self {
        self.prompt_delay = Some(delay);
        self
    }

    pub fn build(self) -> Result<TestNetwork> {
        let providers: Vec<MemoryProvider> = (0..self.providers)
            .map(|i| MemoryProvider::new(format!("mem-{i}")))
            .collect();
        let routed = providers
            .iter()
            .enumerate()
            .map(|(i, p)| (Arc::new(p.clone()) as Arc<dyn StorageProvider>, i as u8))
            .collect();
        let storage = StorageOrchestrator::new(self.storage, routed)?;

        let ledger = MemoryLedger::new();
        let clock = ManualClock::new(TEST_EPOCH);
        let registry = Registry::with_clock(
            Arc::new(ledger.clone()),
            Arc::new(clock.clone()),
            self.registry,
        );

        Ok(TestNetwork {
            providers,
            storage,
            ledger,
            clock,
            registry,
            session: self.session,
            prompt_delay: self.prompt_delay,
            identities: HashMap::new(),
        })
    }
}

/// A coordinator for the shared storage, ledger and identities of one test
pub struct TestNetwork {
    providers: Vec<MemoryProvider>,
    storage: StorageOrchestrator,
    ledger: MemoryLedger,
    clock: ManualClock,
    registry: Registry,
    session: SessionConfig,
    prompt_delay: Option<Duration>,
    /// All identities, indexed by name
    identities: HashMap<String, TestIdentity>,
}

impl TestNetwork {
    /// Three healthy providers and default registry limits
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> TestNetworkBuilder {
        TestNetworkBuilder::default()
    }

    /// Add a named identity with a fresh key and initialize its vault
    pub async fn add_identity(&mut self, name: impl Into<String>) -> Result<TestIdentity> {
        let identity = self.add_uninitialized(name)?;
        identity.client().initialize().await?;
        Ok(identity)
    }

    /// Add a named identity without creating its vault
    pub fn add_uninitialized(&mut self, name: impl Into<String>) -> Result<TestIdentity> {
        let name = name.into();
        if self.identities.contains_key(&name) {
            return Err(anyhow!("identity '{}' already exists", name));
        }
        let identity = TestIdentity::new(
            name.clone(),
            SecretKey::generate(),
            self.storage.clone(),
            self.registry.clone(),
            self.session.clone(),
            self.prompt_delay,
        )?;
        tracing::debug!(name = %name, key = %identity.public(), "added test identity");
        self.identities.insert(name, identity.clone());
        Ok(identity)
    }

    /// Get an identity by name
    pub fn identity(&self, name: &str) -> Option<&TestIdentity> {
        self.identities.get(name)
    }

    pub fn provider(&self, index: usize) -> &MemoryProvider {
        &self.providers[index]
    }

    pub fn providers(&self) -> &[MemoryProvider] {
        &self.providers
    }

    pub fn storage(&self) -> &StorageOrchestrator {
        &self.storage
    }

    pub fn ledger(&self) -> &MemoryLedger {
        &self.ledger
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
