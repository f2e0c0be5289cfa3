use std::{fs, path::PathBuf, sync::Arc};

use common::prelude::*;
use common::registry::LedgerSnapshot;
use common::storage::{ProviderError, StorageError};
use object_store::ObjectStoreConfig;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

pub const APP_NAME: &str = "vaultline";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const KEY_FILE_NAME: &str = "key.pem";
pub const LEDGER_FILE_NAME: &str = "ledger.bin";
pub const OBJECTS_DIR_NAME: &str = "objects";

/// One storage backend the orchestrator replicates across.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    /// 0 is the primary
    #[serde(default)]
    pub priority: u8,
    pub backend: ObjectStoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default tracing level, overridable with `RUST_LOG`
    pub log_level: String,
    /// Directory for daily rolling log files (disabled when unset)
    pub log_dir: Option<PathBuf>,
    pub storage: StorageConfig,
    pub registry: RegistryConfig,
    pub session: SessionConfig,
    pub providers: Vec<ProviderConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            log_dir: None,
            storage: StorageConfig::default(),
            registry: RegistryConfig::default(),
            session: SessionConfig::default(),
            providers: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn log_level(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::WARN)
    }

    /// `count` local directory providers under `dir`, replicated twice when
    /// there is more than one.
    pub fn with_local_providers(dir: &std::path::Path, count: usize) -> Self {
        let count = count.max(1);
        let providers = (0..count)
            .map(|i| ProviderConfig {
                name: format!("local-{}", i),
                priority: u8::try_from(i).unwrap_or(u8::MAX),
                backend: ObjectStoreConfig::Local {
                    path: dir.join(OBJECTS_DIR_NAME).join(i.to_string()),
                },
            })
            .collect();
        let mut config = Self {
            providers,
            ..Self::default()
        };
        config.storage.redundancy = config.storage.redundancy.min(count);
        config
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the vaultline directory (~/.vaultline)
    pub dir: PathBuf,
    /// Path to the identity key PEM file
    pub key_path: PathBuf,
    /// Path to the persisted ledger snapshot
    pub ledger_path: PathBuf,
    pub config_path: PathBuf,
    pub config: AppConfig,
}

impl AppState {
    /// Get the state directory path (custom or default ~/.vaultline)
    pub fn dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Create a new state directory with a fresh identity key.
    ///
    /// When `config` is `None`, a single local directory provider is used.
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let dir = Self::dir(custom_path)?;
        if dir.join(CONFIG_FILE_NAME).exists() {
            return Err(StateError::AlreadyInitialized);
        }
        fs::create_dir_all(&dir)?;

        let config = config.unwrap_or_else(|| AppConfig::with_local_providers(&dir, 1));
        if config.providers.is_empty() {
            return Err(StateError::NoProviders);
        }
        for provider in &config.providers {
            if let ObjectStoreConfig::Local { path } = &provider.backend {
                fs::create_dir_all(path)?;
            }
        }

        let key = SecretKey::try_generate().map_err(|e| StateError::InvalidKey(e.to_string()))?;
        let key_path = dir.join(KEY_FILE_NAME);
        fs::write(&key_path, key.to_pem())?;

        let config_path = dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, toml::to_string_pretty(&config)?)?;

        let ledger_path = dir.join(LEDGER_FILE_NAME);
        fs::write(&ledger_path, LedgerSnapshot::default().to_bytes()?)?;

        Ok(Self {
            dir,
            key_path,
            ledger_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the state directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let dir = Self::dir(custom_path)?;
        if !dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let key_path = dir.join(KEY_FILE_NAME);
        let ledger_path = dir.join(LEDGER_FILE_NAME);
        let config_path = dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Err(StateError::NotInitialized);
        }
        if !key_path.exists() {
            return Err(StateError::MissingFile(KEY_FILE_NAME.to_string()));
        }

        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;

        Ok(Self {
            dir,
            key_path,
            ledger_path,
            config_path,
            config,
        })
    }

    pub fn load_key(&self) -> Result<SecretKey, StateError> {
        let pem = fs::read_to_string(&self.key_path)?;
        SecretKey::from_pem(&pem).map_err(|e| StateError::InvalidKey(e.to_string()))
    }

    /// Rebuild the ledger from its snapshot. A missing snapshot is an
    /// empty ledger.
    pub fn load_ledger(&self) -> Result<MemoryLedger, StateError> {
        if !self.ledger_path.exists() {
            return Ok(MemoryLedger::new());
        }
        let bytes = fs::read(&self.ledger_path)?;
        Ok(MemoryLedger::from_snapshot(LedgerSnapshot::from_bytes(&bytes)?))
    }

    /// Write the ledger snapshot through a temp file so a crash never
    /// leaves it half written.
    pub fn save_ledger(&self, ledger: &MemoryLedger) -> Result<(), StateError> {
        let bytes = ledger.snapshot().to_bytes()?;
        let tmp = self.ledger_path.with_extension("bin.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.ledger_path)?;
        Ok(())
    }

    async fn storage(&self) -> Result<StorageOrchestrator, StateError> {
        let mut providers: Vec<(Arc<dyn StorageProvider>, u8)> = Vec::new();
        for provider in &self.config.providers {
            let opened =
                ObjectStoreProvider::open(provider.name.clone(), provider.backend.clone()).await?;
            providers.push((Arc::new(opened) as Arc<dyn StorageProvider>, provider.priority));
        }
        Ok(StorageOrchestrator::new(
            self.config.storage.clone(),
            providers,
        )?)
    }
}

/// A loaded state directory wired into a [`VaultClient`].
///
/// The key file doubles as the wallet. Ledger writes only reach disk
/// through [`Runtime::persist`].
pub struct Runtime {
    pub state: AppState,
    pub client: VaultClient,
    ledger: MemoryLedger,
}

impl Runtime {
    pub async fn open(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        Self::from_state(AppState::load(custom_path)?).await
    }

    pub async fn from_state(state: AppState) -> Result<Self, StateError> {
        let key = state.load_key()?;
        let ledger = state.load_ledger()?;
        let storage = state.storage().await?;
        let registry = Registry::new(Arc::new(ledger.clone()), state.config.registry.clone());
        let wallet = Arc::new(LocalWallet::new(key.clone()));
        let client = VaultClient::new(key, wallet, storage, registry, state.config.session.clone())?;
        tracing::debug!(owner = %client.owner(), dir = ?state.dir, "state loaded");
        Ok(Self {
            state,
            client,
            ledger,
        })
    }

    pub fn persist(&self) -> Result<(), StateError> {
        self.state.save_ledger(&self.ledger)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("vaultline directory not initialized. Run 'vaultline init' first")]
    NotInitialized,

    #[error("vaultline directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("no storage providers configured")]
    NoProviders,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("ledger snapshot error: {0}")]
    Snapshot(#[from] bincode::Error),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state");
        let created = AppState::init(Some(path.clone()), None).unwrap();
        assert!(path.join(OBJECTS_DIR_NAME).join("0").is_dir());

        let loaded = AppState::load(Some(path.clone())).unwrap();
        assert_eq!(loaded.config.providers, created.config.providers);
        assert_eq!(loaded.config.storage.redundancy, 1);
        assert_eq!(
            loaded.load_key().unwrap().public(),
            created.load_key().unwrap().public()
        );
        assert!(matches!(
            AppState::init(Some(path), None),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_load_requires_init() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load(Some(dir.path().join("missing"))),
            Err(StateError::NotInitialized)
        ));
    }

    #[test]
    fn test_config_toml_shape() {
        let config: AppConfig = toml::from_str(
            r#"
            log_level = "debug"

            [storage]
            redundancy = 2

            [[providers]]
            name = "disk"
            [providers.backend]
            type = "local"
            path = "/tmp/vaultline"

            [[providers]]
            name = "mem"
            priority = 1
            [providers.backend]
            type = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.log_level(), LevelFilter::DEBUG);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[1].backend, ObjectStoreConfig::Memory);
        assert_eq!(config.registry, RegistryConfig::default());
    }

    #[tokio::test]
    async fn test_ledger_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        AppState::init(Some(path.clone()), None).unwrap();

        let runtime = Runtime::open(Some(path.clone())).await.unwrap();
        runtime.client.initialize().await.unwrap();
        let record = runtime
            .client
            .upload("notes.txt", b"remember me", SecurityLevel::Standard)
            .await
            .unwrap();
        runtime.persist().unwrap();
        drop(runtime);

        let reopened = Runtime::open(Some(path)).await.unwrap();
        assert_eq!(
            reopened.client.download(&record.file_id).await.unwrap(),
            b"remember me"
        );
    }
}
