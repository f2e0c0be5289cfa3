use async_trait::async_trait;
use bytes::Bytes;
use object_store::{ObjectStorage, ObjectStoreConfig, StoreError};

use super::locator::ContentHash;
use super::provider::{ProviderError, StorageProvider};

impl From<StoreError> for ProviderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidKey(key) => ProviderError::NotFound(key),
            other => ProviderError::Backend(other.to_string()),
        }
    }
}

/// Provider backed by memory, a local directory or an S3 bucket.
///
/// Addresses look like `<scheme>://<name>/<blake3 hex>`.
#[derive(Debug, Clone)]
pub struct ObjectStoreProvider {
    name: String,
    storage: ObjectStorage,
}

impl ObjectStoreProvider {
    pub async fn open(name: impl Into<String>, config: ObjectStoreConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            name: name.into(),
            storage: ObjectStorage::open(config).await?,
        })
    }

    pub fn new(name: impl Into<String>, storage: ObjectStorage) -> Self {
        Self {
            name: name.into(),
            storage,
        }
    }

    fn key<'a>(&self, address: &'a str) -> Result<&'a str, ProviderError> {
        address
            .rsplit_once('/')
            .map(|(_, key)| key)
            .ok_or_else(|| ProviderError::NotFound(address.to_string()))
    }
}

#[async_trait]
impl StorageProvider for ObjectStoreProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn address_for(&self, content: &ContentHash) -> String {
        format!("{}://{}/{}", self.storage.scheme(), self.name, content.to_hex())
    }

    async fn put(&self, data: Bytes) -> Result<String, ProviderError> {
        let content = ContentHash::of(&data);
        self.storage.put(&content.to_hex(), data).await?;
        Ok(self.address_for(&content))
    }

    async fn get(&self, address: &str) -> Result<Bytes, ProviderError> {
        let key = self.key(address)?;
        self.storage
            .get(key)
            .await?
            .ok_or_else(|| ProviderError::NotFound(address.to_string()))
    }

    async fn contains(&self, address: &str) -> Result<bool, ProviderError> {
        Ok(self.storage.contains(self.key(address)?).await?)
    }

    async fn delete(&self, address: &str) -> Result<(), ProviderError> {
        Ok(self.storage.delete(self.key(address)?).await?)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(self.storage.ping().await?)
    }
}
