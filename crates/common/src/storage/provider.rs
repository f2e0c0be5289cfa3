use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

use super::locator::ContentHash;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider {0} is offline")]
    Offline(String),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("provider backend error: {0}")]
    Backend(String),
    #[error("provider error: {0}")]
    Default(#[from] anyhow::Error),
}

/// A content-addressed object backend.
///
/// Addresses are backend-specific strings; the orchestrator never parses
/// them. Providers know nothing about files, owners or permissions.
#[async_trait]
pub trait StorageProvider: Send + Sync + Debug {
    /// Stable name, unique within one orchestrator.
    fn name(&self) -> &str;

    /// Address this provider uses for `content`.
    fn address_for(&self, content: &ContentHash) -> String;

    /// Store `data`, returning its address.
    async fn put(&self, data: Bytes) -> Result<String, ProviderError>;

    async fn get(&self, address: &str) -> Result<Bytes, ProviderError>;

    async fn contains(&self, address: &str) -> Result<bool, ProviderError>;

    async fn delete(&self, address: &str) -> Result<(), ProviderError>;

    async fn health_check(&self) -> Result<(), ProviderError>;
}
