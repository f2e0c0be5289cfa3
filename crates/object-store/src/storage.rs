//! Object storage backend abstraction (S3/MinIO/local filesystem/memory).

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

const OBJECTS_PREFIX: &str = "objects";
const KEY_LEN: usize = 64;

/// Where a provider keeps its objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectStoreConfig {
    /// In-memory storage (for testing)
    #[default]
    Memory,

    /// Local filesystem storage
    Local {
        /// Path to the storage directory
        path: PathBuf,
    },

    /// S3-compatible storage (AWS S3, MinIO, etc.)
    S3 {
        /// S3 endpoint URL (e.g., "http://localhost:9000" for MinIO)
        endpoint: String,
        access_key: String,
        secret_key: String,
        bucket: String,
        /// Optional region (defaults to "us-east-1")
        region: Option<String>,
    },
}

impl ObjectStoreConfig {
    /// Short backend label used in provider addresses.
    pub fn scheme(&self) -> &'static str {
        match self {
            ObjectStoreConfig::Memory => "mem",
            ObjectStoreConfig::Local { .. } => "file",
            ObjectStoreConfig::S3 { .. } => "s3",
        }
    }
}

/// Content-keyed object storage over any `object_store` backend.
///
/// Objects live under `objects/<first two hex chars>/<key>` so local
/// directories stay shallow.
#[derive(Clone)]
pub struct ObjectStorage {
    inner: Arc<dyn ObjectStore>,
    scheme: &'static str,
}

impl fmt::Debug for ObjectStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStorage")
            .field("scheme", &self.scheme)
            .finish()
    }
}

impl ObjectStorage {
    /// Open a storage backend from configuration.
    pub async fn open(config: ObjectStoreConfig) -> Result<Self> {
        let scheme = config.scheme();
        let inner: Arc<dyn ObjectStore> = match config {
            ObjectStoreConfig::Memory => Arc::new(InMemory::new()),

            ObjectStoreConfig::Local { path } => {
                tokio::fs::create_dir_all(path.join(OBJECTS_PREFIX)).await?;
                Arc::new(
                    LocalFileSystem::new_with_prefix(&path)
                        .map_err(|e| StoreError::InvalidConfig(e.to_string()))?,
                )
            }

            ObjectStoreConfig::S3 {
                endpoint,
                access_key,
                secret_key,
                bucket,
                region,
            } => {
                let store = AmazonS3Builder::new()
                    .with_endpoint(&endpoint)
                    .with_access_key_id(access_key)
                    .with_secret_access_key(secret_key)
                    .with_bucket_name(&bucket)
                    .with_region(region.as_deref().unwrap_or("us-east-1"))
                    .with_allow_http(endpoint.starts_with("http://"))
                    .build()
                    .map_err(|e| StoreError::InvalidConfig(e.to_string()))?;
                let store: Arc<dyn ObjectStore> = Arc::new(store);

                // Fail fast on a missing bucket instead of on the first write.
                match Self::probe(store.as_ref()).await {
                    Ok(()) => {}
                    Err(StoreError::ObjectStore(object_store::Error::NotFound { .. })) => {
                        return Err(StoreError::BucketNotFound(bucket));
                    }
                    Err(e) => {
                        let msg = e.to_string();
                        if msg.contains("NoSuchBucket") {
                            return Err(StoreError::BucketNotFound(bucket));
                        }
                        return Err(e);
                    }
                }
                store
            }
        };

        tracing::debug!(scheme, "opened object storage");
        Ok(Self { inner, scheme })
    }

    /// In-memory storage without going through configuration.
    pub fn memory() -> Self {
        Self {
            inner: Arc::new(InMemory::new()),
            scheme: "mem",
        }
    }

    pub fn scheme(&self) -> &'static str {
        self.scheme
    }

    fn object_path(key: &str) -> Result<ObjectPath> {
        let valid = key.len() == KEY_LEN
            && key
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(ObjectPath::from(format!(
            "{}/{}/{}",
            OBJECTS_PREFIX,
            &key[..2],
            key
        )))
    }

    async fn probe(store: &dyn ObjectStore) -> Result<()> {
        let prefix = ObjectPath::from(OBJECTS_PREFIX);
        store.list_with_delimiter(Some(&prefix)).await?;
        Ok(())
    }

    /// Store `data` under `key`. Rewriting an existing key is harmless
    /// because keys are content digests.
    pub async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let path = Self::object_path(key)?;
        self.inner.put(&path, data.into()).await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let path = Self::object_path(key)?;
        match self.inner.get(&path).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn contains(&self, key: &str) -> Result<bool> {
        let path = Self::object_path(key)?;
        match self.inner.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete an object. Missing objects are not an error.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let path = Self::object_path(key)?;
        match self.inner.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Every stored key.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let prefix = ObjectPath::from(OBJECTS_PREFIX);
        let items: Vec<_> = self.inner.list(Some(&prefix)).try_collect().await?;
        Ok(items
            .into_iter()
            .filter_map(|meta| meta.location.filename().map(str::to_string))
            .collect())
    }

    /// Cheap reachability check for health monitoring.
    pub async fn ping(&self) -> Result<()> {
        Self::probe(self.inner.as_ref()).await
    }
}
