//! Object Storage Backend
//!
//! A small content-keyed wrapper over the `object_store` crate, used by
//! Vaultline as one of its storage providers.
//!
//! # Features
//!
//! - Objects keyed by their BLAKE3 hex digest
//! - Multiple storage backends: S3, MinIO, local filesystem, in-memory
//! - Cheap reachability probe for provider health checks
//!
//! # Example
//!
//! ```rust,no_run
//! use vaultline_object_store::{ObjectStorage, ObjectStoreConfig};
//!
//! # async fn example() -> Result<(), vaultline_object_store::StoreError> {
//! let storage = ObjectStorage::open(ObjectStoreConfig::Local {
//!     path: "/tmp/vaultline-objects".into(),
//! })
//! .await?;
//! storage.ping().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod storage;

pub use error::{Result, StoreError};
pub use storage::{ObjectStorage, ObjectStoreConfig};
