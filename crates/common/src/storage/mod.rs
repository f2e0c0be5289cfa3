//! Replicated, content-addressed object storage.
//!
//! Providers are interchangeable backends behind [`StorageProvider`]. The
//! [`StorageOrchestrator`] replicates across them, tracks their health and
//! verifies every byte it reads against its BLAKE3 address.

mod chunking;
mod health;
mod locator;
mod memory;
mod object;
mod orchestrator;
mod provider;

pub use chunking::{split_into_chunks, Chunk};
pub use health::{HealthEvent, ProviderState};
pub use locator::{
    ChunkManifest, ChunkRef, ContentHash, Locator, Replica, CONTENT_HASH_SIZE, MANIFEST_VERSION,
};
pub use memory::MemoryProvider;
pub use object::ObjectStoreProvider;
pub use orchestrator::{StorageError, StorageOrchestrator};
pub use provider::{ProviderError, StorageProvider};
