use std::fmt;

use serde::{Deserialize, Serialize};

/// Size of a BLAKE3 content address in bytes
pub const CONTENT_HASH_SIZE: usize = 32;

/// BLAKE3 digest identifying a stored object on every provider.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ContentHash([u8; CONTENT_HASH_SIZE]);

impl ContentHash {
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        blake3::hash(data) == blake3::Hash::from(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; CONTENT_HASH_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let mut bytes = [0u8; CONTENT_HASH_SIZE];
        hex::decode_to_slice(hex, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; CONTENT_HASH_SIZE]
    }
}

impl From<[u8; CONTENT_HASH_SIZE]> for ContentHash {
    fn from(bytes: [u8; CONTENT_HASH_SIZE]) -> Self {
        ContentHash(bytes)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// One durable copy of an object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Replica {
    pub provider: String,
    /// Backend-specific and opaque to the orchestrator
    pub address: String,
}

/// Where an object lives.
///
/// `content` alone is enough to find it again: every provider can map a
/// content hash to its own address, so ledger records only keep `content` and
/// `chunked`. `replicas` is a hint for the reader.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub content: ContentHash,
    pub size: u64,
    /// `content` names a [`ChunkManifest`] rather than the payload itself
    pub chunked: bool,
    pub replicas: Vec<Replica>,
}

impl Locator {
    /// A locator rebuilt from ledger fields, without replica hints.
    pub fn bare(content: ContentHash, chunked: bool) -> Self {
        Self {
            content,
            size: 0,
            chunked,
            replicas: Vec::new(),
        }
    }

    pub fn provider_count(&self) -> usize {
        self.replicas.len()
    }
}

pub const MANIFEST_VERSION: u16 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    pub content: ContentHash,
    pub size: u64,
}

/// Content-addressed index of a chunked payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkManifest {
    pub version: u16,
    pub total_size: u64,
    /// Digest of the reassembled payload
    pub payload: ContentHash,
    pub chunks: Vec<ChunkRef>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_content_hash_matches() {
        let hash = ContentHash::of(b"payload");
        assert!(hash.matches(b"payload"));
        assert!(!hash.matches(b"payloaD"));
        assert_eq!(ContentHash::from_hex(&hash.to_hex()), Some(hash));
        assert_eq!(ContentHash::from_hex("zz"), None);
    }
}
