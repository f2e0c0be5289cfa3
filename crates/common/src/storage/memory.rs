use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use super::locator::ContentHash;
use super::provider::{ProviderError, StorageProvider};

/// In-process provider with fault injection, for tests and local runs.
///
/// Clones share the same objects and fault switches, so a test can keep a
/// handle while the orchestrator owns another.
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    name: String,
    inner: Arc<MemoryProviderInner>,
}

#[derive(Debug, Default)]
struct MemoryProviderInner {
    objects: RwLock<HashMap<String, Bytes>>,
    offline: AtomicBool,
    corrupt: AtomicBool,
    /// Fail this many upcoming put/get calls
    fail_next: AtomicUsize,
    /// Allow this many more puts, then fail every put
    puts_allowed: Mutex<Option<usize>>,
    latency: Mutex<Option<Duration>>,
    puts: AtomicUsize,
    gets: AtomicUsize,
}

impl MemoryProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(MemoryProviderInner::default()),
        }
    }

    /// Take the provider off the network; every call and health check fails.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Serve objects with their first byte flipped.
    pub fn set_corrupt(&self, corrupt: bool) {
        self.inner.corrupt.store(corrupt, Ordering::SeqCst);
    }

    pub fn fail_next(&self, calls: usize) {
        self.inner.fail_next.store(calls, Ordering::SeqCst);
    }

    pub fn fail_puts_after(&self, puts: usize) {
        *self.inner.puts_allowed.lock() = Some(puts);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.inner.latency.lock() = latency;
    }

    pub fn clear_faults(&self) {
        self.set_offline(false);
        self.set_corrupt(false);
        self.fail_next(0);
        *self.inner.puts_allowed.lock() = None;
        self.set_latency(None);
    }

    /// Successful puts so far.
    pub fn put_count(&self) -> usize {
        self.inner.puts.load(Ordering::SeqCst)
    }

    /// Successful gets so far.
    pub fn get_count(&self) -> usize {
        self.inner.gets.load(Ordering::SeqCst)
    }

    pub fn object_count(&self) -> usize {
        self.inner.objects.read().len()
    }

    async fn inject(&self) -> Result<(), ProviderError> {
        let latency = *self.inner.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(ProviderError::Offline(self.name.clone()));
        }
        let failed = self
            .inner
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ProviderError::Backend("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn address_for(&self, content: &ContentHash) -> String {
        format!("mem://{}/{}", self.name, content.to_hex())
    }

    async fn put(&self, data: Bytes) -> Result<String, ProviderError> {
        self.inject().await?;
        {
            let mut allowed = self.inner.puts_allowed.lock();
            if let Some(remaining) = allowed.as_mut() {
                if *remaining == 0 {
                    return Err(ProviderError::Backend("put quota exhausted".to_string()));
                }
                *remaining -= 1;
            }
        }
        let address = self.address_for(&ContentHash::of(&data));
        self.inner.objects.write().insert(address.clone(), data);
        self.inner.puts.fetch_add(1, Ordering::SeqCst);
        Ok(address)
    }

    async fn get(&self, address: &str) -> Result<Bytes, ProviderError> {
        self.inject().await?;
        let data = self
            .inner
            .objects
            .read()
            .get(address)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(address.to_string()))?;
        self.inner.gets.fetch_add(1, Ordering::SeqCst);
        if self.inner.corrupt.load(Ordering::SeqCst) && !data.is_empty() {
            let mut bad = data.to_vec();
            bad[0] ^= 0xff;
            return Ok(Bytes::from(bad));
        }
        Ok(data)
    }

    async fn contains(&self, address: &str) -> Result<bool, ProviderError> {
        self.inject().await?;
        Ok(self.inner.objects.read().contains_key(address))
    }

    async fn delete(&self, address: &str) -> Result<(), ProviderError> {
        self.inject().await?;
        self.inner.objects.write().remove(address);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(ProviderError::Offline(self.name.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let provider = MemoryProvider::new("mem-a");
        let address = provider.put(Bytes::from("hello")).await.unwrap();
        assert_eq!(address, provider.address_for(&ContentHash::of(b"hello")));
        assert_eq!(provider.get(&address).await.unwrap(), Bytes::from("hello"));
        provider.delete(&address).await.unwrap();
        assert!(matches!(
            provider.get(&address).await,
            Err(ProviderError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fault_switches() {
        let provider = MemoryProvider::new("mem-b");
        provider.fail_next(1);
        assert!(provider.put(Bytes::from("x")).await.is_err());
        assert!(provider.put(Bytes::from("x")).await.is_ok());

        provider.set_offline(true);
        assert!(provider.health_check().await.is_err());
        provider.clear_faults();
        assert!(provider.health_check().await.is_ok());

        provider.fail_puts_after(1);
        assert!(provider.put(Bytes::from("y")).await.is_ok());
        assert!(provider.put(Bytes::from("z")).await.is_err());
        assert_eq!(provider.put_count(), 2);
    }
}
