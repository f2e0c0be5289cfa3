use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

use super::chunking::split_into_chunks;
use super::health::{HealthEvent, HealthTracker, ProviderState};
use super::locator::{ChunkManifest, ChunkRef, ContentHash, Locator, Replica, MANIFEST_VERSION};
use super::provider::{ProviderError, StorageProvider};
use crate::config::StorageConfig;

/// Latency history is a routing hint; forget it rather than grow forever.
const LATENCY_HISTORY_LIMIT: usize = 16_384;
/// Replicas of puts that have not completed yet, kept for their retry.
const PLACEMENT_LIMIT: usize = 16_384;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage unavailable for {content}: {replicated}/{required} replicas after {rounds} rounds")]
    Unavailable {
        content: ContentHash,
        replicated: usize,
        required: usize,
        rounds: u32,
    },
    #[error("object {0} not found on any provider")]
    NotFound(ContentHash),
    #[error("redundancy {requested} is not satisfiable with {providers} providers")]
    InvalidRedundancy { requested: usize, providers: usize },
    #[error("corrupt chunk manifest: {0}")]
    CorruptManifest(String),
    #[error("invalid storage configuration: {0}")]
    Configuration(String),
    #[error("storage error: {0}")]
    Default(#[from] anyhow::Error),
}

impl StorageError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Unavailable { .. })
    }
}

#[derive(Debug)]
struct ProviderSlot {
    provider: Arc<dyn StorageProvider>,
    /// Lower is preferred
    priority: u8,
    health: Mutex<HealthTracker>,
}

#[derive(Debug)]
struct OrchestratorInner {
    slots: Vec<ProviderSlot>,
    config: StorageConfig,
    /// content -> provider index -> last observed read latency
    latencies: Mutex<HashMap<ContentHash, HashMap<usize, Duration>>>,
    /// Replicas written by puts that failed before finishing, so a retry
    /// resumes instead of rewriting. Cleared once the put succeeds.
    placements: Mutex<HashMap<ContentHash, Vec<Replica>>>,
}

/// Provider-agnostic, health-aware replication over several backends.
///
/// Writes go to the preferred healthy providers until `redundancy` distinct
/// providers hold the object. Reads try the historically fastest replica
/// first and fall back to every other one. Objects above the configured
/// chunk size are stored as chunks plus a content-addressed manifest.
#[derive(Debug, Clone)]
pub struct StorageOrchestrator {
    inner: Arc<OrchestratorInner>,
}

enum Attempt {
    Found(Bytes),
    Missing,
    Failed,
}

impl StorageOrchestrator {
    /// Build over `(provider, priority)` pairs. Priority 0 is the primary.
    pub fn new(
        config: StorageConfig,
        providers: Vec<(Arc<dyn StorageProvider>, u8)>,
    ) -> Result<Self, StorageError> {
        if providers.is_empty() {
            return Err(StorageError::Configuration(
                "at least one provider is required".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for (provider, _) in &providers {
            if !names.insert(provider.name().to_string()) {
                return Err(StorageError::Configuration(format!(
                    "duplicate provider name {}",
                    provider.name()
                )));
            }
        }
        if config.redundancy == 0 || config.redundancy > providers.len() {
            return Err(StorageError::InvalidRedundancy {
                requested: config.redundancy,
                providers: providers.len(),
            });
        }

        let slots = providers
            .into_iter()
            .map(|(provider, priority)| ProviderSlot {
                provider,
                priority,
                health: Mutex::new(HealthTracker::new(config.unavailable_after)),
            })
            .collect();

        Ok(Self {
            inner: Arc::new(OrchestratorInner {
                slots,
                config,
                latencies: Mutex::new(HashMap::new()),
                placements: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.inner.config
    }

    pub fn default_redundancy(&self) -> usize {
        self.inner.config.redundancy
    }

    pub fn provider_states(&self) -> Vec<(String, ProviderState)> {
        self.inner
            .slots
            .iter()
            .map(|slot| (slot.provider.name().to_string(), slot.health.lock().state()))
            .collect()
    }

    pub fn state_of(&self, name: &str) -> Option<ProviderState> {
        self.inner
            .slots
            .iter()
            .find(|slot| slot.provider.name() == name)
            .map(|slot| slot.health.lock().state())
    }

    fn record_outcome(&self, index: usize, event: HealthEvent) {
        let slot = &self.inner.slots[index];
        let transition = slot.health.lock().record(event);
        if let Some((from, to)) = transition {
            match to {
                ProviderState::Healthy => {
                    tracing::info!(provider = slot.provider.name(), %from, %to, "provider recovered")
                }
                _ => tracing::warn!(provider = slot.provider.name(), %from, %to, "provider state changed"),
            }
        }
    }

    /// Usable providers, best first: by state, then priority.
    fn routing_order(&self) -> Vec<usize> {
        let mut order: Vec<(ProviderState, u8, usize)> = self
            .inner
            .slots
            .iter()
            .enumerate()
            .map(|(index, slot)| (slot.health.lock().state(), slot.priority, index))
            .filter(|(state, _, _)| *state != ProviderState::Unavailable)
            .collect();
        order.sort();
        order.into_iter().map(|(_, _, index)| index).collect()
    }

    /// Store `data` on `redundancy` distinct providers.
    pub async fn put(&self, data: Bytes, redundancy: usize) -> Result<Locator, StorageError> {
        if redundancy == 0 || redundancy > self.inner.slots.len() {
            return Err(StorageError::InvalidRedundancy {
                requested: redundancy,
                providers: self.inner.slots.len(),
            });
        }

        let size = data.len() as u64;
        if data.len() <= self.inner.config.chunk_size {
            let content = ContentHash::of(&data);
            let replicas = self.put_object(content, data, redundancy).await?;
            self.forget_placements(&[content]);
            return Ok(Locator {
                content,
                size,
                chunked: false,
                replicas,
            });
        }

        let payload = ContentHash::of(&data);
        let chunks = split_into_chunks(&data, self.inner.config.chunk_size);
        tracing::debug!(
            payload = %payload.short(),
            chunks = chunks.len(),
            "storing chunked payload"
        );
        let mut refs = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let content = ContentHash::of(&chunk.data);
            let chunk_size = chunk.data.len() as u64;
            self.put_object(content, chunk.data, redundancy).await?;
            refs.push(ChunkRef {
                content,
                size: chunk_size,
            });
        }

        let manifest = ChunkManifest {
            version: MANIFEST_VERSION,
            total_size: size,
            payload,
            chunks: refs,
        };
        let encoded = Bytes::from(
            bincode::serialize(&manifest)
                .map_err(|e| StorageError::CorruptManifest(e.to_string()))?,
        );
        let content = ContentHash::of(&encoded);
        let replicas = self.put_object(content, encoded, redundancy).await?;
        let mut stored: Vec<ContentHash> = manifest.chunks.iter().map(|c| c.content).collect();
        stored.push(content);
        self.forget_placements(&stored);
        Ok(Locator {
            content,
            size,
            chunked: true,
            replicas,
        })
    }

    fn remember_placement(&self, content: ContentHash, replicas: &[Replica]) {
        let mut placements = self.inner.placements.lock();
        if placements.len() >= PLACEMENT_LIMIT && !placements.contains_key(&content) {
            placements.clear();
        }
        placements.insert(content, replicas.to_vec());
    }

    fn forget_placements(&self, contents: &[ContentHash]) {
        let mut placements = self.inner.placements.lock();
        for content in contents {
            placements.remove(content);
        }
    }

    /// Keep only the remembered replicas their provider still holds.
    async fn confirm_replicas(&self, remembered: Vec<Replica>) -> Vec<Replica> {
        let call_timeout = self.inner.config.call_timeout();
        let mut confirmed = Vec::with_capacity(remembered.len());
        for replica in remembered {
            let Some(slot) = self
                .inner
                .slots
                .iter()
                .find(|slot| slot.provider.name() == replica.provider)
            else {
                continue;
            };
            match timeout(call_timeout, slot.provider.contains(&replica.address)).await {
                Ok(Ok(true)) => confirmed.push(replica),
                _ => tracing::debug!(provider = %replica.provider, "remembered replica gone, rewriting"),
            }
        }
        confirmed
    }

    async fn put_object(
        &self,
        content: ContentHash,
        data: Bytes,
        redundancy: usize,
    ) -> Result<Vec<Replica>, StorageError> {
        let remembered = self
            .inner
            .placements
            .lock()
            .get(&content)
            .cloned()
            .unwrap_or_default();
        let mut replicas = self.confirm_replicas(remembered).await;
        if replicas.len() >= redundancy {
            tracing::debug!(content = %content.short(), "already replicated, skipping");
            return Ok(replicas);
        }

        let call_timeout = self.inner.config.call_timeout();
        let rounds = self.inner.config.retry_rounds;
        for round in 0..=rounds {
            if round > 0 {
                tokio::time::sleep(self.inner.config.retry_backoff(round - 1)).await;
                self.refresh_unhealthy().await;
            }

            for index in self.routing_order() {
                if replicas.len() >= redundancy {
                    break;
                }
                let provider = &self.inner.slots[index].provider;
                if replicas.iter().any(|r| r.provider == provider.name()) {
                    continue;
                }
                match timeout(call_timeout, provider.put(data.clone())).await {
                    Ok(Ok(address)) => {
                        tracing::debug!(
                            provider = provider.name(),
                            content = %content.short(),
                            "replica stored"
                        );
                        replicas.push(Replica {
                            provider: provider.name().to_string(),
                            address,
                        });
                        self.remember_placement(content, &replicas);
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(provider = provider.name(), error = %e, "put failed");
                        self.record_outcome(index, HealthEvent::CallFailed);
                    }
                    Err(_) => {
                        tracing::warn!(provider = provider.name(), "put timed out");
                        self.record_outcome(index, HealthEvent::CallFailed);
                    }
                }
            }

            if replicas.len() >= redundancy {
                return Ok(replicas);
            }
            tracing::warn!(
                content = %content.short(),
                replicated = replicas.len(),
                required = redundancy,
                round,
                "write not yet durable"
            );
        }

        tracing::error!(content = %content.short(), "giving up on write");
        Err(StorageError::Unavailable {
            content,
            replicated: replicas.len(),
            required: redundancy,
            rounds: rounds + 1,
        })
    }

    /// Read candidates for `content`: hinted replicas first, then every other
    /// usable provider, ordered by observed latency for this content.
    fn read_order(&self, content: &ContentHash, hints: &[Replica]) -> Vec<(usize, String)> {
        let routing = self.routing_order();
        let latencies = self
            .inner
            .latencies
            .lock()
            .get(content)
            .cloned()
            .unwrap_or_default();

        let mut candidates: Vec<(Option<Duration>, bool, usize, usize, String)> = routing
            .iter()
            .enumerate()
            .map(|(rank, &index)| {
                let provider = &self.inner.slots[index].provider;
                let hinted = hints.iter().find(|r| r.provider == provider.name());
                let address = hinted
                    .map(|r| r.address.clone())
                    .unwrap_or_else(|| provider.address_for(content));
                (
                    latencies.get(&index).copied(),
                    hinted.is_none(),
                    rank,
                    index,
                    address,
                )
            })
            .collect();

        // Known-fast first, then hinted, then routing preference.
        candidates.sort_by(|a, b| match (a.0, b.0) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => (a.1, a.2).cmp(&(b.1, b.2)),
        });
        candidates
            .into_iter()
            .map(|(_, _, _, index, address)| (index, address))
            .collect()
    }

    fn record_latency(&self, content: ContentHash, index: usize, elapsed: Duration) {
        let mut latencies = self.inner.latencies.lock();
        if latencies.len() >= LATENCY_HISTORY_LIMIT && !latencies.contains_key(&content) {
            latencies.clear();
        }
        latencies.entry(content).or_default().insert(index, elapsed);
    }

    async fn try_read(&self, index: usize, address: &str, content: &ContentHash) -> Attempt {
        let provider = &self.inner.slots[index].provider;
        let started = Instant::now();
        match timeout(self.inner.config.call_timeout(), provider.get(address)).await {
            Ok(Ok(bytes)) if content.matches(&bytes) => {
                self.record_latency(*content, index, started.elapsed());
                Attempt::Found(bytes)
            }
            Ok(Ok(_)) => {
                tracing::warn!(provider = provider.name(), content = %content.short(), "replica failed verification");
                self.record_outcome(index, HealthEvent::CallFailed);
                Attempt::Failed
            }
            Ok(Err(ProviderError::NotFound(_))) => Attempt::Missing,
            Ok(Err(e)) => {
                tracing::warn!(provider = provider.name(), error = %e, "get failed");
                self.record_outcome(index, HealthEvent::CallFailed);
                Attempt::Failed
            }
            Err(_) => {
                tracing::warn!(provider = provider.name(), "get timed out");
                self.record_outcome(index, HealthEvent::CallFailed);
                Attempt::Failed
            }
        }
    }

    async fn get_object(
        &self,
        content: &ContentHash,
        hints: &[Replica],
    ) -> Result<Bytes, StorageError> {
        let rounds = self.inner.config.retry_rounds;
        for round in 0..=rounds {
            if round > 0 {
                tokio::time::sleep(self.inner.config.retry_backoff(round - 1)).await;
                self.refresh_unhealthy().await;
            }

            let candidates = self.read_order(content, hints);
            let mut missing = 0;
            for (index, address) in &candidates {
                match self.try_read(*index, address, content).await {
                    Attempt::Found(bytes) => return Ok(bytes),
                    Attempt::Missing => missing += 1,
                    Attempt::Failed => {}
                }
            }
            // Every reachable provider answered, and none has it.
            if !candidates.is_empty() && missing == self.inner.slots.len() {
                return Err(StorageError::NotFound(*content));
            }
        }

        tracing::error!(content = %content.short(), "all replicas failed");
        Err(StorageError::Unavailable {
            content: *content,
            replicated: 0,
            required: 1,
            rounds: rounds + 1,
        })
    }

    /// Fetch and verify the object behind `locator`.
    pub async fn get(&self, locator: &Locator) -> Result<Bytes, StorageError> {
        let bytes = self.get_object(&locator.content, &locator.replicas).await?;
        if !locator.chunked {
            return Ok(bytes);
        }

        let manifest = Self::decode_manifest(&bytes)?;
        let mut payload = BytesMut::with_capacity(manifest.total_size as usize);
        for chunk in &manifest.chunks {
            let data = self.get_object(&chunk.content, &[]).await?;
            if data.len() as u64 != chunk.size {
                return Err(StorageError::CorruptManifest(format!(
                    "chunk {} has size {}, manifest says {}",
                    chunk.content.short(),
                    data.len(),
                    chunk.size
                )));
            }
            payload.extend_from_slice(&data);
        }
        let payload = payload.freeze();
        if payload.len() as u64 != manifest.total_size || !manifest.payload.matches(&payload) {
            return Err(StorageError::CorruptManifest(
                "reassembled payload does not match manifest".to_string(),
            ));
        }
        Ok(payload)
    }

    fn decode_manifest(bytes: &[u8]) -> Result<ChunkManifest, StorageError> {
        let manifest: ChunkManifest =
            bincode::deserialize(bytes).map_err(|e| StorageError::CorruptManifest(e.to_string()))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(StorageError::CorruptManifest(format!(
                "unsupported manifest version {}",
                manifest.version
            )));
        }
        Ok(manifest)
    }

    /// Best-effort removal from every provider.
    pub async fn delete(&self, locator: &Locator) -> Result<(), StorageError> {
        let mut contents = vec![locator.content];
        if locator.chunked {
            let bytes = self.get_object(&locator.content, &locator.replicas).await?;
            let manifest = Self::decode_manifest(&bytes)?;
            contents.extend(manifest.chunks.iter().map(|c| c.content));
        }

        let call_timeout = self.inner.config.call_timeout();
        for content in contents {
            self.inner.placements.lock().remove(&content);
            self.inner.latencies.lock().remove(&content);
            for slot in &self.inner.slots {
                let address = slot.provider.address_for(&content);
                match timeout(call_timeout, slot.provider.delete(&address)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!(provider = slot.provider.name(), error = %e, "delete failed"),
                    Err(_) => tracing::warn!(provider = slot.provider.name(), "delete timed out"),
                }
            }
        }
        Ok(())
    }

    async fn probe(&self, index: usize) {
        let slot = &self.inner.slots[index];
        let outcome = timeout(self.inner.config.call_timeout(), slot.provider.health_check()).await;
        let event = match outcome {
            Ok(Ok(())) => HealthEvent::ProbeSucceeded,
            Ok(Err(e)) => {
                tracing::debug!(provider = slot.provider.name(), error = %e, "health check failed");
                HealthEvent::ProbeFailed
            }
            Err(_) => HealthEvent::ProbeFailed,
        };
        self.record_outcome(index, event);
    }

    /// Probe every provider once.
    pub async fn check_health(&self) {
        let probes = (0..self.inner.slots.len()).map(|index| self.probe(index));
        futures::future::join_all(probes).await;
    }

    async fn refresh_unhealthy(&self) {
        let unhealthy: Vec<usize> = self
            .inner
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.health.lock().state() != ProviderState::Healthy)
            .map(|(index, _)| index)
            .collect();
        futures::future::join_all(unhealthy.into_iter().map(|index| self.probe(index))).await;
    }

    /// Probe all providers every `health_interval` until the handle is aborted.
    pub fn spawn_health_monitor(&self) -> JoinHandle<()> {
        let orchestrator = self.clone();
        let period = self.inner.config.health_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                orchestrator.check_health().await;
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::storage::MemoryProvider;

    fn orchestrator(
        config: StorageConfig,
        count: usize,
    ) -> (StorageOrchestrator, Vec<MemoryProvider>) {
        let providers: Vec<MemoryProvider> = (0..count)
            .map(|i| MemoryProvider::new(format!("mem-{}", i)))
            .collect();
        let handles = providers
            .iter()
            .enumerate()
            .map(|(i, p)| (Arc::new(p.clone()) as Arc<dyn StorageProvider>, i as u8))
            .collect();
        (StorageOrchestrator::new(config, handles).unwrap(), providers)
    }

    #[tokio::test]
    async fn test_put_replicates_to_distinct_providers() {
        let (storage, providers) = orchestrator(StorageConfig::default(), 3);
        let locator = storage.put(Bytes::from("hello"), 2).await.unwrap();
        assert_eq!(locator.replicas.len(), 2);
        assert_ne!(locator.replicas[0].provider, locator.replicas[1].provider);
        // Highest priority providers first.
        assert_eq!(providers[0].object_count(), 1);
        assert_eq!(providers[1].object_count(), 1);
        assert_eq!(providers[2].object_count(), 0);

        assert_eq!(storage.get(&locator).await.unwrap(), Bytes::from("hello"));
    }

    #[tokio::test]
    async fn test_invalid_redundancy() {
        let (storage, _) = orchestrator(
            StorageConfig {
                redundancy: 1,
                ..Default::default()
            },
            2,
        );
        assert!(matches!(
            storage.put(Bytes::from("x"), 3).await,
            Err(StorageError::InvalidRedundancy { requested: 3, providers: 2 })
        ));
        assert!(matches!(
            storage.put(Bytes::from("x"), 0).await,
            Err(StorageError::InvalidRedundancy { .. })
        ));
    }

    #[tokio::test]
    async fn test_bare_locator_is_enough_to_read() {
        let (storage, _) = orchestrator(StorageConfig::default(), 2);
        let locator = storage.put(Bytes::from("bare"), 1).await.unwrap();
        let bare = Locator::bare(locator.content, false);
        assert_eq!(storage.get(&bare).await.unwrap(), Bytes::from("bare"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_replica_falls_back() {
        let (storage, providers) = orchestrator(StorageConfig::default(), 2);
        let locator = storage.put(Bytes::from("precious"), 2).await.unwrap();
        providers[0].set_corrupt(true);
        assert_eq!(storage.get(&locator).await.unwrap(), Bytes::from("precious"));
        assert_eq!(storage.state_of("mem-0"), Some(ProviderState::Degraded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out_and_degrades() {
        let config = StorageConfig {
            redundancy: 1,
            call_timeout_ms: 100,
            ..Default::default()
        };
        let (storage, providers) = orchestrator(config, 2);
        providers[0].set_latency(Some(Duration::from_secs(5)));

        let locator = storage.put(Bytes::from("slow"), 1).await.unwrap();
        assert_eq!(locator.replicas[0].provider, "mem-1");
        assert_eq!(storage.state_of("mem-0"), Some(ProviderState::Degraded));
        assert_eq!(storage.state_of("mem-1"), Some(ProviderState::Healthy));
    }

    #[tokio::test]
    async fn test_missing_everywhere_is_not_found() {
        let (storage, _) = orchestrator(StorageConfig::default(), 2);
        let locator = Locator::bare(ContentHash::of(b"never stored"), false);
        assert!(matches!(
            storage.get(&locator).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_chunked_roundtrip_and_resume() {
        let config = StorageConfig {
            redundancy: 1,
            chunk_size: 1024,
            retry_rounds: 0,
            ..Default::default()
        };
        let (storage, providers) = orchestrator(config, 1);
        let data = Bytes::from((0..5000u32).map(|i| (i % 251) as u8).collect::<Vec<_>>());

        // Two of five chunks land, then the provider stops accepting writes.
        providers[0].fail_puts_after(2);
        assert!(matches!(
            storage.put(data.clone(), 1).await,
            Err(StorageError::Unavailable { .. })
        ));
        assert_eq!(providers[0].put_count(), 2);

        providers[0].clear_faults();
        storage.check_health().await;
        let locator = storage.put(data.clone(), 1).await.unwrap();
        assert!(locator.chunked);
        assert_eq!(locator.size, 5000);
        // Three remaining chunks plus the manifest.
        assert_eq!(providers[0].put_count(), 6);

        assert_eq!(storage.get(&locator).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_lost_replica_is_rewritten() {
        let (storage, providers) = orchestrator(StorageConfig::default(), 2);
        let locator = storage.put(Bytes::from("keep me"), 2).await.unwrap();
        assert!(storage.inner.placements.lock().is_empty());

        let address = providers[0].address_for(&locator.content);
        providers[0].delete(&address).await.unwrap();
        assert_eq!(providers[0].object_count(), 0);

        storage.put(Bytes::from("keep me"), 2).await.unwrap();
        assert_eq!(providers[0].object_count(), 1);
        assert_eq!(providers[0].put_count(), 2);
    }

    #[tokio::test]
    async fn test_placements_stay_bounded() {
        let (storage, _) = orchestrator(StorageConfig::default(), 1);
        let replica = Replica {
            provider: "mem-0".to_string(),
            address: "unused".to_string(),
        };
        for i in 0..PLACEMENT_LIMIT + 10 {
            let content = ContentHash::of(&(i as u64).to_le_bytes());
            storage.remember_placement(content, std::slice::from_ref(&replica));
        }
        assert!(storage.inner.placements.lock().len() <= PLACEMENT_LIMIT);
    }

    #[tokio::test]
    async fn test_delete_removes_chunks() {
        let config = StorageConfig {
            redundancy: 2,
            chunk_size: 100,
            ..Default::default()
        };
        let (storage, providers) = orchestrator(config, 2);
        let data: Vec<u8> = (0..250u32).map(|i| i as u8).collect();
        let locator = storage.put(Bytes::from(data), 2).await.unwrap();
        // Three chunks plus the manifest.
        assert_eq!(providers[0].object_count(), 4);
        storage.delete(&locator).await.unwrap();
        assert_eq!(providers[0].object_count(), 0);
        assert_eq!(providers[1].object_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_monitor_recovers_provider() {
        let config = StorageConfig {
            redundancy: 1,
            unavailable_after: 2,
            health_interval_ms: 1_000,
            ..Default::default()
        };
        let (storage, providers) = orchestrator(config, 2);
        providers[1].set_offline(true);
        let monitor = storage.spawn_health_monitor();

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(storage.state_of("mem-1"), Some(ProviderState::Unavailable));

        providers[1].set_offline(false);
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(storage.state_of("mem-1"), Some(ProviderState::Healthy));
        monitor.abort();
    }
}
