use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::{Duration, Instant};

use super::wallet::WalletSigner;
use crate::config::SessionConfig;
use crate::crypto::{DerivationError, DerivedKeys, KeyDerivation, LevelKey, PublicKey, SecurityLevel};

#[derive(Debug, thiserror::Error)]
pub enum KeyCacheError {
    /// Keys expired and the wallet cannot sign for new ones
    #[error("keys unavailable: wallet disconnected")]
    KeysUnavailable,
    #[error("wallet switched from the session principal {0}")]
    PrincipalChanged(PublicKey),
    #[error(transparent)]
    Derivation(#[from] DerivationError),
}

#[derive(Debug)]
struct CachedKeys {
    keys: DerivedKeys,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    current: Option<CachedKeys>,
    /// Bumped by every `clear`; a derivation started under an older
    /// generation hands its keys to the caller but does not cache them
    generation: u64,
}

/// Session-scoped store of derived level keys.
///
/// A key set lives for a fixed TTL from the moment it was derived. Once it
/// expires the next `get` asks the wallet for a fresh signature. One
/// signature yields every level, so concurrent callers share one request
/// whichever levels they ask for.
#[derive(Debug)]
pub struct SessionKeyCache {
    derivation: KeyDerivation,
    wallet: Arc<dyn WalletSigner>,
    principal: PublicKey,
    ttl: Duration,
    state: Mutex<CacheState>,
    flight: tokio::sync::Mutex<()>,
}

impl SessionKeyCache {
    pub fn new(derivation: KeyDerivation, wallet: Arc<dyn WalletSigner>, config: SessionConfig) -> Self {
        let principal = wallet.public_key();
        Self {
            derivation,
            wallet,
            principal,
            ttl: config.key_ttl(),
            state: Mutex::new(CacheState::default()),
            flight: tokio::sync::Mutex::new(()),
        }
    }

    pub fn principal(&self) -> &PublicKey {
        &self.principal
    }

    /// Whether an unexpired key set is held.
    pub fn is_warm(&self) -> bool {
        self.cached().is_some()
    }

    /// Key for `level`, deriving a fresh set if needed.
    pub async fn get(&self, level: SecurityLevel) -> Result<LevelKey, KeyCacheError> {
        Ok(self.ensure(level).await?.get(level).clone())
    }

    /// All three level keys.
    pub async fn keys(&self) -> Result<DerivedKeys, KeyCacheError> {
        self.ensure(SecurityLevel::Standard).await
    }

    /// Forget every key, including any a pending derivation is about to
    /// return. Dropped keys are zeroized.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.generation = state.generation.wrapping_add(1);
        if state.current.take().is_some() {
            tracing::debug!(principal = %self.principal.to_hex(), "session keys cleared");
        }
    }

    fn cached(&self) -> Option<DerivedKeys> {
        let mut state = self.state.lock();
        match state.current.as_ref() {
            Some(entry) if Instant::now() < entry.expires_at => Some(entry.keys.clone()),
            Some(_) => {
                state.current = None;
                None
            }
            None => None,
        }
    }

    async fn ensure(&self, level: SecurityLevel) -> Result<DerivedKeys, KeyCacheError> {
        let wallet_key = self.wallet.public_key();
        if wallet_key != self.principal {
            self.clear();
            return Err(KeyCacheError::PrincipalChanged(self.principal));
        }
        if let Some(keys) = self.cached() {
            return Ok(keys);
        }

        let _flight = self.flight.lock().await;
        // Whoever held the flight before us may have refreshed the set.
        if let Some(keys) = self.cached() {
            return Ok(keys);
        }
        if !self.wallet.is_connected() {
            return Err(KeyCacheError::KeysUnavailable);
        }

        let generation = self.state.lock().generation;
        tracing::debug!(%level, "deriving session keys");
        let signature = match self.wallet.sign_message(self.derivation.message()).await {
            Ok(signature) => signature,
            Err(DerivationError::WalletDisconnected) => return Err(KeyCacheError::KeysUnavailable),
            Err(e) => return Err(e.into()),
        };
        let keys = self.derivation.derive_verified(&self.principal, &signature)?;
        let mut state = self.state.lock();
        if state.generation == generation {
            state.current = Some(CachedKeys {
                keys: keys.clone(),
                expires_at: Instant::now() + self.ttl,
            });
        } else {
            tracing::debug!(%level, "cache cleared during derivation, keys not kept");
        }
        Ok(keys)
    }
}
