//! Wallet access and the session-scoped key cache.

mod key_cache;
mod wallet;

pub use key_cache::{KeyCacheError, SessionKeyCache};
pub use wallet::{CountingWallet, LocalWallet, WalletSigner};
