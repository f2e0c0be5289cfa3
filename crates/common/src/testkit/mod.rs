/// Lightweight harness for multi-identity integration tests
///
/// Builds an in-process vault system: fault-injectable memory providers behind
/// a [`StorageOrchestrator`](crate::storage::StorageOrchestrator), a
/// [`MemoryLedger`](crate::registry::MemoryLedger) behind a
/// [`Registry`](crate::registry::Registry) driven by a manual clock, and any
/// number of named identities each holding its own
/// [`VaultClient`](crate::client::VaultClient).
///
/// # Example
///
/// ```rust,ignore
/// use common::testkit::TestNetwork;
///
/// #[tokio::test]
/// async fn test_share() -> anyhow::Result<()> {
///     let mut net = TestNetwork::new()?;
///     let alice = net.add_identity("alice").await?;
///     let bob = net.add_identity("bob").await?;
///
///     let record = alice.client().upload("a.txt", b"hi", SecurityLevel::Standard).await?;
///     alice.client().share(&record.file_id, &bob.public(), Permission::Download, None).await?;
///     let plain = bob.client().open_shared(&alice.public(), &record.file_id, None).await?;
///     assert_eq!(plain, b"hi");
///     Ok(())
/// }
/// ```
mod identity;
mod network;

pub use identity::TestIdentity;
pub use network::{TestNetwork, TestNetworkBuilder};
