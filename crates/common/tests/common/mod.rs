//! Shared test utilities for vault integration tests
#![allow(dead_code)]

use common::testkit::{TestIdentity, TestNetwork};
use tracing_subscriber::EnvFilter;

/// Route library logs through the test harness; set `RUST_LOG` to see them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Set up a network of three providers with two initialized identities
pub async fn setup_test_env() -> (TestNetwork, TestIdentity, TestIdentity) {
    setup_with(TestNetwork::new().unwrap()).await
}

/// Add `alice` and `bob` to an already configured network
pub async fn setup_with(mut net: TestNetwork) -> (TestNetwork, TestIdentity, TestIdentity) {
    init_tracing();
    let alice = net.add_identity("alice").await.unwrap();
    let bob = net.add_identity("bob").await.unwrap();
    (net, alice, bob)
}

/// Deterministic, non-repeating test payload
pub fn payload(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u32).wrapping_mul(2_654_435_761).to_le_bytes()[1])
        .collect()
}
