//! Integration tests for provider failover and storage unavailability

mod common;

use std::time::Duration;

use ::common::client::UploadOptions;
use ::common::crypto::SecurityLevel;
use ::common::error::{FailureClass, VaultError};
use ::common::storage::ProviderState;

fn replicate_everywhere() -> UploadOptions {
    UploadOptions {
        redundancy: Some(3),
        ..Default::default()
    }
}

fn single_replica() -> UploadOptions {
    UploadOptions {
        redundancy: Some(1),
        skip_proof: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_download_survives_two_of_three_providers_down() {
    let (net, alice, _bob) = common::setup_test_env().await;
    let data = common::payload(64 * 1024);
    let record = alice
        .client()
        .upload_with("photo.jpg", &data, SecurityLevel::Sensitive, replicate_everywhere())
        .await
        .unwrap();
    assert_eq!(record.provider_count, 3);

    net.provider(0).set_offline(true);
    net.provider(1).set_offline(true);

    let downloaded = alice.client().download(&record.file_id).await.unwrap();
    assert_eq!(downloaded, data);
    assert!(net.provider(2).get_count() > 0);
}

#[tokio::test]
async fn test_health_check_marks_offline_providers() {
    let (net, _alice, _bob) = common::setup_test_env().await;
    net.provider(1).set_offline(true);
    for _ in 0..net.storage().config().unavailable_after {
        net.storage().check_health().await;
    }
    assert_eq!(net.storage().state_of("mem-1"), Some(ProviderState::Unavailable));
    assert_eq!(net.storage().state_of("mem-0"), Some(ProviderState::Healthy));

    net.provider(1).set_offline(false);
    net.storage().check_health().await;
    assert_eq!(net.storage().state_of("mem-1"), Some(ProviderState::Healthy));
}

#[tokio::test]
async fn test_all_replicas_down_is_retryable() {
    let (net, alice, _bob) = common::setup_test_env().await;
    let record = alice
        .client()
        .upload("a.bin", &common::payload(2048), SecurityLevel::Standard)
        .await
        .unwrap();

    for provider in net.providers() {
        provider.set_offline(true);
    }
    let err = alice.client().download(&record.file_id).await.unwrap_err();
    assert!(matches!(err, VaultError::StorageUnavailable(_)));
    assert_eq!(err.class(), FailureClass::Unreachable);
    assert!(err.is_retryable());

    for provider in net.providers() {
        provider.set_offline(false);
    }
    assert_eq!(
        alice.client().download(&record.file_id).await.unwrap(),
        common::payload(2048)
    );
}

#[tokio::test]
async fn test_failed_write_registers_nothing() {
    let (net, alice, _bob) = common::setup_test_env().await;
    net.provider(0).set_offline(true);
    net.provider(1).set_offline(true);

    // Redundancy 2 cannot be met by a single provider.
    let err = alice
        .client()
        .upload("a.bin", &common::payload(4096), SecurityLevel::Standard)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::StorageUnavailable(_)));
    assert!(alice.client().list_files().await.unwrap().is_empty());
    let vault = net.registry().vault(&alice.public()).await.unwrap().unwrap();
    assert_eq!(vault.file_count, 0);
}

#[tokio::test]
async fn test_registry_outage_is_retryable() {
    let (net, alice, _bob) = common::setup_test_env().await;
    net.ledger().set_offline(true);
    let err = alice
        .client()
        .upload("a.bin", &common::payload(1024), SecurityLevel::Standard)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::RegistryUnavailable(_)));
    assert!(err.is_retryable());

    net.ledger().set_offline(false);
    let record = alice
        .client()
        .upload("a.bin", &common::payload(1024), SecurityLevel::Standard)
        .await
        .unwrap();
    assert_eq!(
        alice.client().download(&record.file_id).await.unwrap(),
        common::payload(1024)
    );
}

#[tokio::test(start_paused = true)]
async fn test_single_replica_write_survives_two_providers_down() {
    let (net, alice, _bob) = common::setup_test_env().await;
    net.provider(0).set_offline(true);
    net.provider(1).set_offline(true);

    let data = common::payload(8 * 1024);
    let record = alice
        .client()
        .upload_with("a.bin", &data, SecurityLevel::Standard, single_replica())
        .await
        .unwrap();
    assert_eq!(record.provider_count, 1);
    assert!(net.provider(2).object_count() > 0);
    assert_eq!(net.provider(0).object_count(), 0);
    assert_eq!(alice.client().download(&record.file_id).await.unwrap(), data);
}

#[tokio::test(start_paused = true)]
async fn test_write_with_every_provider_down_gives_up_after_bounded_rounds() {
    let (net, alice, _bob) = common::setup_test_env().await;
    for provider in net.providers() {
        provider.set_offline(true);
    }

    let started = tokio::time::Instant::now();
    let err = alice
        .client()
        .upload_with("a.bin", &common::payload(1024), SecurityLevel::Standard, single_replica())
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, VaultError::StorageUnavailable(_)));
    assert_eq!(err.class(), FailureClass::Unreachable);
    assert!(err.is_retryable());
    // One backoff before each retry round, and nothing more.
    let config = net.storage().config();
    let backoff: Duration = (0..config.retry_rounds).map(|r| config.retry_backoff(r)).sum();
    assert!(elapsed >= backoff);
    assert!(elapsed < backoff + config.call_timeout());
    assert!(alice.client().list_files().await.unwrap().is_empty());
}

