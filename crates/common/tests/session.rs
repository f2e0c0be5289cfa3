//! Integration tests for session key caching through the client

mod common;

use std::time::Duration;

use ::common::client::UploadOptions;
use ::common::config::SessionConfig;
use ::common::crypto::SecurityLevel;
use ::common::error::VaultError;
use ::common::testkit::TestNetwork;

fn unproven() -> UploadOptions {
    UploadOptions {
        skip_proof: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_concurrent_uploads_prompt_once() {
    let mut net = TestNetwork::builder()
        .prompt_delay(Duration::from_millis(50))
        .build()
        .unwrap();
    let alice = net.add_uninitialized("alice").unwrap();

    let uploads: Vec<_> = (0..6)
        .map(|i| {
            let client = alice.client().clone();
            tokio::spawn(async move {
                client
                    .upload_with(&format!("f{i}"), b"data", SecurityLevel::Sensitive, unproven())
                    .await
            })
        })
        .collect();
    // No vault yet: every upload fails at registration, after keys resolved.
    for upload in uploads {
        assert!(matches!(
            upload.await.unwrap(),
            Err(VaultError::NotFound(_))
        ));
    }
    assert_eq!(alice.prompts(), 1);

    alice.client().initialize().await.unwrap();
    alice
        .client()
        .upload_with("f", b"data", SecurityLevel::Maximum, unproven())
        .await
        .unwrap();
    assert_eq!(alice.prompts(), 1);
}

#[tokio::test]
async fn test_disconnected_wallet_after_lock() {
    let (_net, alice, _bob) = common::setup_test_env().await;
    let record = alice
        .client()
        .upload_with("a", b"locked", SecurityLevel::Standard, unproven())
        .await
        .unwrap();

    alice.set_wallet_connected(false);
    // Warm keys keep working while the wallet is away.
    assert_eq!(alice.client().download(&record.file_id).await.unwrap(), b"locked");

    alice.client().lock();
    let err = alice.client().download(&record.file_id).await.unwrap_err();
    assert!(matches!(err, VaultError::KeysUnavailable));

    alice.set_wallet_connected(true);
    assert_eq!(alice.client().download(&record.file_id).await.unwrap(), b"locked");
}

#[tokio::test(start_paused = true)]
async fn test_expired_keys_prompt_again() {
    let mut net = TestNetwork::builder()
        .session(SessionConfig { key_ttl_secs: 60 })
        .build()
        .unwrap();
    let alice = net.add_identity("alice").await.unwrap();
    assert_eq!(alice.prompts(), 1);

    tokio::time::advance(Duration::from_secs(30)).await;
    alice.client().list_files().await.unwrap();
    alice.client().session().keys().await.unwrap();
    assert_eq!(alice.prompts(), 1);

    tokio::time::advance(Duration::from_secs(31)).await;
    alice.client().session().keys().await.unwrap();
    assert_eq!(alice.prompts(), 2);
}

#[tokio::test]
async fn test_same_wallet_reinitializes_idempotently() {
    let (net, alice, _bob) = common::setup_test_env().await;
    alice.client().lock();
    let vault = alice.client().initialize().await.unwrap();
    assert_eq!(vault.owner, alice.public());
    assert_eq!(alice.prompts(), 2);
    assert!(net.registry().vault(&alice.public()).await.unwrap().is_some());
}
