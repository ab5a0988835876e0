/// Integration tests for the ForestRedis manager holder
///
/// These tests verify:
/// - First load creates and sets up the manager from settings
/// - Later loads reload the same manager and merge configured channels
/// - Shutdown closes the manager
mod common;

use common::*;
use config::FileFormat;
use forestredis_shared::config::Settings;
use forestredis_shared::events::MessageReceived;
use forestredis_shared::plugin::ForestRedis;
use forestredis_shared::redis::ManagerState;
use std::collections::HashSet;

fn settings(yaml: &str) -> Settings {
    Settings::parse(yaml, FileFormat::Yaml).unwrap()
}

#[tokio::test]
async fn test_first_load_sets_up_manager() {
    let (host, mut events) = recording_host();
    let pools = TestPools::new();
    let forest = ForestRedis::with_pool_builder(host, pools.builder());
    assert!(forest.manager().is_none());

    let manager = forest
        .load(&settings("serverIdentifier: Lobby01\nchannels: [chat, staff]\n"))
        .await;

    assert_eq!(manager.state(), ManagerState::Ready);
    assert_eq!(manager.server_identifier(), "Lobby01");
    assert_eq!(manager.active_subscriptions(), 1);
    assert!(forest.manager().is_some());

    wait_until(|| manager.connected_subscriptions() == 1).await;
    manager.publish_message("staff", "online");
    let event = next_event(&mut events).await;
    assert_eq!(event.sender_identifier(), "Lobby01");
    assert!(event.is_self_sender());

    forest.shutdown().await;
}

#[tokio::test]
async fn test_default_identifier() {
    let (host, _events) = recording_host();
    let pools = TestPools::new();
    let forest = ForestRedis::with_pool_builder(host, pools.builder());

    let manager = forest.load(&settings("channels: []\n")).await;
    assert_eq!(manager.server_identifier(), "MySuperServer1");
}

#[tokio::test]
async fn test_second_load_reloads_same_manager() {
    let (host, _events) = recording_host();
    let pools = TestPools::new();
    let forest = ForestRedis::with_pool_builder(host, pools.builder());

    let first = forest
        .load(&settings("serverIdentifier: Lobby01\nchannels: [chat]\n"))
        .await;
    let second = forest
        .load(&settings("serverIdentifier: Lobby02\nchannels: [staff]\n"))
        .await;

    // Both handles refer to the same manager
    assert_eq!(first.server_identifier(), "Lobby02");
    assert_eq!(second.state(), ManagerState::Ready);

    let expected: HashSet<String> = ["chat", "staff"].iter().map(|s| s.to_string()).collect();
    assert_eq!(second.subscribed_channels(), expected);

    let built = pools.built();
    assert_eq!(built.len(), 2);
    assert!(forestredis_shared::redis::ConnectionPool::is_closed(built[0].as_ref()));

    forest.shutdown().await;
    assert_eq!(first.state(), ManagerState::Closed);
}

#[tokio::test]
async fn test_load_without_hostname() {
    let (host, _events) = recording_host();
    let pools = TestPools::new();
    let forest = ForestRedis::with_pool_builder(host, pools.builder());

    let manager = forest
        .load(&settings("redis:\n  hostname: \"\"\nchannels: [chat]\n"))
        .await;

    assert_eq!(manager.state(), ManagerState::Uninitialized);
    assert!(!manager.publish_message("chat", "hello"));
    assert!(pools.built().is_empty());
}

#[tokio::test]
async fn test_shutdown_without_manager() {
    let (host, _events) = recording_host();
    let forest = ForestRedis::with_pool_builder(host, TestPools::new().builder());

    forest.shutdown().await;
    assert!(forest.manager().is_none());
}
