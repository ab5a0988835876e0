/// Integration tests against a live Redis server
///
/// Run with a local Redis on 127.0.0.1:6379:
/// `cargo test -p forestredis-shared --test redis_live_tests -- --ignored`
mod common;

use common::*;
use forestredis_shared::events::MessageReceived;
use forestredis_shared::models::RedisConfiguration;
use forestredis_shared::redis::RedisManager;
use std::time::Duration;

fn live_config() -> RedisConfiguration {
    RedisConfiguration::new(Some("127.0.0.1".to_string()), 6379, None, None, false)
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_cross_node_delivery() {
    let (host1, mut events1) = recording_host();
    let (host2, mut events2) = recording_host();
    let s1 = RedisManager::new(host1, "S1", Some(live_config()));
    let s2 = RedisManager::new(host2, "S2", Some(live_config()));

    assert!(s1.setup(&["forestredis-test-chat"]));
    assert!(s2.setup(&["forestredis-test-chat"]));
    wait_until(|| s1.connected_subscriptions() == 1 && s2.connected_subscriptions() == 1).await;
    // SUBSCRIBE is acknowledged before the session reports connected, but give
    // the server a moment anyway
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(s1.publish_message("forestredis-test-chat", "hello"));

    let own = next_event(&mut events1).await;
    assert!(own.is_self_sender());
    let other = next_event(&mut events2).await;
    assert_eq!(other.sender_identifier(), "S1");
    assert!(!other.is_self_sender());

    s1.close().await;
    s2.close().await;
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_unsubscribe_and_reload() {
    let (host, mut events) = recording_host();
    let manager = RedisManager::new(host, "S1", Some(live_config()));

    assert!(manager.setup(&["forestredis-test-a", "forestredis-test-b"]));
    wait_until(|| manager.connected_subscriptions() == 1).await;

    manager.unsubscribe(&["forestredis-test-a"]).await;
    assert!(!manager.is_subscribed("forestredis-test-a"));

    assert!(manager.reload(Some("S2".to_string()), None, true).await);
    wait_until(|| manager.connected_subscriptions() == 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    manager.publish_message("forestredis-test-b", "after reload");
    let event = next_event(&mut events).await;
    assert_eq!(event.sender_identifier(), "S2");

    manager.close().await;
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_manager_connection_runs_commands() {
    use redis::AsyncCommands;

    let (host, _events) = recording_host();
    let manager = RedisManager::new(host, "S1", Some(live_config()));
    assert!(manager.setup::<&str>(&[]));

    let mut conn = manager.connection().await.unwrap();
    let _: () = conn.set("forestredis-test-key", "value").await.unwrap();
    let value: String = conn.get("forestredis-test-key").await.unwrap();
    assert_eq!(value, "value");
    let _: () = conn.del("forestredis-test-key").await.unwrap();

    manager.close().await;
    assert!(manager.connection().await.is_err());
}
