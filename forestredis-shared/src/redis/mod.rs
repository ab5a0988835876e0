/// Redis pub/sub integration
///
/// This module provides cross-node publish/subscribe messaging:
/// - Connection pool abstraction with a Redis and an in-memory backend
/// - Self-healing subscription workers (fixed 5 second reconnect backoff)
/// - The [`RedisManager`] orchestrating pool, channels and workers
///
/// # Architecture
///
/// ```text
/// ┌──────────────┐  PUBLISH chat {envelope}   ┌─────────┐
/// │ RedisManager │ ─────────────────────────> │  Redis  │
/// └──────────────┘                            └─────────┘
///        │ spawns (one per subscribe batch)        │
///        ▼                                          │ SUBSCRIBE chat
/// ┌──────────────┐ <─────────── messages ──────────┘
/// │ Subscription │
/// └──────────────┘
///        │ decoded envelope
///        ▼
///   PluginHost::on_message_received
/// ```
///
/// # Example
///
/// ```no_run
/// use forestredis_shared::events::MessageReceived;
/// use forestredis_shared::models::RedisConfiguration;
/// use forestredis_shared::plugin::TokioHost;
/// use forestredis_shared::redis::RedisManager;
/// use std::sync::Arc;
///
/// # async fn example() {
/// let host = Arc::new(TokioHost::new(|event| {
///     println!("{}: {}", event.channel(), event.message());
/// }));
/// let config = RedisConfiguration::new(Some("localhost".to_string()), 6379, None, None, false);
///
/// let manager = RedisManager::new(host, "Lobby01", Some(config));
/// manager.setup(&["chat"]);
/// manager.publish_message("chat", "hello");
///
/// manager.close().await;
/// # }
/// ```

pub mod client;
pub mod manager;
pub mod memory;
pub mod pool;
pub mod subscription;

use std::sync::{Mutex, MutexGuard, PoisonError};

// Re-export common types for convenience
pub use client::RedisPool;
pub use manager::{ManagerState, PoolBuilder, RedisManager};
pub use memory::{MemoryBroker, MemoryPool};
pub use pool::{ConnectionPool, PoolError, PubSubSession, RawMessage, SubscriptionControl};
pub use subscription::RECONNECT_DELAY;

/// Locks a mutex, recovering the data if a previous holder panicked
///
/// Every critical section in this crate leaves its data consistent, so a
/// poisoned lock carries no broken invariant.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
