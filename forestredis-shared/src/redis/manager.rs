/// Redis manager: pool, channel set and subscription workers
///
/// The manager is the single entry point for publishing and subscribing.
/// Its lifecycle:
///
/// ```text
/// Uninitialized ──setup()──> Ready ──close()──> Closing ──> Closed
///       ▲   │ (pool build fails: stays, every call fails)      │
///       │   └───────────────────────────────────────────────────┤
///       └────────────────────── reload() ──── setup() ◄─────────┘
/// ```
///
/// Subscribing is asynchronous: `setup` and `subscribe` only report whether a
/// worker was scheduled, never whether Redis accepted the subscription.
/// Publishing is fire-and-forget: the send runs on the host scheduler and its
/// failure is only logged.
///
/// # Example
///
/// ```no_run
/// use forestredis_shared::models::RedisConfiguration;
/// use forestredis_shared::plugin::TokioHost;
/// use forestredis_shared::redis::RedisManager;
/// use std::sync::Arc;
///
/// # async fn example() {
/// let host = Arc::new(TokioHost::new(|_event| {}));
/// let config = RedisConfiguration::new(Some("localhost".to_string()), 6379, None, None, false);
/// let manager = RedisManager::new(host, "Survival02", Some(config));
///
/// if manager.setup(&["chat", "staff"]) {
///     manager.publish_message("chat", "Survival02 is online");
///     manager.unsubscribe(&["staff"]).await;
/// }
///
/// manager.reload(Some("Survival03".to_string()), None, true).await;
/// manager.close().await;
/// # }
/// ```

use crate::events::RedisMessageReceivedEvent;
use crate::models::{current_timestamp, MessageTransferObject, RedisConfiguration};
use crate::plugin::PluginHost;
use crate::redis::lock_unpoisoned;
use crate::redis::pool::{ConnectionPool, PoolError};
use crate::redis::subscription::Subscription;
use redis::aio::ConnectionManager;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Factory turning a configuration into a pool; `None` means "cannot build"
pub type PoolBuilder =
    Arc<dyn Fn(&RedisConfiguration) -> Option<Arc<dyn ConnectionPool>> + Send + Sync>;

/// Lifecycle state of a [`RedisManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// No pool yet, or the last setup failed
    Uninitialized,
    /// Pool established, operations allowed
    Ready,
    /// Close in progress
    Closing,
    /// Pool destroyed, workers stopped
    Closed,
}

/// Publish/subscribe manager for one node
///
/// Cloning is cheap and every clone refers to the same manager.
#[derive(Clone)]
pub struct RedisManager {
    shared: Arc<Shared>,
}

/// State shared between the manager handles and its workers
pub(crate) struct Shared {
    host: Arc<dyn PluginHost>,
    pool_builder: PoolBuilder,
    state: Mutex<State>,
    /// Serializes `unsubscribe`, `close` and `reload` across their awaits
    ops: tokio::sync::Mutex<()>,
}

struct State {
    lifecycle: ManagerState,
    server_identifier: String,
    configuration: Option<RedisConfiguration>,
    pool: Option<Arc<dyn ConnectionPool>>,
    channels: HashSet<String>,
    subscriptions: Vec<Arc<Subscription>>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        lock_unpoisoned(&self.state)
    }

    pub(crate) fn is_closing(&self) -> bool {
        matches!(
            self.state().lifecycle,
            ManagerState::Closing | ManagerState::Closed
        )
    }

    /// Decodes a raw message and hands it to the host
    pub(crate) fn handle_message(&self, channel: &str, payload: &str) {
        let message = match MessageTransferObject::from_json(payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    channel = %channel,
                    payload = %payload,
                    error = %e,
                    "Cannot decode message object sent to channel"
                );
                return;
            }
        };

        let local_identifier = self.state().server_identifier.clone();
        let event = RedisMessageReceivedEvent::new(channel, message, &local_identifier);
        self.host.on_message_received(event);
    }

    fn spawn_subscription(self: &Arc<Self>, pool: Arc<dyn ConnectionPool>, subscription: Arc<Subscription>) {
        tracing::debug!(channels = ?subscription.channels(), "Starting subscription worker");
        self.host
            .run_async(Box::pin(subscription.run(Arc::clone(self), pool)));
    }
}

impl RedisManager {
    /// Creates a manager backed by real Redis pools
    ///
    /// Nothing is connected until [`RedisManager::setup`] is called.
    pub fn new(
        host: Arc<dyn PluginHost>,
        server_identifier: impl Into<String>,
        configuration: Option<RedisConfiguration>,
    ) -> Self {
        let builder: PoolBuilder = Arc::new(|configuration: &RedisConfiguration| {
            configuration
                .build()
                .map(|pool| Arc::new(pool) as Arc<dyn ConnectionPool>)
        });
        Self::with_pool_builder(host, server_identifier, configuration, builder)
    }

    /// Creates a manager with a custom pool factory
    pub fn with_pool_builder(
        host: Arc<dyn PluginHost>,
        server_identifier: impl Into<String>,
        configuration: Option<RedisConfiguration>,
        pool_builder: PoolBuilder,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                host,
                pool_builder,
                state: Mutex::new(State {
                    lifecycle: ManagerState::Uninitialized,
                    server_identifier: server_identifier.into(),
                    configuration,
                    pool: None,
                    channels: HashSet::new(),
                    subscriptions: Vec::new(),
                }),
                ops: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Builds the pool and optionally subscribes to an initial channel set
    ///
    /// Allowed from `Uninitialized` and `Closed`. Returns `false` when the
    /// configuration is missing or the pool cannot be built; the manager then
    /// stays non-functional. With channels, exactly one worker covering all
    /// of them is started.
    pub fn setup<S: AsRef<str>>(&self, channels: &[S]) -> bool {
        let (pool, subscription) = {
            let mut state = self.shared.state();

            match state.lifecycle {
                ManagerState::Uninitialized | ManagerState::Closed => {}
                ManagerState::Ready => {
                    tracing::warn!("Redis manager is already set up");
                    return false;
                }
                ManagerState::Closing => return false,
            }

            let Some(configuration) = state.configuration.clone() else {
                tracing::warn!("Cannot establish Redis pool, configuration must not be empty");
                return false;
            };

            let Some(pool) = (self.shared.pool_builder)(&configuration) else {
                tracing::warn!(
                    endpoint = %configuration,
                    "Cannot establish Redis pool from the provided configuration"
                );
                return false;
            };

            tracing::info!(
                server_identifier = %state.server_identifier,
                endpoint = %pool.describe(),
                "Redis pool established"
            );

            state.pool = Some(Arc::clone(&pool));
            state.lifecycle = ManagerState::Ready;

            let channels = dedupe(channels, &HashSet::new());
            if channels.is_empty() {
                return true;
            }

            state.channels.extend(channels.iter().cloned());
            let subscription = Subscription::new(channels);
            state.subscriptions.push(Arc::clone(&subscription));
            (pool, subscription)
        };

        self.shared.spawn_subscription(pool, subscription);
        true
    }

    /// Subscribes to channels not yet subscribed
    ///
    /// Returns `true` iff at least one new channel was added, in which case a
    /// new worker covering exactly the new channels is started.
    pub fn subscribe<S: AsRef<str>>(&self, channels: &[S]) -> bool {
        if channels.is_empty() {
            return false;
        }

        let (pool, subscription) = {
            let mut state = self.shared.state();

            match state.lifecycle {
                ManagerState::Ready => {}
                ManagerState::Uninitialized => {
                    tracing::warn!("Cannot subscribe, Redis pool is not established");
                    return false;
                }
                ManagerState::Closing | ManagerState::Closed => return false,
            }

            let Some(pool) = state.pool.clone() else {
                tracing::warn!("Cannot subscribe, Redis pool is not established");
                return false;
            };

            let channels = dedupe(channels, &state.channels);
            if channels.is_empty() {
                return false;
            }

            state.subscriptions.retain(|subscription| !subscription.is_finished());
            state.channels.extend(channels.iter().cloned());

            let subscription = Subscription::new(channels);
            state.subscriptions.push(Arc::clone(&subscription));
            (pool, subscription)
        };

        self.shared.spawn_subscription(pool, subscription);
        true
    }

    /// Unsubscribes channels
    ///
    /// The request is broadcast to every active worker, whether or not it
    /// covers the channels. If any worker fails the call is aborted and the
    /// channel set is left unchanged. A channel subscribed again by a worker
    /// started while the request was in flight stays in the set.
    pub async fn unsubscribe<S: AsRef<str>>(&self, channels: &[S]) {
        if channels.is_empty() {
            return;
        }

        let channels: Vec<String> = channels.iter().map(|c| c.as_ref().to_string()).collect();
        let _ops = self.shared.ops.lock().await;

        let subscriptions = {
            let state = self.shared.state();
            if matches!(state.lifecycle, ManagerState::Closing | ManagerState::Closed) {
                return;
            }
            state.subscriptions.clone()
        };

        for subscription in &subscriptions {
            if let Err(e) = subscription.unsubscribe(&channels).await {
                tracing::warn!(
                    channels = ?channels,
                    error = %e,
                    "Error while unsubscribing from channels"
                );
                return;
            }
        }

        {
            let mut state = self.shared.state();
            let resubscribed: HashSet<String> = state
                .subscriptions
                .iter()
                .filter(|current| {
                    !current.is_finished()
                        && !subscriptions.iter().any(|told| Arc::ptr_eq(told, *current))
                })
                .flat_map(|current| current.channels().iter().cloned())
                .collect();

            for channel in channels.iter().filter(|c| !resubscribed.contains(*c)) {
                state.channels.remove(channel);
            }
        }

        tracing::info!(channels = ?channels, "Unsubscribed from channels");
    }

    /// Publishes a text message to a channel
    ///
    /// Returns `true` once the publish is scheduled; delivery failures are
    /// logged by the background task only.
    pub fn publish_message(&self, channel: &str, message: &str) -> bool {
        if self.shared.is_closing() {
            return false;
        }

        let envelope = MessageTransferObject::new(self.server_identifier(), message, current_timestamp());
        self.execute_publish(channel, envelope)
    }

    /// Publishes the JSON form of `object` to a channel
    pub fn publish_object<T: Serialize + ?Sized>(&self, channel: &str, object: &T) -> bool {
        if self.shared.is_closing() {
            return false;
        }

        match MessageTransferObject::wrap(self.server_identifier(), object, current_timestamp()) {
            Ok(envelope) => self.execute_publish(channel, envelope),
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "Cannot serialize object to publish");
                false
            }
        }
    }

    fn execute_publish(&self, channel: &str, envelope: MessageTransferObject) -> bool {
        let pool = {
            let state = self.shared.state();
            if matches!(state.lifecycle, ManagerState::Closing | ManagerState::Closed) {
                return false;
            }
            match &state.pool {
                Some(pool) => Arc::clone(pool),
                None => {
                    tracing::warn!(channel = %channel, "Cannot publish, Redis pool is not established");
                    return false;
                }
            }
        };

        let payload = match envelope.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "Cannot serialize message envelope");
                return false;
            }
        };

        let channel = channel.to_string();
        self.shared.host.run_async(Box::pin(async move {
            if let Err(e) = pool.publish(&channel, &payload).await {
                tracing::warn!(
                    channel = %channel,
                    error = %e,
                    "Could not send message to Redis server"
                );
            }
        }));

        true
    }

    /// Connection from the current pool for arbitrary Redis commands
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] unless the manager is `Ready`, and
    /// [`PoolError::Unsupported`] when the pool has no Redis server behind it.
    pub async fn connection(&self) -> Result<ConnectionManager, PoolError> {
        let pool = {
            let state = self.shared.state();
            match (&state.lifecycle, &state.pool) {
                (ManagerState::Ready, Some(pool)) => Arc::clone(pool),
                _ => return Err(PoolError::Closed),
            }
        };

        pool.connection().await
    }

    /// Stops every worker and destroys the pool
    ///
    /// Idempotent: a call during a close waits for it, then returns at once.
    pub async fn close(&self) {
        let _ops = self.shared.ops.lock().await;
        self.close_locked().await;
    }

    async fn close_locked(&self) {
        let (subscriptions, pool) = {
            let mut state = self.shared.state();
            if matches!(state.lifecycle, ManagerState::Closing | ManagerState::Closed) {
                return;
            }
            state.lifecycle = ManagerState::Closing;
            (std::mem::take(&mut state.subscriptions), state.pool.clone())
        };

        for subscription in &subscriptions {
            subscription.stop().await;
        }

        if let Some(pool) = pool {
            pool.destroy();
        }

        {
            let mut state = self.shared.state();
            state.pool = None;
            state.channels.clear();
            state.lifecycle = ManagerState::Closed;
        }

        tracing::info!("Redis manager closed");
    }

    /// Closes the manager and sets it up again
    ///
    /// `server_identifier` and `configuration` replace the current values
    /// when given. With `keep_channels` the channels held before the reload
    /// are subscribed again by a single new worker; otherwise the manager
    /// restarts with no channels. Returns the result of the new setup.
    pub async fn reload(
        &self,
        server_identifier: Option<String>,
        configuration: Option<RedisConfiguration>,
        keep_channels: bool,
    ) -> bool {
        let _ops = self.shared.ops.lock().await;

        let mut previous: Vec<String> = self.subscribed_channels().into_iter().collect();
        previous.sort();

        self.close_locked().await;

        {
            let mut state = self.shared.state();
            if let Some(server_identifier) = server_identifier {
                state.server_identifier = server_identifier;
            }
            if let Some(configuration) = configuration {
                state.configuration = Some(configuration);
            }
        }

        if keep_channels {
            self.setup(&previous)
        } else {
            self.setup::<&str>(&[])
        }
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.shared.state().channels.contains(channel)
    }

    /// Snapshot of the subscribed channel set
    pub fn subscribed_channels(&self) -> HashSet<String> {
        self.shared.state().channels.clone()
    }

    pub fn server_identifier(&self) -> String {
        self.shared.state().server_identifier.clone()
    }

    pub fn configuration(&self) -> Option<RedisConfiguration> {
        self.shared.state().configuration.clone()
    }

    pub fn state(&self) -> ManagerState {
        self.shared.state().lifecycle
    }

    /// Whether the envelope was published under this node's identifier
    pub fn is_self_sender(&self, message: &MessageTransferObject) -> bool {
        message.sender_identifier() == self.shared.state().server_identifier
    }

    /// Number of workers that have not exited yet
    pub fn active_subscriptions(&self) -> usize {
        self.shared
            .state()
            .subscriptions
            .iter()
            .filter(|subscription| !subscription.is_finished())
            .count()
    }

    /// Number of workers with a live pub/sub session
    pub fn connected_subscriptions(&self) -> usize {
        self.shared
            .state()
            .subscriptions
            .iter()
            .filter(|subscription| subscription.is_subscribed())
            .count()
    }
}

/// Unique channel names from `channels` that are not in `existing`, in order
fn dedupe<S: AsRef<str>>(channels: &[S], existing: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    channels
        .iter()
        .map(|channel| channel.as_ref())
        .filter(|channel| !existing.contains(*channel) && seen.insert(*channel))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_filters_existing_and_duplicates() {
        let existing: HashSet<String> = ["a".to_string()].into_iter().collect();
        let result = dedupe(&["a", "b", "c", "b"], &existing);
        assert_eq!(result, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_dedupe_is_case_sensitive() {
        let existing: HashSet<String> = ["Chat".to_string()].into_iter().collect();
        let result = dedupe(&["chat", "Chat"], &existing);
        assert_eq!(result, vec!["chat".to_string()]);
    }
}
