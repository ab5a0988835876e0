/// Host integration
///
/// The hosting process plugs into the manager through [`PluginHost`]: it
/// supplies the task scheduler and receives decoded messages. How a host
/// dispatches a received message (inline, queued to a main loop, as a
/// cancellable pre-event) is up to the host.
///
/// [`ForestRedis`] is the host-owned holder of the node's single manager. It
/// replaces a process-wide static accessor with explicit init, reload and
/// teardown.
///
/// # Example
///
/// ```no_run
/// use forestredis_shared::config::Settings;
/// use forestredis_shared::plugin::{ForestRedis, TokioHost};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let host = Arc::new(TokioHost::new(|event| tracing::info!(?event, "received")));
/// let forest = ForestRedis::new(host);
///
/// let settings = Settings::load(None)?;
/// let manager = forest.load(&settings).await;
/// manager.publish_message("chat", "hello");
///
/// forest.shutdown().await;
/// # Ok(())
/// # }
/// ```

use crate::config::Settings;
use crate::events::RedisMessageReceivedEvent;
use crate::redis::lock_unpoisoned;
use crate::redis::manager::{PoolBuilder, RedisManager};
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};

/// Services the hosting process provides to the manager
pub trait PluginHost: Send + Sync + 'static {
    /// Runs `task` on a background execution context
    ///
    /// Subscription workers run here for their whole lifetime, so the task
    /// must never be driven on the host's main thread.
    fn run_async(&self, task: BoxFuture<'static, ()>) {
        tokio::spawn(task);
    }

    /// Called once per successfully decoded message
    ///
    /// Runs on the subscription worker's task; messages of one worker are
    /// delivered in order.
    fn on_message_received(&self, event: RedisMessageReceivedEvent);
}

/// Host running tasks on the ambient tokio runtime and handing events to a
/// closure
pub struct TokioHost<F> {
    handler: F,
}

impl<F> TokioHost<F>
where
    F: Fn(RedisMessageReceivedEvent) + Send + Sync + 'static,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> PluginHost for TokioHost<F>
where
    F: Fn(RedisMessageReceivedEvent) + Send + Sync + 'static,
{
    fn on_message_received(&self, event: RedisMessageReceivedEvent) {
        (self.handler)(event);
    }
}

/// Holder of the node's manager
pub struct ForestRedis {
    host: Arc<dyn PluginHost>,
    pool_builder: Option<PoolBuilder>,
    manager: Mutex<Option<RedisManager>>,
}

impl ForestRedis {
    pub fn new(host: Arc<dyn PluginHost>) -> Self {
        Self {
            host,
            pool_builder: None,
            manager: Mutex::new(None),
        }
    }

    /// Creates a holder whose managers use a custom pool factory
    pub fn with_pool_builder(host: Arc<dyn PluginHost>, pool_builder: PoolBuilder) -> Self {
        Self {
            host,
            pool_builder: Some(pool_builder),
            manager: Mutex::new(None),
        }
    }

    /// The current manager, if one was loaded
    pub fn manager(&self) -> Option<RedisManager> {
        lock_unpoisoned(&self.manager).clone()
    }

    /// Applies `settings`, creating the manager on first use
    ///
    /// The first load creates the manager and sets it up with the configured
    /// channels. Later loads reload the existing manager under the new
    /// identifier and configuration, keep its channels, then subscribe any
    /// newly configured channels.
    pub async fn load(&self, settings: &Settings) -> RedisManager {
        if settings.server_identifier.is_none() {
            tracing::info!(
                server_identifier = %settings.server_identifier(),
                "No 'serverIdentifier' configured, using the default"
            );
        }

        let server_identifier = settings.server_identifier().to_string();
        let configuration = settings.redis_configuration();

        if let Some(manager) = self.manager() {
            manager
                .reload(Some(server_identifier), Some(configuration), true)
                .await;
            if !settings.channels.is_empty() {
                manager.subscribe(&settings.channels);
            }
            return manager;
        }

        let manager = match &self.pool_builder {
            Some(builder) => RedisManager::with_pool_builder(
                Arc::clone(&self.host),
                server_identifier,
                Some(configuration),
                Arc::clone(builder),
            ),
            None => RedisManager::new(Arc::clone(&self.host), server_identifier, Some(configuration)),
        };
        manager.setup(&settings.channels);

        *lock_unpoisoned(&self.manager) = Some(manager.clone());
        manager
    }

    /// Closes the current manager, if any
    pub async fn shutdown(&self) {
        if let Some(manager) = self.manager() {
            manager.close().await;
        }
    }
}
