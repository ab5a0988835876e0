/// Node main loop
///
/// A [`Node`] owns the node's [`ForestRedis`] holder and the receiving end of
/// the dispatcher. Its main loop handles three inputs:
///
/// ```text
/// Node::run
///   ├─> shutdown token: close the manager and exit
///   ├─> reload signal:  re-read configuration, reload the manager
///   └─> main loop events: log every delivered message
/// ```
///
/// # Example
///
/// ```no_run
/// use forestredis_node::node::Node;
/// use std::path::PathBuf;
///
/// # async fn example() -> anyhow::Result<()> {
/// let node = Node::new(Some(PathBuf::from("config.yml")), Vec::new());
///
/// let shutdown = node.shutdown_token();
/// tokio::spawn(async move {
///     let _ = tokio::signal::ctrl_c().await;
///     shutdown.cancel();
/// });
///
/// node.run().await?;
/// # Ok(())
/// # }
/// ```

use crate::dispatcher::EventDispatcher;
use crate::events::MessageEvent;
use crate::listeners::MessageListener;
use forestredis_shared::config::Settings;
use forestredis_shared::events::MessageReceived;
use forestredis_shared::plugin::ForestRedis;
use forestredis_shared::redis::{PoolBuilder, RedisManager};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

/// A running ForestRedis node
pub struct Node {
    forest: Arc<ForestRedis>,
    config_path: Option<PathBuf>,
    events: mpsc::UnboundedReceiver<MessageEvent>,
    shutdown_token: CancellationToken,
    reload: Arc<Notify>,
}

impl Node {
    /// Creates a node backed by real Redis pools
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config_path: Option<PathBuf>, listeners: Vec<Arc<dyn MessageListener>>) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let dispatcher = EventDispatcher::start(listeners, tx);
        Self::build(ForestRedis::new(dispatcher), config_path, events)
    }

    /// Creates a node whose managers use a custom pool factory
    pub fn with_pool_builder(
        config_path: Option<PathBuf>,
        listeners: Vec<Arc<dyn MessageListener>>,
        pool_builder: PoolBuilder,
    ) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let dispatcher = EventDispatcher::start(listeners, tx);
        Self::build(
            ForestRedis::with_pool_builder(dispatcher, pool_builder),
            config_path,
            events,
        )
    }

    fn build(
        forest: ForestRedis,
        config_path: Option<PathBuf>,
        events: mpsc::UnboundedReceiver<MessageEvent>,
    ) -> Self {
        Self {
            forest: Arc::new(forest),
            config_path,
            events,
            shutdown_token: CancellationToken::new(),
            reload: Arc::new(Notify::new()),
        }
    }

    /// Token that stops the main loop when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Handle that triggers a configuration reload when notified
    pub fn reload_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.reload)
    }

    pub fn forest(&self) -> Arc<ForestRedis> {
        Arc::clone(&self.forest)
    }

    /// Reads the configuration and applies it to the manager
    pub async fn load(&self) -> anyhow::Result<RedisManager> {
        let settings = Settings::load(self.config_path.as_deref())?;

        tracing::info!(
            server_identifier = %settings.server_identifier(),
            endpoint = %settings.redis_configuration(),
            channels = ?settings.channels,
            "Loading ForestRedis configuration"
        );

        Ok(self.forest.load(&settings).await)
    }

    /// Runs the main loop until the shutdown token is cancelled
    ///
    /// # Errors
    ///
    /// Returns error if the initial configuration cannot be read. Reload
    /// failures are logged and the current settings stay in effect.
    pub async fn run(mut self) -> anyhow::Result<()> {
        self.load().await?;
        tracing::info!("Node ready and listening for messages");

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                _ = self.reload.notified() => {
                    tracing::info!("Reloading configuration");
                    if let Err(e) = self.load().await {
                        tracing::error!(error = %e, "Failed to reload configuration, keeping current settings");
                    }
                }
                Some(event) = self.events.recv() => handle_event(&event),
            }
        }

        tracing::info!("Shutdown requested, closing Redis manager");
        self.forest.shutdown().await;
        tracing::info!("Node shut down");

        Ok(())
    }
}

fn handle_event(event: &MessageEvent) {
    tracing::info!(
        channel = %event.channel(),
        sender = %event.sender_identifier(),
        self_sender = event.is_self_sender(),
        timestamp = event.timestamp(),
        text = %event.message(),
        "Received message"
    );
}
