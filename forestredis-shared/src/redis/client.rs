/// Redis-backed connection pool
///
/// This module provides the production [`ConnectionPool`] implementation:
/// - Publishing via a lazily created `redis::aio::ConnectionManager`
///   (multiplexed, reconnects automatically)
/// - A dedicated pub/sub connection per subscription session, split into a
///   sink (unsubscribe from any task) and a message stream
/// - A fixed operation timeout on every network call
///
/// Building a pool never touches the network. The first publish opens the
/// shared connection; every subscription session opens its own.
///
/// # Example
///
/// ```no_run
/// use forestredis_shared::models::RedisConfiguration;
/// use forestredis_shared::redis::ConnectionPool;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RedisConfiguration::new(Some("localhost".to_string()), 6379, None, None, false);
/// let pool = config.build().expect("hostname is set");
///
/// pool.publish("chat", r#"{"senderIdentifier":"S1","message":"hi","timestamp":0}"#).await?;
/// # Ok(())
/// # }
/// ```

use crate::redis::pool::{
    ConnectionPool, PoolError, PubSubSession, RawMessage, SubscriptionControl,
};
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::{ConnectionManager, PubSubSink};
use redis::{AsyncCommands, Client};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;

/// Default timeout applied to every Redis operation
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_millis(2000);

/// Connection pool backed by a Redis server
pub struct RedisPool {
    client: Client,
    publisher: OnceCell<ConnectionManager>,
    timeout: Duration,
    closed: AtomicBool,
    endpoint: String,
}

impl RedisPool {
    /// Creates a pool around an already configured client
    ///
    /// `endpoint` is only used for log lines and must not contain credentials.
    pub fn new(client: Client, endpoint: String, timeout: Duration) -> Self {
        Self {
            client,
            publisher: OnceCell::new(),
            timeout,
            closed: AtomicBool::new(false),
            endpoint,
        }
    }

    fn ensure_open(&self) -> Result<(), PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl ConnectionPool for RedisPool {
    /// Returns the shared publishing connection, connecting on first use
    ///
    /// The connection manager reconnects on its own after connection loss,
    /// so the handle is created once per pool.
    async fn connection(&self) -> Result<ConnectionManager, PoolError> {
        self.ensure_open()?;

        let manager = self
            .publisher
            .get_or_try_init(|| async {
                let manager =
                    with_timeout(self.timeout, ConnectionManager::new(self.client.clone())).await?;

                tracing::info!(endpoint = %self.endpoint, "Redis publish connection established");
                Ok::<_, PoolError>(manager)
            })
            .await?;

        Ok(manager.clone())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), PoolError> {
        let mut conn = self.connection().await?;

        let receivers: i64 = with_timeout(self.timeout, conn.publish(channel, payload)).await?;

        tracing::trace!(channel = %channel, receivers, "Published message");
        Ok(())
    }

    async fn subscribe(&self, channels: &[String]) -> Result<PubSubSession, PoolError> {
        self.ensure_open()?;

        let pubsub = with_timeout(self.timeout, self.client.get_async_pubsub()).await?;
        let (mut sink, stream) = pubsub.split();

        with_timeout(self.timeout, sink.subscribe(channels)).await?;

        let messages = stream
            .filter_map(|msg| {
                let raw = text_message(msg.get_channel_name(), msg.get_payload_bytes());
                futures::future::ready(raw)
            })
            .boxed();

        Ok(PubSubSession {
            control: Box::new(RedisSubscriptionControl {
                sink,
                timeout: self.timeout,
            }),
            messages,
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn destroy(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(endpoint = %self.endpoint, "Redis pool destroyed");
        }
    }

    fn describe(&self) -> String {
        self.endpoint.clone()
    }
}

/// Sink half of a Redis pub/sub connection
struct RedisSubscriptionControl {
    sink: PubSubSink,
    timeout: Duration,
}

#[async_trait]
impl SubscriptionControl for RedisSubscriptionControl {
    async fn unsubscribe(&mut self, channels: &[String]) -> Result<(), PoolError> {
        with_timeout(self.timeout, self.sink.unsubscribe(channels)).await
    }
}

/// Converts a pub/sub payload to text, dropping it when it is not UTF-8
fn text_message(channel: &str, payload: &[u8]) -> Option<RawMessage> {
    match std::str::from_utf8(payload) {
        Ok(text) => Some(RawMessage {
            channel: channel.to_string(),
            payload: text.to_string(),
        }),
        Err(e) => {
            tracing::warn!(
                channel = %channel,
                payload = %String::from_utf8_lossy(payload),
                error = %e,
                "Dropping message with non-text payload"
            );
            None
        }
    }
}

/// Runs a Redis future under the pool's operation timeout
async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, PoolError>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| PoolError::Timeout)?
        .map_err(PoolError::from)
}
