/// Connection pool contract
///
/// The manager never talks to Redis directly. Everything it needs from the
/// backend goes through [`ConnectionPool`]:
///
/// - fire a `PUBLISH`
/// - hand out a connection for arbitrary commands
/// - open a dedicated pub/sub session for a set of channels
/// - report and change the open/closed state of the pool
///
/// A pub/sub session is split into a [`SubscriptionControl`] half (used by the
/// manager to unsubscribe channels from another task) and a message stream
/// (consumed by the subscription worker).
///
/// Two implementations ship with the crate:
/// - [`RedisPool`](crate::redis::client::RedisPool) backed by a live Redis server
/// - [`MemoryPool`](crate::redis::memory::MemoryPool), an in-process broker
///   used for tests and local demos

use async_trait::async_trait;
use futures::stream::BoxStream;
use redis::aio::ConnectionManager;
use thiserror::Error;

/// Pool errors
#[derive(Error, Debug)]
pub enum PoolError {
    /// The pool has been destroyed
    #[error("Connection pool is closed")]
    Closed,

    /// Connection could not be established or was lost
    #[error("Redis connection error: {0}")]
    Connection(String),

    /// Command execution error
    #[error("Redis command error: {0}")]
    Command(String),

    /// Operation exceeded the pool's operation timeout
    #[error("Redis operation timed out")]
    Timeout,

    /// The backend has no direct Redis connection to hand out
    #[error("Direct Redis connections are not supported by {0}")]
    Unsupported(String),
}

impl From<redis::RedisError> for PoolError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            PoolError::Connection(err.to_string())
        } else if err.is_timeout() {
            PoolError::Timeout
        } else {
            PoolError::Command(err.to_string())
        }
    }
}

/// A message received on a subscribed channel, before envelope decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Channel the message was published to
    pub channel: String,

    /// Raw payload text
    pub payload: String,
}

/// Stream of messages for one pub/sub session
///
/// The stream ends when the underlying connection is lost.
pub type MessageStream = BoxStream<'static, RawMessage>;

/// Control half of a pub/sub session
#[async_trait]
pub trait SubscriptionControl: Send {
    /// Unsubscribes the given channels from the live session
    ///
    /// An empty slice unsubscribes every channel, matching Redis'
    /// argument-less `UNSUBSCRIBE`.
    async fn unsubscribe(&mut self, channels: &[String]) -> Result<(), PoolError>;
}

/// A live pub/sub session: control half plus the message stream
pub struct PubSubSession {
    pub control: Box<dyn SubscriptionControl>,
    pub messages: MessageStream,
}

/// Pooled access to the pub/sub backend
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Publishes a payload to a channel
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), PoolError>;

    /// Returns a connection for running arbitrary Redis commands
    ///
    /// Backends without a Redis server behind them keep the default, which
    /// fails with [`PoolError::Unsupported`].
    async fn connection(&self) -> Result<ConnectionManager, PoolError> {
        Err(PoolError::Unsupported(self.describe()))
    }

    /// Opens a dedicated pub/sub session subscribed to `channels`
    async fn subscribe(&self, channels: &[String]) -> Result<PubSubSession, PoolError>;

    /// Whether the pool has been destroyed
    fn is_closed(&self) -> bool;

    /// Destroys the pool. Later operations fail with [`PoolError::Closed`].
    fn destroy(&self);

    /// Human readable description of the backend for log lines
    fn describe(&self) -> String;
}
