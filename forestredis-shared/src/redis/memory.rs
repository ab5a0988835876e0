/// In-process pub/sub broker for testing and demos
///
/// [`MemoryBroker`] plays the role of a Redis server: every [`MemoryPool`]
/// created from the same broker sees the messages published by the others.
/// The broker also exposes fault injection so the reconnect behaviour of
/// subscription workers can be exercised without a live server:
///
/// - [`MemoryBroker::fail_next_subscribes`]: refuse the next N session opens
/// - [`MemoryBroker::disconnect_all`]: end every live session's stream
/// - [`MemoryBroker::set_fail_publishes`] / [`MemoryBroker::set_fail_unsubscribes`]
/// - [`MemoryBroker::set_unsubscribe_delay`]: make unsubscribe requests slow
///
/// # Example
///
/// ```
/// use forestredis_shared::redis::memory::MemoryBroker;
/// use forestredis_shared::redis::ConnectionPool;
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let broker = MemoryBroker::new();
/// let pool = broker.pool();
///
/// let mut session = pool.subscribe(&["chat".to_string()]).await?;
/// pool.publish("chat", "hello").await?;
///
/// let msg = session.messages.next().await.unwrap();
/// assert_eq!(msg.payload, "hello");
/// # Ok(())
/// # }
/// # tokio::runtime::Runtime::new().unwrap().block_on(example()).unwrap();
/// ```

use crate::redis::lock_unpoisoned;
use crate::redis::pool::{
    ConnectionPool, PoolError, PubSubSession, RawMessage, SubscriptionControl,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const BROKER_CAPACITY: usize = 1024;

/// Shared in-memory pub/sub bus
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    sender: broadcast::Sender<RawMessage>,
    connection: Mutex<CancellationToken>,
    failing_subscribes: AtomicUsize,
    subscribe_attempts: AtomicUsize,
    fail_publishes: AtomicBool,
    fail_unsubscribes: AtomicBool,
    unsubscribe_delay_ms: AtomicU64,
    published: Mutex<Vec<RawMessage>>,
    unsubscribes: Mutex<Vec<Vec<String>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROKER_CAPACITY);

        Self {
            inner: Arc::new(BrokerInner {
                sender,
                connection: Mutex::new(CancellationToken::new()),
                failing_subscribes: AtomicUsize::new(0),
                subscribe_attempts: AtomicUsize::new(0),
                fail_publishes: AtomicBool::new(false),
                fail_unsubscribes: AtomicBool::new(false),
                unsubscribe_delay_ms: AtomicU64::new(0),
                published: Mutex::new(Vec::new()),
                unsubscribes: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Creates a new, open pool connected to this broker
    pub fn pool(&self) -> MemoryPool {
        MemoryPool {
            broker: self.clone(),
            closed: AtomicBool::new(false),
        }
    }

    /// Makes the next `count` session opens fail with a connection error
    pub fn fail_next_subscribes(&self, count: usize) {
        self.inner.failing_subscribes.store(count, Ordering::SeqCst);
    }

    /// Ends the message stream of every live session, as a dropped
    /// connection would
    pub fn disconnect_all(&self) {
        let mut connection = lock_unpoisoned(&self.inner.connection);
        connection.cancel();
        *connection = CancellationToken::new();
    }

    pub fn set_fail_publishes(&self, fail: bool) {
        self.inner.fail_publishes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_unsubscribes(&self, fail: bool) {
        self.inner.fail_unsubscribes.store(fail, Ordering::SeqCst);
    }

    /// Delays every unsubscribe request by `delay`, as a slow server would
    pub fn set_unsubscribe_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.inner.unsubscribe_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of session opens attempted so far, failed ones included
    pub fn subscribe_attempts(&self) -> usize {
        self.inner.subscribe_attempts.load(Ordering::SeqCst)
    }

    /// Every message successfully published so far
    pub fn published(&self) -> Vec<RawMessage> {
        lock_unpoisoned(&self.inner.published).clone()
    }

    /// Every successful unsubscribe request, in order; an empty entry means
    /// "all channels"
    pub fn unsubscribes(&self) -> Vec<Vec<String>> {
        lock_unpoisoned(&self.inner.unsubscribes).clone()
    }

    /// Delivers a raw payload as if another node had published it
    pub fn inject(&self, channel: &str, payload: &str) {
        let _ = self.inner.sender.send(RawMessage {
            channel: channel.to_string(),
            payload: payload.to_string(),
        });
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Pool handle onto a [`MemoryBroker`]
pub struct MemoryPool {
    broker: MemoryBroker,
    closed: AtomicBool,
}

impl MemoryPool {
    pub fn broker(&self) -> &MemoryBroker {
        &self.broker
    }

    fn ensure_open(&self) -> Result<(), PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl ConnectionPool for MemoryPool {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), PoolError> {
        self.ensure_open()?;

        let inner = &self.broker.inner;
        if inner.fail_publishes.load(Ordering::SeqCst) {
            return Err(PoolError::Connection("broker refused publish".to_string()));
        }

        let msg = RawMessage {
            channel: channel.to_string(),
            payload: payload.to_string(),
        };
        lock_unpoisoned(&inner.published).push(msg.clone());

        // No live session is not an error, Redis reports 0 receivers
        let _ = inner.sender.send(msg);
        Ok(())
    }

    async fn subscribe(&self, channels: &[String]) -> Result<PubSubSession, PoolError> {
        self.ensure_open()?;

        let inner = &self.broker.inner;
        inner.subscribe_attempts.fetch_add(1, Ordering::SeqCst);

        let refused = inner
            .failing_subscribes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(PoolError::Connection("broker refused connection".to_string()));
        }

        let subscribed: Arc<Mutex<HashSet<String>>> =
            Arc::new(Mutex::new(channels.iter().cloned().collect()));
        let disconnected = lock_unpoisoned(&inner.connection).child_token();
        let receiver = inner.sender.subscribe();

        let messages = futures::stream::unfold(
            (receiver, subscribed.clone(), disconnected),
            |(mut receiver, subscribed, disconnected)| async move {
                loop {
                    tokio::select! {
                        _ = disconnected.cancelled() => return None,
                        received = receiver.recv() => match received {
                            Ok(msg) => {
                                let wanted = lock_unpoisoned(&subscribed).contains(&msg.channel);
                                if wanted {
                                    return Some((msg, (receiver, subscribed, disconnected)));
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, "Memory broker subscriber lagged");
                            }
                            Err(broadcast::error::RecvError::Closed) => return None,
                        },
                    }
                }
            },
        )
        .boxed();

        Ok(PubSubSession {
            control: Box::new(MemorySubscriptionControl {
                broker: self.broker.clone(),
                subscribed,
            }),
            messages,
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn destroy(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

struct MemorySubscriptionControl {
    broker: MemoryBroker,
    subscribed: Arc<Mutex<HashSet<String>>>,
}

#[async_trait]
impl SubscriptionControl for MemorySubscriptionControl {
    async fn unsubscribe(&mut self, channels: &[String]) -> Result<(), PoolError> {
        let inner = &self.broker.inner;

        let delay = inner.unsubscribe_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if inner.fail_unsubscribes.load(Ordering::SeqCst) {
            return Err(PoolError::Connection("broker refused unsubscribe".to_string()));
        }

        {
            let mut subscribed = lock_unpoisoned(&self.subscribed);
            if channels.is_empty() {
                subscribed.clear();
            } else {
                for channel in channels {
                    subscribed.remove(channel);
                }
            }
        }

        lock_unpoisoned(&inner.unsubscribes).push(channels.to_vec());
        Ok(())
    }
}
