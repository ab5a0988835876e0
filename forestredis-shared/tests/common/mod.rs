#![allow(dead_code)]

/// Common test utilities for integration tests
///
/// This module provides shared infrastructure for manager tests:
/// - A recording host that forwards received events to a channel
/// - A pool builder over a shared in-memory broker that remembers every
///   pool it built
/// - Log capture for asserting on worker log lines
/// - Polling helpers that work with paused tokio time

use forestredis_shared::events::RedisMessageReceivedEvent;
use forestredis_shared::models::RedisConfiguration;
use forestredis_shared::plugin::PluginHost;
use forestredis_shared::redis::{ConnectionPool, MemoryBroker, MemoryPool, PoolBuilder, RedisManager};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Host recording every received event
pub struct RecordingHost {
    events: mpsc::UnboundedSender<RedisMessageReceivedEvent>,
}

impl PluginHost for RecordingHost {
    fn on_message_received(&self, event: RedisMessageReceivedEvent) {
        let _ = self.events.send(event);
    }
}

pub fn recording_host() -> (Arc<RecordingHost>, mpsc::UnboundedReceiver<RedisMessageReceivedEvent>) {
    let (events, rx) = mpsc::unbounded_channel();
    (Arc::new(RecordingHost { events }), rx)
}

/// Waits for the next event, failing the test after two seconds
pub async fn next_event(
    rx: &mut mpsc::UnboundedReceiver<RedisMessageReceivedEvent>,
) -> RedisMessageReceivedEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Asserts no event arrives within a short grace period
pub async fn assert_no_event(rx: &mut mpsc::UnboundedReceiver<RedisMessageReceivedEvent>) {
    let result = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(result.is_err(), "unexpected event: {:?}", result);
}

/// Polls `condition` every 10ms for up to 60 (virtual or real) seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..6000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

/// Pool builder over one shared broker
#[derive(Clone)]
pub struct TestPools {
    pub broker: MemoryBroker,
    built: Arc<Mutex<Vec<Arc<MemoryPool>>>>,
    calls: Arc<AtomicUsize>,
}

impl TestPools {
    pub fn new() -> Self {
        Self {
            broker: MemoryBroker::new(),
            built: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Builder that refuses configurations without a hostname, like the
    /// Redis-backed one
    pub fn builder(&self) -> PoolBuilder {
        let pools = self.clone();
        Arc::new(move |config: &RedisConfiguration| {
            pools.calls.fetch_add(1, Ordering::SeqCst);
            config.hostname()?;

            let pool = Arc::new(pools.broker.pool());
            pools.built.lock().unwrap().push(Arc::clone(&pool));
            Some(pool as Arc<dyn ConnectionPool>)
        })
    }

    /// Every pool built so far, oldest first
    pub fn built(&self) -> Vec<Arc<MemoryPool>> {
        self.built.lock().unwrap().clone()
    }

    /// Number of times the builder was invoked
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn local_config() -> RedisConfiguration {
    RedisConfiguration::new(Some("localhost".to_string()), 6379, None, None, false)
}

/// Manager over `pools` with a local configuration
pub fn test_manager(
    host: Arc<RecordingHost>,
    server_identifier: &str,
    pools: &TestPools,
) -> RedisManager {
    RedisManager::with_pool_builder(host, server_identifier, Some(local_config()), pools.builder())
}

/// Shared buffer collecting formatted log output
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Installs a thread-local subscriber writing into the returned buffer
///
/// Only captures logs from the current thread, which covers every task of a
/// current-thread `#[tokio::test]` runtime.
pub fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();

    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();

    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}
