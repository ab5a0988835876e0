/// Subscription worker
///
/// One worker is started per subscribe batch. It owns a pub/sub session for
/// a fixed list of channels and keeps it alive for as long as the manager is
/// running:
///
/// ```text
/// loop (manager not closing, worker not stopped, pool open)
///   ├─> open session            -- "established" / "re-established"
///   ├─> deliver messages        -- until stop, all channels dropped, or fault
///   ├─> normal end              -- "subscribed successfully", exit
///   └─> fault                   -- warn, clear session, sleep 5s, retry
/// ```
///
/// The worker never gets interrupted mid-call. [`Subscription::stop`] cancels
/// its token and forces an unsubscribe-all on the live session; the worker
/// observes the token inside its message loop, in the backoff sleep and at
/// the top of the reconnect loop.

use crate::redis::lock_unpoisoned;
use crate::redis::manager::Shared;
use crate::redis::pool::{ConnectionPool, PoolError, PubSubSession, SubscriptionControl};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Delay between a connection fault and the next reconnect attempt
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Background worker owning one pub/sub session
pub(crate) struct Subscription {
    channels: Vec<String>,
    /// Channels unsubscribed from this worker; never re-subscribed on reconnect
    dropped: Mutex<HashSet<String>>,
    control: tokio::sync::Mutex<Option<Box<dyn SubscriptionControl>>>,
    subscribed: AtomicBool,
    finished: AtomicBool,
    stop: CancellationToken,
}

impl Subscription {
    pub(crate) fn new(channels: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            channels,
            dropped: Mutex::new(HashSet::new()),
            control: tokio::sync::Mutex::new(None),
            subscribed: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            stop: CancellationToken::new(),
        })
    }

    pub(crate) fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Whether a session is currently live
    pub(crate) fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    /// Whether the worker loop has exited
    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn remaining_channels(&self) -> Vec<String> {
        let dropped = lock_unpoisoned(&self.dropped);
        self.channels
            .iter()
            .filter(|channel| !dropped.contains(*channel))
            .cloned()
            .collect()
    }

    /// Worker main loop; runs until stopped, closed, or every channel dropped
    pub(crate) async fn run(self: Arc<Self>, manager: Arc<Shared>, pool: Arc<dyn ConnectionPool>) {
        let mut first_try = true;

        while !manager.is_closing() && !self.stop.is_cancelled() && !pool.is_closed() {
            match self.listen(&manager, pool.as_ref(), &mut first_try).await {
                Ok(()) => {
                    tracing::info!(channels = ?self.channels, "Subscribed to channels successfully");
                    break;
                }
                Err(e) => {
                    if manager.is_closing() || self.stop.is_cancelled() {
                        break;
                    }
                    first_try = false;

                    tracing::warn!(
                        channels = ?self.channels,
                        error = %e,
                        "Redis pubsub connection dropped, trying to reconnect in {}s",
                        RECONNECT_DELAY.as_secs()
                    );
                    self.release_session(true).await;

                    tokio::select! {
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        _ = self.stop.cancelled() => break,
                    }
                }
            }
        }

        self.release_session(false).await;
        self.finished.store(true, Ordering::SeqCst);
        tracing::debug!(channels = ?self.channels, "Subscription worker stopped");
    }

    /// Opens one session and pumps its messages into the manager
    ///
    /// Returns `Ok` when the subscription ended on request and `Err` when the
    /// session could not be opened or its stream ended on its own.
    async fn listen(
        &self,
        manager: &Shared,
        pool: &dyn ConnectionPool,
        first_try: &mut bool,
    ) -> Result<(), PoolError> {
        let channels = self.remaining_channels();
        if channels.is_empty() {
            return Ok(());
        }

        let PubSubSession {
            control,
            mut messages,
        } = pool.subscribe(&channels).await?;

        if *first_try {
            tracing::info!(channels = ?channels, "Redis pubsub connection established");
            *first_try = false;
        } else {
            tracing::info!(channels = ?channels, "Redis pubsub connection re-established");
        }

        *self.control.lock().await = Some(control);
        self.subscribed.store(true, Ordering::SeqCst);

        loop {
            tokio::select! {
                _ = self.stop.cancelled() => return Ok(()),
                received = messages.next() => match received {
                    Some(raw) => manager.handle_message(&raw.channel, &raw.payload),
                    None => {
                        return Err(PoolError::Connection("pub/sub stream ended".to_string()));
                    }
                },
            }
        }
    }

    /// Drops the local session state, optionally unsubscribing first
    async fn release_session(&self, unsubscribe: bool) {
        self.subscribed.store(false, Ordering::SeqCst);

        let control = self.control.lock().await.take();
        if let (true, Some(mut control)) = (unsubscribe, control) {
            if let Err(e) = control.unsubscribe(&[]).await {
                tracing::debug!(error = %e, "Ignoring unsubscribe failure on broken session");
            }
        }
    }

    /// Unsubscribes `channels` from the live session
    ///
    /// Names this worker does not cover are still sent to the backend, which
    /// ignores them. Once every channel of the worker has been unsubscribed
    /// the worker ends.
    pub(crate) async fn unsubscribe(&self, channels: &[String]) -> Result<(), PoolError> {
        {
            let mut control = self.control.lock().await;
            if let Some(control) = control.as_mut() {
                control.unsubscribe(channels).await?;
            }
        }

        let exhausted = {
            let mut dropped = lock_unpoisoned(&self.dropped);
            for channel in channels {
                if self.channels.contains(channel) {
                    dropped.insert(channel.clone());
                }
            }
            dropped.len() == self.channels.len()
        };

        if exhausted {
            self.stop.cancel();
        }

        Ok(())
    }

    /// Stops the worker: cancels it and forces an unsubscribe-all
    pub(crate) async fn stop(&self) {
        self.stop.cancel();

        let mut control = self.control.lock().await;
        if let Some(control) = control.as_mut() {
            if let Err(e) = control.unsubscribe(&[]).await {
                tracing::debug!(
                    channels = ?self.channels,
                    error = %e,
                    "Forced unsubscribe failed while stopping worker"
                );
            }
        }
    }
}
