/// Event dispatcher
///
/// The dispatcher is the node's [`PluginHost`]. Subscription workers hand it
/// decoded messages; a single dispatcher task runs the registered listeners
/// on each one and forwards the survivors to the main loop.
///
/// # Architecture
///
/// ```text
/// Subscription worker
///   └─> EventDispatcher::on_message_received (non-blocking send)
///         └─> dispatcher task
///               ├─> MessageListener 1..n: may cancel
///               └─> main loop channel: uncancelled MessageEvents
/// ```
///
/// Messages keep their arrival order across both stages.
///
/// # Example
///
/// ```no_run
/// use forestredis_node::dispatcher::EventDispatcher;
/// use forestredis_node::listeners::{IgnoreOwnMessages, MessageListener};
/// use std::sync::Arc;
/// use tokio::sync::mpsc;
///
/// # async fn example() {
/// let (main_tx, mut main_rx) = mpsc::unbounded_channel();
/// let listeners: Vec<Arc<dyn MessageListener>> = vec![Arc::new(IgnoreOwnMessages)];
/// let _dispatcher = EventDispatcher::start(listeners, main_tx);
///
/// while let Some(event) = main_rx.recv().await {
///     println!("{:?}", event);
/// }
/// # }
/// ```

use crate::events::{AsyncMessageEvent, MessageEvent};
use crate::listeners::MessageListener;
use forestredis_shared::events::{MessageReceived, RedisMessageReceivedEvent};
use forestredis_shared::plugin::PluginHost;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Plugin host feeding the listener pipeline
pub struct EventDispatcher {
    incoming: mpsc::UnboundedSender<RedisMessageReceivedEvent>,
}

impl EventDispatcher {
    /// Spawns the dispatcher task and returns the host handle
    ///
    /// Must be called from within a tokio runtime. The task ends once every
    /// handle is dropped or the main loop receiver is closed.
    pub fn start(
        listeners: Vec<Arc<dyn MessageListener>>,
        main_loop: mpsc::UnboundedSender<MessageEvent>,
    ) -> Arc<Self> {
        let (incoming, rx) = mpsc::unbounded_channel();

        for listener in &listeners {
            tracing::info!(listener = %listener.name(), "Registering message listener");
        }

        tokio::spawn(dispatch_loop(rx, listeners, main_loop));
        Arc::new(Self { incoming })
    }
}

impl PluginHost for EventDispatcher {
    fn on_message_received(&self, event: RedisMessageReceivedEvent) {
        if self.incoming.send(event).is_err() {
            tracing::warn!("Dispatcher stopped, dropping received message");
        }
    }
}

async fn dispatch_loop(
    mut incoming: mpsc::UnboundedReceiver<RedisMessageReceivedEvent>,
    listeners: Vec<Arc<dyn MessageListener>>,
    main_loop: mpsc::UnboundedSender<MessageEvent>,
) {
    while let Some(received) = incoming.recv().await {
        let mut event = AsyncMessageEvent::new(received);

        for listener in &listeners {
            if let Err(e) = listener.on_message(&mut event).await {
                tracing::warn!(
                    listener = %listener.name(),
                    channel = %event.channel(),
                    error = %e,
                    "Message listener failed"
                );
            }
        }

        let channel = event.channel().to_string();
        match event.into_main_loop_event() {
            Some(event) => {
                if main_loop.send(event).is_err() {
                    tracing::debug!("Main loop gone, stopping dispatcher");
                    break;
                }
            }
            None => tracing::debug!(channel = %channel, "Message cancelled by listener"),
        }
    }
}
