/// Node-side message events
///
/// A received message goes through two stages on a node:
///
/// ```text
/// RedisMessageReceivedEvent (from the manager)
///   ├─> AsyncMessageEvent: listeners run off the main loop, may cancel
///   └─> MessageEvent: delivered to the main loop if nobody cancelled
/// ```
///
/// Both wrappers implement [`MessageReceived`], so listener code reads the
/// same whichever stage it handles.
///
/// # Example
///
/// ```
/// use forestredis_node::events::AsyncMessageEvent;
/// use forestredis_shared::events::{MessageReceived, RedisMessageReceivedEvent};
/// use forestredis_shared::models::MessageTransferObject;
///
/// let inner = RedisMessageReceivedEvent::new(
///     "chat",
///     MessageTransferObject::new("Lobby01", "hello", 1000),
///     "Survival02",
/// );
/// let mut event = AsyncMessageEvent::new(inner);
/// assert!(!event.is_self_sender());
///
/// event.set_cancelled(true);
/// assert!(event.into_main_loop_event().is_none());
/// ```

use forestredis_shared::events::{MessageReceived, RedisMessageReceivedEvent};
use forestredis_shared::models::MessageTransferObject;

/// Cancellable pre-event, handled off the main loop
#[derive(Debug, Clone)]
pub struct AsyncMessageEvent {
    inner: RedisMessageReceivedEvent,
    cancelled: bool,
}

impl AsyncMessageEvent {
    pub fn new(inner: RedisMessageReceivedEvent) -> Self {
        Self {
            inner,
            cancelled: false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Cancelling stops delivery to the main loop; later listeners still run
    /// and may un-cancel
    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }

    /// Converts into the main-loop event, or `None` when cancelled
    pub fn into_main_loop_event(self) -> Option<MessageEvent> {
        if self.cancelled {
            return None;
        }
        Some(MessageEvent { inner: self.inner })
    }
}

impl MessageReceived for AsyncMessageEvent {
    fn channel(&self) -> &str {
        self.inner.channel()
    }

    fn message_transfer_object(&self) -> &MessageTransferObject {
        self.inner.message_transfer_object()
    }

    fn is_self_sender(&self) -> bool {
        self.inner.is_self_sender()
    }
}

/// Message event delivered to the node's main loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    inner: RedisMessageReceivedEvent,
}

impl MessageReceived for MessageEvent {
    fn channel(&self) -> &str {
        self.inner.channel()
    }

    fn message_transfer_object(&self) -> &MessageTransferObject {
        self.inner.message_transfer_object()
    }

    fn is_self_sender(&self) -> bool {
        self.inner.is_self_sender()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn received(sender: &str, local: &str) -> RedisMessageReceivedEvent {
        RedisMessageReceivedEvent::new("chat", MessageTransferObject::new(sender, "hello", 42), local)
    }

    #[test]
    fn test_async_event_delegates() {
        let event = AsyncMessageEvent::new(received("S1", "S1"));

        assert_eq!(event.channel(), "chat");
        assert_eq!(event.sender_identifier(), "S1");
        assert_eq!(event.message(), "hello");
        assert_eq!(event.timestamp(), 42);
        assert!(event.is_self_sender());
        assert!(!event.is_cancelled());
    }

    #[test]
    fn test_uncancelled_event_reaches_main_loop() {
        let event = AsyncMessageEvent::new(received("S2", "S1"));
        let main = event.into_main_loop_event().unwrap();

        assert_eq!(main.channel(), "chat");
        assert!(!main.is_self_sender());
    }

    #[test]
    fn test_cancel_can_be_reverted() {
        let mut event = AsyncMessageEvent::new(received("S2", "S1"));
        event.set_cancelled(true);
        event.set_cancelled(false);

        assert!(event.into_main_loop_event().is_some());
    }

    #[test]
    fn test_message_object_through_wrapper() {
        let envelope = MessageTransferObject::wrap("S2", &vec![1, 2, 3], 7).unwrap();
        let event = AsyncMessageEvent::new(RedisMessageReceivedEvent::new("numbers", envelope, "S1"));

        let numbers: Vec<i32> = event.message_object().unwrap();
        assert_eq!(numbers, vec![1, 2, 3]);
    }
}
