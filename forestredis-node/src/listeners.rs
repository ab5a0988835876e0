/// Message listener trait and built-in listeners
///
/// Listeners see every received message before the main loop does. They run
/// in registration order on the dispatcher task, one message at a time, and
/// can cancel delivery to the main loop.
///
/// # Listener Contract
///
/// Listeners must:
/// 1. Implement the `MessageListener` trait (async)
/// 2. Return promptly; a slow listener delays every later message
/// 3. Report failures as `ListenerError` instead of panicking
///
/// A failing listener is logged and skipped; it never cancels the event.
///
/// # Example
///
/// ```no_run
/// use forestredis_node::events::AsyncMessageEvent;
/// use forestredis_node::listeners::{ListenerResult, MessageListener};
/// use forestredis_shared::events::MessageReceived;
/// use async_trait::async_trait;
///
/// struct MuteStaff;
///
/// #[async_trait]
/// impl MessageListener for MuteStaff {
///     fn name(&self) -> &str {
///         "mute_staff"
///     }
///
///     async fn on_message(&self, event: &mut AsyncMessageEvent) -> ListenerResult<()> {
///         if event.channel() == "staff" {
///             event.set_cancelled(true);
///         }
///         Ok(())
///     }
/// }
/// ```

use crate::events::AsyncMessageEvent;
use async_trait::async_trait;
use forestredis_shared::events::MessageReceived;
use std::collections::HashSet;

/// Listener error types
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Payload did not have the shape the listener expected
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Any other listener failure
    #[error("Listener failed: {0}")]
    Failed(String),
}

/// Listener result type
pub type ListenerResult<T> = Result<T, ListenerError>;

/// Pre-event listener
#[async_trait]
pub trait MessageListener: Send + Sync {
    /// Listener name, used in logs
    fn name(&self) -> &str;

    /// Handles one message; set `event.set_cancelled(true)` to drop it
    async fn on_message(&self, event: &mut AsyncMessageEvent) -> ListenerResult<()>;
}

/// Cancels messages this node published itself
pub struct IgnoreOwnMessages;

#[async_trait]
impl MessageListener for IgnoreOwnMessages {
    fn name(&self) -> &str {
        "ignore_own_messages"
    }

    async fn on_message(&self, event: &mut AsyncMessageEvent) -> ListenerResult<()> {
        if event.is_self_sender() {
            event.set_cancelled(true);
        }
        Ok(())
    }
}

/// Cancels messages from the listed senders
pub struct BlockSenders {
    blocked: HashSet<String>,
}

impl BlockSenders {
    pub fn new<I, S>(senders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            blocked: senders.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl MessageListener for BlockSenders {
    fn name(&self) -> &str {
        "block_senders"
    }

    async fn on_message(&self, event: &mut AsyncMessageEvent) -> ListenerResult<()> {
        if self.blocked.contains(event.sender_identifier()) {
            tracing::debug!(
                sender = %event.sender_identifier(),
                channel = %event.channel(),
                "Dropping message from blocked sender"
            );
            event.set_cancelled(true);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forestredis_shared::events::RedisMessageReceivedEvent;
    use forestredis_shared::models::MessageTransferObject;

    fn event(sender: &str, local: &str) -> AsyncMessageEvent {
        AsyncMessageEvent::new(RedisMessageReceivedEvent::new(
            "chat",
            MessageTransferObject::new(sender, "hi", 1),
            local,
        ))
    }

    #[tokio::test]
    async fn test_ignore_own_messages() {
        let listener = IgnoreOwnMessages;

        let mut own = event("S1", "S1");
        listener.on_message(&mut own).await.unwrap();
        assert!(own.is_cancelled());

        let mut other = event("S2", "S1");
        listener.on_message(&mut other).await.unwrap();
        assert!(!other.is_cancelled());
    }

    #[tokio::test]
    async fn test_block_senders() {
        let listener = BlockSenders::new(["Spam01"]);

        let mut blocked = event("Spam01", "S1");
        listener.on_message(&mut blocked).await.unwrap();
        assert!(blocked.is_cancelled());

        let mut allowed = event("Lobby01", "S1");
        listener.on_message(&mut allowed).await.unwrap();
        assert!(!allowed.is_cancelled());
    }

    #[test]
    fn test_listener_error_display() {
        let error = ListenerError::InvalidPayload("expected object".to_string());
        assert_eq!(error.to_string(), "Invalid payload: expected object");
    }
}
