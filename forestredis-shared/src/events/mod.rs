/// Received-message events
///
/// Every decoded message is delivered to the host as a
/// [`RedisMessageReceivedEvent`]. Hosts that wrap the event in their own
/// dispatch types (cancellable pre-events, main-loop events, ...) implement
/// [`MessageReceived`] on the wrapper so listener code can stay generic over
/// the concrete event type.
///
/// # Example
///
/// ```
/// use forestredis_shared::events::{MessageReceived, RedisMessageReceivedEvent};
/// use forestredis_shared::models::MessageTransferObject;
///
/// let envelope = MessageTransferObject::new("Lobby01", "hello", 1000);
/// let event = RedisMessageReceivedEvent::new("chat", envelope, "Lobby01");
///
/// assert_eq!(event.channel(), "chat");
/// assert_eq!(event.message(), "hello");
/// assert!(event.is_self_sender());
/// ```

use crate::models::{MessageError, MessageTransferObject};
use serde::de::DeserializeOwned;

/// Common accessors of every received-message event
pub trait MessageReceived {
    /// Channel the message arrived on
    fn channel(&self) -> &str;

    /// The decoded envelope
    fn message_transfer_object(&self) -> &MessageTransferObject;

    /// Whether the message was published by this node
    fn is_self_sender(&self) -> bool;

    fn sender_identifier(&self) -> &str {
        self.message_transfer_object().sender_identifier()
    }

    fn message(&self) -> &str {
        self.message_transfer_object().message()
    }

    fn timestamp(&self) -> i64 {
        self.message_transfer_object().timestamp()
    }

    /// Parses the payload of an object published with `publish_object`
    fn message_object<T: DeserializeOwned>(&self) -> Result<T, MessageError>
    where
        Self: Sized,
    {
        self.message_transfer_object().message_object()
    }
}

/// Event handed to the host for every successfully decoded message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisMessageReceivedEvent {
    channel: String,
    message: MessageTransferObject,
    self_sender: bool,
}

impl RedisMessageReceivedEvent {
    /// Creates an event
    ///
    /// `local_identifier` is the receiving node's server identifier at the
    /// time of receipt; it decides [`MessageReceived::is_self_sender`].
    pub fn new(
        channel: impl Into<String>,
        message: MessageTransferObject,
        local_identifier: &str,
    ) -> Self {
        let self_sender = message.sender_identifier() == local_identifier;
        Self {
            channel: channel.into(),
            message,
            self_sender,
        }
    }

    pub fn into_parts(self) -> (String, MessageTransferObject) {
        (self.channel, self.message)
    }
}

impl MessageReceived for RedisMessageReceivedEvent {
    fn channel(&self) -> &str {
        &self.channel
    }

    fn message_transfer_object(&self) -> &MessageTransferObject {
        &self.message
    }

    fn is_self_sender(&self) -> bool {
        self.self_sender
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Teleport {
        player: String,
        target: String,
    }

    #[test]
    fn test_self_sender_matches_identifier() {
        let own = RedisMessageReceivedEvent::new(
            "chat",
            MessageTransferObject::new("S1", "hello", 1000),
            "S1",
        );
        assert!(own.is_self_sender());

        let foreign = RedisMessageReceivedEvent::new(
            "chat",
            MessageTransferObject::new("S2", "hello", 1000),
            "S1",
        );
        assert!(!foreign.is_self_sender());
    }

    #[test]
    fn test_self_sender_is_case_sensitive() {
        let event = RedisMessageReceivedEvent::new(
            "chat",
            MessageTransferObject::new("s1", "hello", 1000),
            "S1",
        );
        assert!(!event.is_self_sender());
    }

    #[test]
    fn test_accessors_delegate_to_envelope() {
        let envelope = MessageTransferObject::wrap(
            "Hub",
            &Teleport {
                player: "alice".to_string(),
                target: "survival".to_string(),
            },
            77,
        )
        .unwrap();
        let event = RedisMessageReceivedEvent::new("teleports", envelope, "Lobby");

        assert_eq!(event.sender_identifier(), "Hub");
        assert_eq!(event.timestamp(), 77);

        let parsed: Teleport = event.message_object().unwrap();
        assert_eq!(parsed.player, "alice");
        assert_eq!(parsed.target, "survival");

        let (channel, message) = event.into_parts();
        assert_eq!(channel, "teleports");
        assert_eq!(message.sender_identifier(), "Hub");
    }
}
