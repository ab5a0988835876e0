/// Message envelope carried over Redis pub/sub channels
///
/// Every message published by a node is wrapped in a [`MessageTransferObject`]
/// which records who sent it and when. The envelope is encoded as a single
/// JSON object:
///
/// ```json
/// {
///   "senderIdentifier": "Lobby01",
///   "message": "hello",
///   "timestamp": 1700000000000
/// }
/// ```
///
/// The `message` field is either raw text or a JSON document produced by
/// [`MessageTransferObject::wrap`].
///
/// # Example
///
/// ```
/// use forestredis_shared::models::MessageTransferObject;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct PlayerJoined {
///     name: String,
/// }
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let joined = PlayerJoined { name: "alice".to_string() };
/// let envelope = MessageTransferObject::wrap("Lobby01", &joined, 1000)?;
///
/// let json = envelope.to_json()?;
/// let decoded = MessageTransferObject::from_json(&json)?;
/// let restored: PlayerJoined = decoded.message_object()?;
/// assert_eq!(restored, joined);
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Envelope encoding/decoding errors
#[derive(Error, Debug)]
pub enum MessageError {
    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Decoded envelope violates an envelope invariant
    #[error("Invalid message envelope: {0}")]
    InvalidEnvelope(String),
}

/// Wire envelope: sender identity, payload and publish time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageTransferObject {
    sender_identifier: String,
    message: String,
    /// Wall clock milliseconds at publish time
    timestamp: i64,
}

impl MessageTransferObject {
    /// Creates an envelope around a raw text message
    pub fn new(sender_identifier: impl Into<String>, message: impl Into<String>, timestamp: i64) -> Self {
        Self {
            sender_identifier: sender_identifier.into(),
            message: message.into(),
            timestamp,
        }
    }

    /// Creates an envelope whose message is the JSON form of `object`
    ///
    /// # Errors
    ///
    /// Returns an error if `object` cannot be represented as JSON (for
    /// example a map with non-string keys).
    pub fn wrap<T: Serialize + ?Sized>(
        sender_identifier: impl Into<String>,
        object: &T,
        timestamp: i64,
    ) -> Result<Self, MessageError> {
        let message = serde_json::to_string(object)?;
        Ok(Self::new(sender_identifier, message, timestamp))
    }

    /// Encodes the envelope into its wire form
    pub fn to_json(&self) -> Result<String, MessageError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes an envelope from its wire form
    ///
    /// Unknown fields are ignored. Missing fields and an empty sender
    /// identifier are rejected.
    pub fn from_json(json: &str) -> Result<Self, MessageError> {
        let envelope: Self = serde_json::from_str(json)?;

        if envelope.sender_identifier.is_empty() {
            return Err(MessageError::InvalidEnvelope(
                "sender identifier must not be empty".to_string(),
            ));
        }

        Ok(envelope)
    }

    /// Parses the message payload into `T`
    ///
    /// Fails if the payload is not JSON or does not match the shape of `T`.
    pub fn message_object<T: DeserializeOwned>(&self) -> Result<T, MessageError> {
        Ok(serde_json::from_str(&self.message)?)
    }

    /// Identifier of the node that published this envelope
    pub fn sender_identifier(&self) -> &str {
        &self.sender_identifier
    }

    /// Raw message payload
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Publish time in milliseconds since the Unix epoch
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Current wall clock time in milliseconds, used to stamp outgoing envelopes
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct ServerStatus {
        online: u32,
        motd: String,
    }

    #[test]
    fn test_wire_format_field_names() {
        let envelope = MessageTransferObject::new("S1", "hello", 1000);
        let json = envelope.to_json().unwrap();

        assert!(json.contains("\"senderIdentifier\":\"S1\""));
        assert!(json.contains("\"message\":\"hello\""));
        assert!(json.contains("\"timestamp\":1000"));
    }

    #[test]
    fn test_roundtrip_preserves_fields() {
        let envelope = MessageTransferObject::new("Lobby01", "line one\nline \"two\"", 1_700_000_000_123);
        let decoded = MessageTransferObject::from_json(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_from_json_rejects_non_json() {
        assert!(MessageTransferObject::from_json("definitely not json").is_err());
        assert!(MessageTransferObject::from_json("").is_err());
    }

    #[test]
    fn test_from_json_rejects_missing_fields() {
        let result = MessageTransferObject::from_json(r#"{"senderIdentifier":"S1","message":"hi"}"#);
        assert!(matches!(result, Err(MessageError::Json(_))));
    }

    #[test]
    fn test_from_json_rejects_empty_sender() {
        let result =
            MessageTransferObject::from_json(r#"{"senderIdentifier":"","message":"hi","timestamp":1}"#);
        assert!(matches!(result, Err(MessageError::InvalidEnvelope(_))));
    }

    #[test]
    fn test_from_json_ignores_unknown_fields() {
        let decoded = MessageTransferObject::from_json(
            r#"{"senderIdentifier":"S2","message":"hi","timestamp":5,"extra":true}"#,
        )
        .unwrap();

        assert_eq!(decoded.sender_identifier(), "S2");
        assert_eq!(decoded.message(), "hi");
        assert_eq!(decoded.timestamp(), 5);
    }

    #[test]
    fn test_wrap_and_parse_object() {
        let status = ServerStatus {
            online: 42,
            motd: "Welcome".to_string(),
        };

        let envelope = MessageTransferObject::wrap("S1", &status, 10).unwrap();
        assert_eq!(envelope.message(), r#"{"online":42,"motd":"Welcome"}"#);

        let parsed: ServerStatus = envelope.message_object().unwrap();
        assert_eq!(parsed, status);
    }

    #[test]
    fn test_wrap_rejects_non_string_map_keys() {
        let mut map = HashMap::new();
        map.insert(vec![1u8], "value");

        assert!(MessageTransferObject::wrap("S1", &map, 10).is_err());
    }

    #[test]
    fn test_message_object_shape_mismatch() {
        let envelope = MessageTransferObject::new("S1", "plain text", 10);
        assert!(envelope.message_object::<ServerStatus>().is_err());

        let envelope = MessageTransferObject::new("S1", r#"{"online":"many"}"#, 10);
        assert!(envelope.message_object::<ServerStatus>().is_err());
    }

    #[test]
    fn test_current_timestamp_is_millis() {
        let ts = current_timestamp();
        // After 2020-01-01 in milliseconds
        assert!(ts > 1_577_836_800_000);
    }
}
