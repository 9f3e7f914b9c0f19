//! JSON text frames exchanged with a chat server.
//!
//! ```json
//! {"type":"message","to":"alice","content":"hi"}
//! {"type":"message","from":"bob","content":"hello","subject":"re: hi"}
//! {"type":"error","to":"alice","content":"hi","failure":"offline_messages_not_supported"}
//! ```
//!
//! Probes never travel as text frames; they use the transport's own
//! ping/pong.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vigil_core::{Contact, DeliveryFailure, InboundPacket, Message, MessageId};

/// Errors decoding or encoding a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("'{0}' frame is missing its contact")]
    MissingContact(&'static str),
}

/// Message fields as they appear on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<MessageId>,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
}

impl WireMessage {
    fn from_message(message: &Message) -> Self {
        Self {
            id: Some(message.id),
            content: message.content.clone(),
            content_type: Some(message.content_type.clone()),
            subject: message.subject.clone(),
        }
    }

    fn into_message(self) -> Message {
        let mut message = Message::text(self.content);
        if let Some(id) = self.id {
            message.id = id;
        }
        if let Some(content_type) = self.content_type {
            message.content_type = content_type;
        }
        message.subject = self.subject;
        message
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Frame {
    Message {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<Contact>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<Contact>,
        #[serde(flatten)]
        message: WireMessage,
    },
    Error {
        to: Contact,
        #[serde(flatten)]
        message: WireMessage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failure: Option<DeliveryFailure>,
    },
}

/// Encodes an outbound chat message.
pub fn encode_message(to: &Contact, message: &Message) -> Result<String, FrameError> {
    let frame = Frame::Message {
        from: None,
        to: Some(to.clone()),
        message: WireMessage::from_message(message),
    };
    Ok(serde_json::to_string(&frame)?)
}

/// Decodes an inbound text frame into a packet for the session.
pub fn decode_packet(text: &str) -> Result<InboundPacket, FrameError> {
    match serde_json::from_str::<Frame>(text)? {
        Frame::Message { from, message, .. } => Ok(InboundPacket::Received {
            from: from.ok_or(FrameError::MissingContact("message"))?,
            message: message.into_message(),
        }),
        Frame::Error {
            to,
            message,
            failure,
        } => Ok(InboundPacket::DeliveryFailed {
            to,
            message: message.into_message(),
            failure: failure.unwrap_or(DeliveryFailure::Unknown),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_received_message() {
        let packet =
            decode_packet(r#"{"type":"message","from":"bob","content":"hello","subject":"hi"}"#)
                .unwrap();

        let InboundPacket::Received { from, message } = packet else {
            panic!("expected a received message");
        };
        assert_eq!(from.address(), "bob");
        assert_eq!(message.content, "hello");
        assert_eq!(message.subject.as_deref(), Some("hi"));
        assert_eq!(message.content_type, vigil_core::DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_decode_delivery_error() {
        let packet = decode_packet(
            r#"{"type":"error","to":"alice","content":"hi","failure":"offline_messages_not_supported"}"#,
        )
        .unwrap();

        assert!(matches!(
            packet,
            InboundPacket::DeliveryFailed {
                failure: DeliveryFailure::OfflineMessagesNotSupported,
                ..
            }
        ));
    }

    #[test]
    fn test_decode_error_without_reason() {
        let packet = decode_packet(r#"{"type":"error","to":"alice","content":"hi"}"#).unwrap();
        assert!(matches!(
            packet,
            InboundPacket::DeliveryFailed {
                failure: DeliveryFailure::Unknown,
                ..
            }
        ));
    }

    #[test]
    fn test_decode_rejects_bad_frames() {
        assert!(matches!(
            decode_packet(r#"{"type":"message","content":"who sent this"}"#),
            Err(FrameError::MissingContact("message"))
        ));
        assert!(matches!(
            decode_packet(r#"{"type":"presence","from":"bob"}"#),
            Err(FrameError::Malformed(_))
        ));
        assert!(decode_packet("not json").is_err());
    }

    #[test]
    fn test_encoded_message_keeps_identity() {
        let message = Message::text("hi").with_subject("greeting");
        let text = encode_message(&Contact::new("alice"), &message).unwrap();

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["to"], "alice");
        assert_eq!(value["id"], message.id.to_string());
        assert!(value.get("from").is_none());
    }
}
