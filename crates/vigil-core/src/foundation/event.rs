//! Message events fanned out to listeners.
//!
//! ```text
//! MessageEvent
//! ├── Delivered(MessageDelivered)
//! ├── Received(MessageReceived)
//! └── DeliveryFailed(MessageDeliveryFailed)
//! ```

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::message::{Contact, Message};

/// Why a message could not be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryFailure {
    /// No specific reason is known.
    Unknown,
    /// The transport failed while sending.
    NetworkFailure,
    /// The session is not registered with its server.
    ProviderNotRegistered,
    /// The recipient is offline and the protocol cannot store messages.
    OfflineMessagesNotSupported,
    /// An internal error occurred in the adapter.
    Internal,
    /// The protocol does not support the requested operation.
    UnsupportedOperation,
}

impl DeliveryFailure {
    /// Returns the reason as a static string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::NetworkFailure => "network_failure",
            Self::ProviderNotRegistered => "provider_not_registered",
            Self::OfflineMessagesNotSupported => "offline_messages_not_supported",
            Self::Internal => "internal",
            Self::UnsupportedOperation => "unsupported_operation",
        }
    }
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message was handed to the transport successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDelivered {
    pub message: Message,
    pub to: Contact,
    pub timestamp: SystemTime,
}

/// A message arrived from a contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageReceived {
    pub message: Message,
    pub from: Contact,
    pub timestamp: SystemTime,
}

/// A message could not be delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDeliveryFailed {
    pub message: Message,
    pub to: Contact,
    pub failure: DeliveryFailure,
    pub timestamp: SystemTime,
}

/// Any event published through an [`EventFanout`](crate::EventFanout).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageEvent {
    Delivered(MessageDelivered),
    Received(MessageReceived),
    DeliveryFailed(MessageDeliveryFailed),
}

impl MessageEvent {
    /// Builds a `Delivered` event stamped with the current time.
    pub fn delivered(message: Message, to: Contact) -> Self {
        Self::Delivered(MessageDelivered {
            message,
            to,
            timestamp: SystemTime::now(),
        })
    }

    /// Builds a `Received` event stamped with the current time.
    pub fn received(message: Message, from: Contact) -> Self {
        Self::Received(MessageReceived {
            message,
            from,
            timestamp: SystemTime::now(),
        })
    }

    /// Builds a `DeliveryFailed` event stamped with the current time.
    pub fn delivery_failed(message: Message, to: Contact, failure: DeliveryFailure) -> Self {
        Self::DeliveryFailed(MessageDeliveryFailed {
            message,
            to,
            failure,
            timestamp: SystemTime::now(),
        })
    }

    /// Returns the event kind name, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Delivered(_) => "delivered",
            Self::Received(_) => "received",
            Self::DeliveryFailed(_) => "delivery_failed",
        }
    }

    /// Returns the message the event is about.
    pub fn message(&self) -> &Message {
        match self {
            Self::Delivered(e) => &e.message,
            Self::Received(e) => &e.message,
            Self::DeliveryFailed(e) => &e.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_and_message() {
        let msg = Message::text("ping");
        let event = MessageEvent::delivery_failed(
            msg.clone(),
            Contact::new("alice@example.org"),
            DeliveryFailure::NetworkFailure,
        );
        assert_eq!(event.kind(), "delivery_failed");
        assert_eq!(event.message(), &msg);
    }

    #[test]
    fn test_event_serializes_with_kind_tag() {
        let event = MessageEvent::received(Message::text("hi"), Contact::new("bob"));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "received");
        assert_eq!(value["from"], "bob");
    }
}
