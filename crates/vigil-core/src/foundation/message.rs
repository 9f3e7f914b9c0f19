//! Protocol-neutral message model.
//!
//! Adapters translate their wire payloads into these types; the core never
//! looks inside `content`.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default MIME type of message content.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Unique identifier of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Address of a remote party (a JID, an IRC nick, a Yahoo ID, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Contact(String);

impl Contact {
    /// Creates a contact from its protocol address.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Returns the protocol address.
    pub fn address(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Contact {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

/// An instant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier.
    pub id: MessageId,
    /// Message body.
    pub content: String,
    /// MIME type of `content`.
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Optional subject line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

impl Message {
    /// Creates a plain-text message with a fresh identifier.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            content: content.into(),
            content_type: default_content_type(),
            subject: None,
        }
    }

    /// Sets the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Sets the subject.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}
