//! Foundation layer: errors and the message/event model.

pub mod error;
pub mod event;
pub mod message;

pub use error::{ListenerError, ListenerResult, TransportError, TransportResult};
pub use event::{
    DeliveryFailure, MessageDelivered, MessageDeliveryFailed, MessageEvent, MessageReceived,
};
pub use message::{Contact, DEFAULT_CONTENT_TYPE, Message, MessageId};
