//! Integration layer: listeners, fanout, and the adapter seams.

pub mod fanout;
pub mod state;
pub mod transport;

pub use fanout::{BoxedListener, EventFanout, MessageListener};
pub use state::ConnectionState;
pub use transport::{
    BoxedSessionHandler, BoxedTransport, InboundPacket, SessionHandler, SessionTransport,
};
