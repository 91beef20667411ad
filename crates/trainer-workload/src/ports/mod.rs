//! Ports: the seams between the bridge and the outside world.
//!
//! The bridge only ever talks to a message channel and reads a clock.

pub mod outbound;

pub use outbound::{
    Clock, InboundMessage, ManualClock, MessageTransport, ReceiveError, ReplyReceiver, SystemClock,
};
