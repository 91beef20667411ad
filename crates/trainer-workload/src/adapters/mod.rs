//! Adapters: concrete implementations of the ports plus the publisher and
//! subscriber that sit between the service layer and the channel.

pub mod bus;
pub mod publisher;
pub mod recording;
pub mod subscriber;

pub use bus::{BusReplyReceiver, BusTransport};
pub use publisher::RequestPublisher;
pub use recording::RecordingTransport;
pub use subscriber::{ReplyDisposition, ResponseSubscriber, SubscriberHandle};
