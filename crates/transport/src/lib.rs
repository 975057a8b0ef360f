// bellsync push transports
//
// Backends connect to a pub/sub server and yield raw events; the shared
// `TransportAdapter` decodes them and applies them to a `NotificationStore`.

pub mod adapter;
pub mod broadcaster;
pub mod error;
pub mod mercure;
pub mod pusher;
pub mod retry;

pub use adapter::{
    ChannelIdentity, ConnectionState, RawEvent, RawEventStream, TransportAdapter,
    TransportBackend, TransportHandle,
};
pub use broadcaster::{backend_from_config, start_from_config};
pub use error::TransportError;
pub use mercure::MercureBackend;
pub use pusher::PusherBackend;
pub use retry::ReconnectPolicy;
