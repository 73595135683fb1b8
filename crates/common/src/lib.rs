//! Common building blocks for usb-bridge
//!
//! This crate provides the bridge between application code and a native USB
//! transport, the collaborator traits it is generic over, the named-event
//! emitter it is built on, error handling, and logging setup.

pub mod bridge;
pub mod channel;
pub mod emitter;
pub mod error;
pub mod logging;
pub mod test_utils;
pub mod transport;

pub use bridge::{
    BridgeSettings, BridgeStats, ConnectionState, DEFAULT_FRAME_CHANNEL_CAPACITY, UsbBridge,
};
pub use channel::FrameStream;
pub use emitter::{EventEmitter, ListenerId};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use transport::{
    EventSource, HostEventEmitter, HostSubscription, NativeTransport, Subscription, TextListener,
};
