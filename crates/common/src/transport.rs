//! Collaborator seams of the bridge
//!
//! The bridge talks to two things it does not own:
//!
//! - a [`NativeTransport`], the request/response side (connect, write hex,
//!   disconnect), and
//! - an [`EventSource`], the fire-and-forget side that pushes hex text on a
//!   named channel.
//!
//! [`HostEventEmitter`] is the in-process event source used when the native
//! transport lives in the same process (see the `native` crate).

use crate::emitter::{EventEmitter, ListenerId};
use async_trait::async_trait;
use std::sync::{Arc, Weak};

/// Native USB transport boundary
///
/// All payloads cross this boundary as hex text. Errors are opaque to the
/// bridge and handed back to callers untouched.
#[async_trait]
pub trait NativeTransport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open the device identified by vendor and product id
    async fn connect(&self, vendor_id: u16, product_id: u16) -> Result<(), Self::Error>;

    /// Send one frame, hex encoded
    async fn write(&self, hex: &str) -> Result<(), Self::Error>;

    /// Close the current device
    async fn disconnect(&self) -> Result<(), Self::Error>;
}

/// Callback receiving text payloads from an [`EventSource`]
pub type TextListener = Box<dyn Fn(&str) + Send + Sync>;

/// Host event-delivery mechanism
pub trait EventSource: Send + Sync {
    type Subscription: Subscription;

    /// Subscribe to `channel`; the listener stays attached until the returned
    /// subscription is removed
    fn add_listener(&self, channel: &str, listener: TextListener) -> Self::Subscription;
}

/// Handle to a live [`EventSource`] subscription
pub trait Subscription: Send + Sync {
    fn remove(self);
}

/// In-process event source
///
/// Cloning yields another handle to the same set of channels, so the producer
/// (a native reader) and the consumer (the bridge) can each hold one.
#[derive(Clone, Default, Debug)]
pub struct HostEventEmitter {
    inner: Arc<EventEmitter<str>>,
}

impl HostEventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `payload` to every subscriber of `channel`
    ///
    /// Returns the number of subscribers reached.
    pub fn emit(&self, channel: &str, payload: &str) -> usize {
        self.inner.emit(channel, payload)
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner.listener_count(channel)
    }
}

impl EventSource for HostEventEmitter {
    type Subscription = HostSubscription;

    fn add_listener(&self, channel: &str, listener: TextListener) -> HostSubscription {
        let id = self.inner.on(channel, listener);
        HostSubscription {
            emitter: Arc::downgrade(&self.inner),
            channel: channel.to_string(),
            id,
        }
    }
}

/// Subscription handed out by [`HostEventEmitter`]
#[derive(Debug)]
pub struct HostSubscription {
    emitter: Weak<EventEmitter<str>>,
    channel: String,
    id: ListenerId,
}

impl Subscription for HostSubscription {
    fn remove(self) {
        if let Some(emitter) = self.emitter.upgrade() {
            emitter.off(&self.channel, self.id);
        }
    }
}
