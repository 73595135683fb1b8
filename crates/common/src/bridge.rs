//! USB bridge
//!
//! Composes a [`NativeTransport`] and an [`EventSource`] into one object with a
//! connection lifecycle and a byte-stream `data` event.
//!
//! # Data Flow
//!
//! ```text
//! caller bytes ──encode_hex──► transport.write(hex)
//!
//! event source "usbData" (hex) ──decode──► data listeners (Bytes)
//! ```
//!
//! # Subscription Lifecycle
//!
//! The bridge subscribes to `"usbData"` when constructed. `disconnect` removes
//! that subscription and every `data` listener before closing the transport.
//! The next `connect` subscribes again, so a bridge can be reused across
//! sessions; listeners cleared by a disconnect are never restored.
//!
//! Transport results are passed through untouched: the bridge never wraps,
//! retries, or validates lifecycle order.

use crate::channel::{FrameStream, frame_listener};
use crate::emitter::{EventEmitter, ListenerId};
use crate::transport::{EventSource, NativeTransport, Subscription};
use bytes::Bytes;
use protocol::{DATA_EVENT, DecodeMode, USB_DATA_CHANNEL, decode_hex, encode_hex};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, trace, warn};

/// Default capacity of a [`FrameStream`]
pub const DEFAULT_FRAME_CHANNEL_CAPACITY: usize = 256;

/// Bridge tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// How inbound hex text is decoded
    #[serde(default)]
    pub decode_mode: DecodeMode,
    /// Frames buffered per [`FrameStream`] before new ones are dropped
    #[serde(default = "BridgeSettings::default_frame_channel_capacity")]
    pub frame_channel_capacity: usize,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            decode_mode: DecodeMode::default(),
            frame_channel_capacity: Self::default_frame_channel_capacity(),
        }
    }
}

impl BridgeSettings {
    fn default_frame_channel_capacity() -> usize {
        DEFAULT_FRAME_CHANNEL_CAPACITY
    }
}

/// Observed connection state
///
/// Tracked from transport results only; nothing is refused based on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Inbound frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Frames decoded and handed to at least one listener
    pub frames_delivered: u64,
    /// Frames dropped because they failed to decode
    pub frames_rejected: u64,
}

/// Inbound side, shared with the event-source callback
struct Inbound {
    listeners: EventEmitter<Bytes>,
    decode_mode: DecodeMode,
    frames_delivered: AtomicU64,
    frames_rejected: AtomicU64,
}

impl Inbound {
    fn new(decode_mode: DecodeMode) -> Self {
        Self {
            listeners: EventEmitter::new(),
            decode_mode,
            frames_delivered: AtomicU64::new(0),
            frames_rejected: AtomicU64::new(0),
        }
    }

    fn deliver(&self, hex: &str) {
        let frame = match decode_hex(hex, self.decode_mode) {
            Ok(frame) => frame,
            Err(e) => {
                self.frames_rejected.fetch_add(1, Ordering::Relaxed);
                warn!("Dropping inbound frame ({} chars): {}", hex.chars().count(), e);
                return;
            }
        };

        let reached = self.listeners.emit(DATA_EVENT, &frame);
        if reached > 0 {
            self.frames_delivered.fetch_add(1, Ordering::Relaxed);
        }
        trace!(len = frame.len(), listeners = reached, "Delivered inbound frame");
    }
}

/// Bridge between application code and a native USB transport
pub struct UsbBridge<T: NativeTransport, S: EventSource> {
    transport: T,
    source: S,
    inbound: Arc<Inbound>,
    subscription: Mutex<Option<S::Subscription>>,
    connected: AtomicBool,
    settings: BridgeSettings,
}

impl<T: NativeTransport, S: EventSource> UsbBridge<T, S> {
    /// Create a bridge with default settings and subscribe to `"usbData"`
    pub fn new(transport: T, source: S) -> Self {
        Self::with_settings(transport, source, BridgeSettings::default())
    }

    /// Create a bridge and subscribe to `"usbData"`
    pub fn with_settings(transport: T, source: S, settings: BridgeSettings) -> Self {
        let inbound = Arc::new(Inbound::new(settings.decode_mode));
        let subscription = Self::attach(&source, &inbound);

        debug!(
            decode_mode = ?settings.decode_mode,
            "USB bridge subscribed to {}", USB_DATA_CHANNEL
        );

        Self {
            transport,
            source,
            inbound,
            subscription: Mutex::new(Some(subscription)),
            connected: AtomicBool::new(false),
            settings,
        }
    }

    fn attach(source: &S, inbound: &Arc<Inbound>) -> S::Subscription {
        // Weak so a dropped bridge leaves only an inert callback behind
        let inbound = Arc::downgrade(inbound);
        source.add_listener(
            USB_DATA_CHANNEL,
            Box::new(move |hex: &str| {
                if let Some(inbound) = inbound.upgrade() {
                    inbound.deliver(hex);
                }
            }),
        )
    }

    /// Subscribe again if a previous `disconnect` detached us
    fn reattach(&self) {
        let mut subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if subscription.is_none() {
            *subscription = Some(Self::attach(&self.source, &self.inbound));
            debug!("USB bridge re-subscribed to {}", USB_DATA_CHANNEL);
        }
    }

    /// Connect to a device
    ///
    /// Identifiers are forwarded unchanged and the transport's result is
    /// returned as-is. Concurrent calls are not serialized.
    pub async fn connect(&self, vendor_id: u16, product_id: u16) -> Result<(), T::Error> {
        self.reattach();

        debug!("Connecting to {:04x}:{:04x}", vendor_id, product_id);
        match self.transport.connect(vendor_id, product_id).await {
            Ok(()) => {
                self.connected.store(true, Ordering::SeqCst);
                info!("Connected to {:04x}:{:04x}", vendor_id, product_id);
                Ok(())
            }
            Err(e) => {
                debug!("Connect to {:04x}:{:04x} failed: {}", vendor_id, product_id, e);
                Err(e)
            }
        }
    }

    /// Send one frame, hex encoded, to the transport
    pub async fn write(&self, data: &[u8]) -> Result<(), T::Error> {
        let hex = encode_hex(data);
        trace!(len = data.len(), "Writing frame");
        self.transport.write(&hex).await
    }

    /// Tear down the subscription and listeners, then close the transport
    ///
    /// The teardown happens first and is kept even if the transport fails.
    pub async fn disconnect(&self) -> Result<(), T::Error> {
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(subscription) = subscription {
            subscription.remove();
        }
        self.inbound.listeners.remove_all_listeners();
        debug!("USB bridge unsubscribed from {}, listeners cleared", USB_DATA_CHANNEL);

        self.transport.disconnect().await?;
        self.connected.store(false, Ordering::SeqCst);
        info!("Disconnected");
        Ok(())
    }

    /// Register a `data` listener, called with every decoded inbound frame
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Bytes) + Send + Sync + 'static,
    {
        self.inbound.listeners.on(DATA_EVENT, listener)
    }

    /// Remove a `data` listener. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inbound.listeners.off(DATA_EVENT, id)
    }

    /// Open a channel-backed stream of inbound frames
    ///
    /// The stream ends when `disconnect` clears listeners. Dropping it
    /// unsubscribes.
    pub fn frames(&self) -> FrameStream {
        let (listener, rx) = frame_listener(self.settings.frame_channel_capacity);
        let id = self.subscribe(listener);

        let inbound = Arc::downgrade(&self.inbound);
        FrameStream::new(
            id,
            rx,
            Box::new(move || {
                if let Some(inbound) = inbound.upgrade() {
                    inbound.listeners.off(DATA_EVENT, id);
                }
            }),
        )
    }

    pub fn listener_count(&self) -> usize {
        self.inbound.listeners.listener_count(DATA_EVENT)
    }

    pub fn state(&self) -> ConnectionState {
        if self.connected.load(Ordering::SeqCst) {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Whether the bridge currently holds its `"usbData"` subscription
    pub fn is_attached(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            frames_delivered: self.inbound.frames_delivered.load(Ordering::Relaxed),
            frames_rejected: self.inbound.frames_rejected.load(Ordering::Relaxed),
        }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}
