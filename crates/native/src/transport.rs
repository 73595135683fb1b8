//! `rusb`-backed native transport
//!
//! [`RusbTransport`] implements [`NativeTransport`] for devices with a single
//! interrupt IN/OUT pair. Inbound data is pushed by an [`InterruptReader`]
//! thread onto the [`HostEventEmitter`] the transport was built with, which the
//! bridge is subscribed to.
//!
//! Blocking libusb calls run on Tokio's blocking pool.

use crate::device::{InterruptPair, open_device};
use crate::error::NativeError;
use crate::reader::{InterruptReader, ReaderSettings};
use async_trait::async_trait;
use common::{HostEventEmitter, NativeTransport};
use protocol::decode_hex_strict;
use rusb::{Context, DeviceHandle};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Transport timing and write behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeSettings {
    /// Pause between interrupt IN reads
    #[serde(default = "NativeSettings::default_read_interval_ms")]
    pub read_interval_ms: u64,
    /// Timeout of each interrupt IN read
    #[serde(default = "NativeSettings::default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Timeout of each interrupt OUT write
    #[serde(default = "NativeSettings::default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Zero-pad writes to the OUT endpoint's max packet size
    #[serde(default = "NativeSettings::default_pad_writes")]
    pub pad_writes: bool,
}

impl Default for NativeSettings {
    fn default() -> Self {
        Self {
            read_interval_ms: Self::default_read_interval_ms(),
            read_timeout_ms: Self::default_read_timeout_ms(),
            write_timeout_ms: Self::default_write_timeout_ms(),
            pad_writes: Self::default_pad_writes(),
        }
    }
}

impl NativeSettings {
    fn default_read_interval_ms() -> u64 {
        50
    }

    fn default_read_timeout_ms() -> u64 {
        50
    }

    fn default_write_timeout_ms() -> u64 {
        1000
    }

    fn default_pad_writes() -> bool {
        true
    }

    pub fn reader_settings(&self) -> ReaderSettings {
        ReaderSettings {
            interval: Duration::from_millis(self.read_interval_ms),
            timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Decode a hex write and shape it for the OUT endpoint
pub fn build_write_payload(
    hex: &str,
    max_packet_size: usize,
    pad: bool,
) -> Result<Vec<u8>, NativeError> {
    let data = decode_hex_strict(hex)?;
    if data.len() > max_packet_size {
        return Err(NativeError::PayloadTooLarge {
            size: data.len(),
            max: max_packet_size,
        });
    }

    let mut payload = data.to_vec();
    if pad {
        payload.resize(max_packet_size, 0);
    }
    Ok(payload)
}

/// An open device plus its reader
struct Connection {
    handle: Arc<DeviceHandle<Context>>,
    pair: InterruptPair,
    reader: InterruptReader,
}

impl Connection {
    /// Stop the reader, then drop our handle reference
    ///
    /// The device is released and closed once the last in-flight write lets
    /// go of the handle.
    fn close(self) {
        let Connection { handle, pair, reader } = self;
        reader.stop();
        drop(handle);
        debug!("Closed interface {}", pair.interface);
    }
}

/// Native transport over libusb
pub struct RusbTransport {
    context: Context,
    events: HostEventEmitter,
    settings: NativeSettings,
    connection: Mutex<Option<Connection>>,
}

impl RusbTransport {
    /// Create a transport with a fresh libusb context
    pub fn new(events: HostEventEmitter, settings: NativeSettings) -> Result<Self, NativeError> {
        let context = Context::new().map_err(NativeError::Context)?;
        Ok(Self::with_context(context, events, settings))
    }

    pub fn with_context(context: Context, events: HostEventEmitter, settings: NativeSettings) -> Self {
        Self {
            context,
            events,
            settings,
            connection: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn settings(&self) -> &NativeSettings {
        &self.settings
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn take_connection(&self) -> Option<Connection> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Handle and endpoints of the current connection
    fn current(&self) -> Option<(Arc<DeviceHandle<Context>>, InterruptPair)> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|connection| (Arc::clone(&connection.handle), connection.pair))
    }
}

async fn run_blocking<F, R>(f: F) -> Result<R, NativeError>
where
    F: FnOnce() -> Result<R, NativeError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| NativeError::Worker(e.to_string()))?
}

#[async_trait]
impl NativeTransport for RusbTransport {
    type Error = NativeError;

    async fn connect(&self, vendor_id: u16, product_id: u16) -> Result<(), NativeError> {
        if let Some(previous) = self.take_connection() {
            warn!("Replacing existing USB connection");
            run_blocking(move || {
                previous.close();
                Ok(())
            })
            .await?;
        }

        let context = self.context.clone();
        let (handle, pair) =
            run_blocking(move || open_device(&context, vendor_id, product_id)).await?;
        let handle = Arc::new(handle);

        let reader = InterruptReader::spawn(
            Arc::clone(&handle),
            pair.endpoint_in,
            pair.in_packet_size,
            self.events.clone(),
            self.settings.reader_settings(),
        )
        .map_err(|e| NativeError::Worker(e.to_string()))?;

        *self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Connection {
            handle,
            pair,
            reader,
        });

        info!("USB device {:04x}:{:04x} opened", vendor_id, product_id);
        Ok(())
    }

    async fn write(&self, hex: &str) -> Result<(), NativeError> {
        let (handle, pair) = self.current().ok_or(NativeError::NotConnected)?;
        let payload = build_write_payload(hex, pair.out_packet_size, self.settings.pad_writes)?;
        let timeout = self.settings.write_timeout();

        let written = run_blocking(move || {
            handle
                .write_interrupt(pair.endpoint_out, &payload, timeout)
                .map_err(NativeError::WriteFailed)
        })
        .await?;

        debug!("Write confirmation received ({} bytes)", written);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), NativeError> {
        let connection = self.take_connection().ok_or(NativeError::NoConnection)?;
        run_blocking(move || {
            connection.close();
            Ok(())
        })
        .await?;

        info!("USB connection closed");
        Ok(())
    }
}
