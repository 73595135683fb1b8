//! Native USB transport for usb-bridge
//!
//! Implements [`common::NativeTransport`] on top of libusb (via `rusb`) for
//! devices exposing one interface with an interrupt IN/OUT endpoint pair.
//!
//! # Example
//!
//! ```no_run
//! use common::{HostEventEmitter, UsbBridge};
//! use native::{NativeSettings, RusbTransport};
//!
//! # async fn run() -> Result<(), native::NativeError> {
//! let events = HostEventEmitter::new();
//! let transport = RusbTransport::new(events.clone(), NativeSettings::default())?;
//! let bridge = UsbBridge::new(transport, events);
//!
//! bridge.subscribe(|frame| println!("{} bytes in", frame.len()));
//! bridge.connect(0x2341, 0x0043).await?;
//! bridge.write(&[0x01, 0x02]).await?;
//! bridge.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod device;
pub mod error;
pub mod reader;
pub mod transport;

pub use device::{DeviceSummary, EndpointSpec, InterruptPair, list_devices, validate_layout};
pub use error::NativeError;
pub use reader::{InterruptIn, InterruptReader, ReaderSettings};
pub use transport::{NativeSettings, RusbTransport, build_write_payload};
