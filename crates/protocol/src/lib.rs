//! Framing library for usb-bridge
//!
//! The native USB boundary only carries text, so binary frames travel across it
//! as hex strings. This crate owns that convention: encoding outbound bytes,
//! decoding inbound text (strictly or leniently), and the channel and event
//! names both sides of the bridge agree on.
//!
//! # Example
//!
//! ```
//! use protocol::{DecodeMode, decode_hex, encode_hex};
//!
//! let text = encode_hex(&[0x0a, 0xff]);
//! assert_eq!(text, "0aff");
//!
//! let bytes = decode_hex(&text, DecodeMode::Strict).unwrap();
//! assert_eq!(bytes.as_ref(), &[0x0a, 0xff]);
//! ```

pub mod codec;
pub mod error;
pub mod types;

pub use codec::{decode_hex, decode_hex_lenient, decode_hex_strict, encode_hex};
pub use error::{ProtocolError, Result};
pub use types::{DATA_EVENT, DecodeMode, USB_DATA_CHANNEL};
