//! Native transport errors
//!
//! Every variant maps to a short string code through [`NativeError::code`] so
//! that application code can branch on a stable identifier regardless of the
//! message text.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NativeError {
    #[error("No USB device found matching vendor ID {vendor_id} and product ID {product_id}")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },

    #[error("Permission denied for device")]
    PermissionDenied,

    #[error("Could not find device interface")]
    InterfaceNotFound,

    #[error("Could not find device endpoints")]
    EndpointsNotFound,

    #[error("First endpoint is not interrupt type")]
    FirstEndpointNotInterrupt,

    #[error("First endpoint direction is not in")]
    FirstEndpointNotIn,

    #[error("Second endpoint is not interrupt type")]
    SecondEndpointNotInterrupt,

    #[error("Second endpoint direction is not out")]
    SecondEndpointNotOut,

    #[error("Failed opening USB device: {0}")]
    OpenFailed(rusb::Error),

    #[error("No USB devices found: {0}")]
    Enumeration(rusb::Error),

    #[error("No USB connection established")]
    NotConnected,

    #[error("Malformed write payload: {0}")]
    MalformedPayload(#[from] protocol::ProtocolError),

    #[error("Write payload too large: {size} bytes (max packet size: {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Write request failed: {0}")]
    WriteFailed(rusb::Error),

    #[error("No USB connection to close")]
    NoConnection,

    #[error("USB context error: {0}")]
    Context(rusb::Error),

    #[error("USB worker failed: {0}")]
    Worker(String),
}

impl NativeError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::DeviceNotFound { .. } => "E100",
            Self::PermissionDenied => "E102",
            Self::InterfaceNotFound => "E103",
            Self::EndpointsNotFound => "E104",
            Self::FirstEndpointNotInterrupt => "E105",
            Self::FirstEndpointNotIn => "E106",
            Self::SecondEndpointNotInterrupt => "E107",
            Self::SecondEndpointNotOut => "E108",
            Self::OpenFailed(_) => "E109",
            Self::Enumeration(_) => "E110",
            Self::NotConnected => "E200",
            Self::MalformedPayload(_) | Self::PayloadTooLarge { .. } | Self::WriteFailed(_) => {
                "E201"
            }
            Self::NoConnection => "E400",
            Self::Context(_) | Self::Worker(_) => "E500",
        }
    }
}
