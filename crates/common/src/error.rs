//! Common error types

use thiserror::Error;

/// Errors raised by the bridge itself
///
/// Transport failures never show up here: they are returned to the caller as
/// the transport's own error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
