//! Protocol error types

use thiserror::Error;

/// Errors raised while decoding a hex frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Hex text must carry two digits per byte
    #[error("Odd-length hex frame: {len} characters")]
    OddLength { len: usize },

    /// A character outside `[0-9a-fA-F]` was found
    #[error("Invalid hex character {found:?} at offset {offset}")]
    InvalidCharacter { found: char, offset: usize },
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
