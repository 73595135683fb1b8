//! Shared constants and decoding options

use serde::{Deserialize, Serialize};

/// Event-source channel the native transport publishes inbound hex frames on
pub const USB_DATA_CHANNEL: &str = "usbData";

/// Event name under which the bridge re-emits decoded frames
pub const DATA_EVENT: &str = "data";

/// How inbound hex text is turned back into bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeMode {
    /// Reject odd-length text and non-hex characters
    #[default]
    Strict,
    /// Never fail; reproduce `parseInt(pair, 16)` per two-character chunk
    Lenient,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode_is_strict() {
        assert_eq!(DecodeMode::default(), DecodeMode::Strict);
    }

    #[test]
    fn test_mode_serde_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: DecodeMode,
        }

        let parsed: Wrapper = toml::from_str("mode = \"lenient\"").unwrap();
        assert_eq!(parsed.mode, DecodeMode::Lenient);
    }
}
