//! Hex framing for the text-only native boundary
//!
//! Frames cross the native boundary as hex text: lowercase, two digits per
//! byte, no separators and no prefix.
//!
//! ```text
//! [0x0A, 0xFF]  <->  "0aff"
//! []            <->  ""
//! ```
//!
//! Decoding comes in two flavours, selected with [`DecodeMode`]:
//!
//! - [`decode_hex_strict`] rejects odd-length text and any non-hex character.
//! - [`decode_hex_lenient`] never fails. It walks the text two UTF-16 code
//!   units at a time and parses each chunk the way JavaScript's
//!   `parseInt(chunk, 16)` does, storing the result with `Uint8Array`
//!   semantics. A trailing single unit becomes its own byte and unparsable
//!   chunks become `0`.

use crate::{DecodeMode, error::ProtocolError, error::Result};
use bytes::{BufMut, Bytes, BytesMut};

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Encode bytes as lowercase hex text
///
/// # Example
/// ```
/// use protocol::encode_hex;
///
/// assert_eq!(encode_hex(&[0x00, 0x10, 0xff]), "0010ff");
/// assert_eq!(encode_hex(&[]), "");
/// ```
pub fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        out.push(HEX_DIGITS[(byte >> 4) as usize] as char);
        out.push(HEX_DIGITS[(byte & 0x0f) as usize] as char);
    }
    out
}

/// Decode hex text using the given mode
pub fn decode_hex(text: &str, mode: DecodeMode) -> Result<Bytes> {
    match mode {
        DecodeMode::Strict => decode_hex_strict(text),
        DecodeMode::Lenient => Ok(decode_hex_lenient(text)),
    }
}

/// Decode hex text, rejecting anything that is not well-formed
///
/// Upper and lower case digits are both accepted. Offsets in
/// [`ProtocolError::InvalidCharacter`] count characters, not bytes.
///
/// # Example
/// ```
/// use protocol::{ProtocolError, decode_hex_strict};
///
/// assert_eq!(decode_hex_strict("0a1b").unwrap().as_ref(), &[10, 27]);
/// assert_eq!(
///     decode_hex_strict("0a1"),
///     Err(ProtocolError::OddLength { len: 3 })
/// );
/// ```
pub fn decode_hex_strict(text: &str) -> Result<Bytes> {
    let len = text.chars().count();
    if len % 2 != 0 {
        return Err(ProtocolError::OddLength { len });
    }

    let mut out = BytesMut::with_capacity(len / 2);
    let mut high: Option<u8> = None;

    for (offset, found) in text.chars().enumerate() {
        let nibble = found
            .to_digit(16)
            .ok_or(ProtocolError::InvalidCharacter { found, offset })? as u8;

        match high.take() {
            Some(high) => out.put_u8((high << 4) | nibble),
            None => high = Some(nibble),
        }
    }

    Ok(out.freeze())
}

/// Decode hex text without validation
///
/// # Example
/// ```
/// use protocol::decode_hex_lenient;
///
/// // Trailing nibble is parsed on its own
/// assert_eq!(decode_hex_lenient("0a1").as_ref(), &[0x0a, 0x01]);
/// // Parsing stops at the first non-hex digit of a chunk
/// assert_eq!(decode_hex_lenient("1g").as_ref(), &[0x01]);
/// // A chunk with no digits at all stores zero
/// assert_eq!(decode_hex_lenient("zz").as_ref(), &[0x00]);
/// ```
pub fn decode_hex_lenient(text: &str) -> Bytes {
    let units: Vec<u16> = text.encode_utf16().collect();
    let mut out = BytesMut::with_capacity(units.len().div_ceil(2));

    for chunk in units.chunks(2) {
        out.put_u8(parse_chunk(chunk));
    }

    out.freeze()
}

/// `parseInt(chunk, 16)` stored into a `Uint8Array` slot
fn parse_chunk(chunk: &[u16]) -> u8 {
    let start = chunk
        .iter()
        .position(|&unit| !is_js_whitespace(unit))
        .unwrap_or(chunk.len());
    let mut rest = &chunk[start..];

    let negative = match rest.first() {
        Some(&unit) if unit == u16::from(b'-') => {
            rest = &rest[1..];
            true
        }
        Some(&unit) if unit == u16::from(b'+') => {
            rest = &rest[1..];
            false
        }
        _ => false,
    };

    if let [zero, x, tail @ ..] = rest
        && *zero == u16::from(b'0')
        && (*x == u16::from(b'x') || *x == u16::from(b'X'))
    {
        rest = tail;
    }

    let mut value: i32 = 0;
    let mut digits = 0;
    for &unit in rest {
        match hex_digit(unit) {
            Some(d) => {
                value = value * 16 + d as i32;
                digits += 1;
            }
            None => break,
        }
    }

    // NaN converts to 0
    if digits == 0 {
        return 0;
    }

    let value = if negative { -value } else { value };
    value.rem_euclid(256) as u8
}

/// Hex value of one UTF-16 unit; surrogate halves are never digits
fn hex_digit(unit: u16) -> Option<u32> {
    char::from_u32(u32::from(unit)).and_then(|c| c.to_digit(16))
}

/// ECMAScript WhiteSpace and LineTerminator code units
fn is_js_whitespace(unit: u16) -> bool {
    matches!(
        unit,
        0x0009 // tab
            | 0x000a // line feed
            | 0x000b // vertical tab
            | 0x000c // form feed
            | 0x000d // carriage return
            | 0x0020
            | 0x00a0
            | 0x1680
            | 0x2000..=0x200a
            | 0x2028
            | 0x2029
            | 0x202f
            | 0x205f
            | 0x3000
            | 0xfeff
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_lowercase_no_separators() {
        assert_eq!(encode_hex(&[0x0a, 0xff]), "0aff");
        assert_eq!(encode_hex(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
    }

    #[test]
    fn test_encode_empty() {
        assert_eq!(encode_hex(&[]), "");
    }

    #[test]
    fn test_strict_accepts_uppercase() {
        let bytes = decode_hex_strict("0AFF").unwrap();
        assert_eq!(bytes.as_ref(), &[0x0a, 0xff]);
    }

    #[test]
    fn test_strict_empty() {
        assert!(decode_hex_strict("").unwrap().is_empty());
    }

    #[test]
    fn test_strict_odd_length_checked_before_characters() {
        assert_eq!(
            decode_hex_strict("0g1"),
            Err(ProtocolError::OddLength { len: 3 })
        );
    }

    #[test]
    fn test_strict_invalid_character_offset() {
        assert_eq!(
            decode_hex_strict("00zz"),
            Err(ProtocolError::InvalidCharacter {
                found: 'z',
                offset: 2
            })
        );
    }

    #[test]
    fn test_strict_counts_characters_not_bytes() {
        // "é" is two bytes in UTF-8 but one character
        assert_eq!(
            decode_hex_strict("0é"),
            Err(ProtocolError::InvalidCharacter {
                found: 'é',
                offset: 1
            })
        );
    }

    #[test]
    fn test_lenient_matches_strict_on_valid_input() {
        let text = "00017f80fe0aFF";
        assert_eq!(decode_hex_lenient(text), decode_hex_strict(text).unwrap());
    }

    #[test]
    fn test_lenient_trailing_nibble() {
        assert_eq!(decode_hex_lenient("0a1").as_ref(), &[0x0a, 0x01]);
        assert_eq!(decode_hex_lenient("f").as_ref(), &[0x0f]);
    }

    #[test]
    fn test_lenient_parse_int_quirks() {
        // leading whitespace is skipped
        assert_eq!(decode_hex_lenient(" a").as_ref(), &[0x0a]);
        // sign is honoured and wraps modulo 256
        assert_eq!(decode_hex_lenient("-1").as_ref(), &[0xff]);
        assert_eq!(decode_hex_lenient("+f").as_ref(), &[0x0f]);
        // "0x" prefix is stripped, leaving nothing to parse
        assert_eq!(decode_hex_lenient("0x").as_ref(), &[0x00]);
        // stops at the first non-hex digit
        assert_eq!(decode_hex_lenient("9z").as_ref(), &[0x09]);
        // no digits at all
        assert_eq!(decode_hex_lenient("g1").as_ref(), &[0x00]);
        assert_eq!(decode_hex_lenient("-").as_ref(), &[0x00]);
    }

    #[test]
    fn test_lenient_chunks_on_utf16_units() {
        // U+1F600 is a surrogate pair, so it fills or splits a chunk
        assert_eq!(decode_hex_lenient("a\u{1F600}").as_ref(), &[0x0a, 0x00]);
        assert_eq!(decode_hex_lenient("\u{1F600}a").as_ref(), &[0x00, 0x0a]);
        assert_eq!(decode_hex_lenient("\u{1F600}\u{1F600}1").as_ref(), &[0, 0, 1]);
    }

    #[test]
    fn test_lenient_whitespace_set() {
        // NEL is not ECMAScript whitespace
        assert_eq!(decode_hex_lenient("\u{85}a").as_ref(), &[0x00]);
        assert_eq!(decode_hex_lenient("\u{a0}a").as_ref(), &[0x0a]);
        assert_eq!(decode_hex_lenient("\u{2028}b").as_ref(), &[0x0b]);
        assert_eq!(decode_hex_lenient("\u{feff}c").as_ref(), &[0x0c]);
        assert_eq!(decode_hex_lenient("\u{3000}d").as_ref(), &[0x0d]);
    }

    #[test]
    fn test_decode_dispatches_on_mode() {
        assert!(decode_hex("0a1", DecodeMode::Strict).is_err());
        assert_eq!(
            decode_hex("0a1", DecodeMode::Lenient).unwrap().as_ref(),
            &[0x0a, 0x01]
        );
    }
}
