//! UTF-16 binary-to-text codec used by the challenge and token exchange.
//!
//! The upstream service does not base64 the UTF-8 bytes of its payloads. It
//! treats every UTF-16 code unit of a string as two little-endian bytes and
//! base64-encodes that buffer. [`to_binary`] and [`from_binary`] are exact
//! inverses of the service's own `toBinary`/`fromBinary` helpers.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;

/// Standard alphabet, padding optional on decode (the service is not strict about it).
const ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("decoded payload has odd length {0}; expected whole UTF-16 code units")]
    OddLength(usize),

    #[error("decoded payload is not valid UTF-16")]
    InvalidUtf16,
}

/// Encode `text` as base64 over its little-endian UTF-16 code units.
pub fn to_binary(text: &str) -> String {
    let mut bytes = Vec::with_capacity(text.len() * 2);
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    ENGINE.encode(bytes)
}

/// Decode a payload produced by [`to_binary`] (or by the service).
pub fn from_binary(encoded: &str) -> Result<String, CodecError> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = ENGINE.decode(compact.as_bytes())?;
    if bytes.len() % 2 != 0 {
        return Err(CodecError::OddLength(bytes.len()));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| CodecError::InvalidUtf16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_code_units_little_endian() {
        // "A" -> [0x41, 0x00]
        assert_eq!(to_binary("A"), "QQA=");
        assert_eq!(to_binary(""), "");
    }

    #[test]
    fn round_trips_printable_and_control_characters() {
        let samples = [
            "",
            "hello world",
            "{\"r\":[1,2,\"mark\"],\"t\":\"1700000000\"}",
            "\u{0}\u{1}\u{7}\u{8}\t\n\r\u{1b}\u{7f}",
            "quotes \" and backslash \\",
            "caf\u{e9} \u{4e2d}\u{6587} \u{1f600}",
            "\u{ffff}\u{fffe}\u{d7ff}\u{e000}",
        ];
        for sample in samples {
            let encoded = to_binary(sample);
            assert_eq!(from_binary(&encoded).unwrap(), sample, "sample {:?}", sample);
        }
    }

    #[test]
    fn round_trips_every_ascii_code_point() {
        let all: String = (0u8..=127).map(char::from).collect();
        assert_eq!(from_binary(&to_binary(&all)).unwrap(), all);
    }

    #[test]
    fn is_not_plain_base64() {
        use base64::engine::general_purpose::STANDARD;
        assert_ne!(to_binary("token"), STANDARD.encode("token"));
    }

    #[test]
    fn tolerates_missing_padding_and_whitespace() {
        assert_eq!(from_binary("QQA").unwrap(), "A");
        assert_eq!(from_binary(" QQA=\n").unwrap(), "A");
    }

    #[test]
    fn rejects_odd_byte_counts() {
        use base64::engine::general_purpose::STANDARD;
        let odd = STANDARD.encode([0x41u8, 0x00, 0x42]);
        assert!(matches!(from_binary(&odd), Err(CodecError::OddLength(3))));
    }

    #[test]
    fn rejects_lone_surrogates() {
        use base64::engine::general_purpose::STANDARD;
        let lone = STANDARD.encode(0xD800u16.to_le_bytes());
        assert!(matches!(from_binary(&lone), Err(CodecError::InvalidUtf16)));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(from_binary("***"), Err(CodecError::Base64(_))));
    }
}
