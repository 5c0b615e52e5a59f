use core::fmt::{self, Write};
use core::num::ParseIntError;
use heapless::{String, Vec};

pub fn decode_hex<const N: usize>(s: &str) -> Result<Vec<u8, N>, DecodeHexError> {
    if s.len() % 2 != 0 {
        return Err(DecodeHexError::OddLength);
    }
    let mut out = Vec::new();
    for i in (0..s.len()).step_by(2) {
        let byte = u8::from_str_radix(&s[i..i + 2], 16).map_err(DecodeHexError::ParseInt)?;
        out.push(byte).map_err(|_| DecodeHexError::Overflow)?;
    }
    Ok(out)
}

/// Two uppercase hex digits per byte, as USSD payloads are sent on the wire.
pub fn encode_hex<const N: usize>(bytes: &[u8]) -> Result<String<N>, EncodeHexError> {
    let mut out = String::new();
    for b in bytes {
        write!(out, "{:02X}", b).map_err(|_| EncodeHexError)?;
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeHexError {
    OddLength,
    Overflow,
    ParseInt(ParseIntError),
}

impl fmt::Display for DecodeHexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeHexError::OddLength => "input string has an odd number of bytes".fmt(f),
            DecodeHexError::Overflow => "decoded bytes exceed the output capacity".fmt(f),
            DecodeHexError::ParseInt(e) => e.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeHexError;

impl fmt::Display for EncodeHexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        "encoded string exceeds the output capacity".fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_uppercase_pairs() {
        let s = encode_hex::<16>(b"*10#").unwrap();
        assert_eq!(s.as_str(), "2A313023");
    }

    #[test]
    fn round_trips_arbitrary_bytes() {
        let data: [u8; 6] = [0x00, 0x7F, 0x80, 0xFF, 0x1A, 0x41];
        let encoded = encode_hex::<12>(&data).unwrap();
        let decoded = decode_hex::<6>(&encoded).unwrap();
        assert_eq!(decoded.as_slice(), &data);
    }

    #[test]
    fn odd_length_is_rejected() {
        assert_eq!(decode_hex::<4>("ABC"), Err(DecodeHexError::OddLength));
    }

    #[test]
    fn invalid_digits_are_rejected() {
        assert!(matches!(
            decode_hex::<4>("4G"),
            Err(DecodeHexError::ParseInt(_))
        ));
    }

    #[test]
    fn capacity_overflow_is_reported() {
        assert_eq!(decode_hex::<1>("AABB"), Err(DecodeHexError::Overflow));
        assert_eq!(encode_hex::<2>(&[1, 2]), Err(EncodeHexError));
    }
}
