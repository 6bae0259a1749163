use thiserror::Error;

/// Structural problems found while walking a protobuf buffer.
///
/// Any of these aborts decoding of the buffer that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("buffer truncated at offset {offset}: needed {needed} more byte(s)")]
    Truncated { offset: usize, needed: usize },
    #[error("declared length {declared} at offset {offset} exceeds remaining {remaining} byte(s)")]
    LengthOutOfBounds {
        offset: usize,
        declared: u64,
        remaining: usize,
    },
    #[error("varint at offset {offset} is longer than 10 bytes")]
    VarintOverflow { offset: usize },
    #[error("unsupported wire type {wire_type} at offset {offset}")]
    UnsupportedWireType { offset: usize, wire_type: u8 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_length_out_of_bounds() {
        let err = DecodeError::LengthOutOfBounds {
            offset: 3,
            declared: 40,
            remaining: 2,
        };
        assert_eq!(
            err.to_string(),
            "declared length 40 at offset 3 exceeds remaining 2 byte(s)"
        );
    }

    #[test]
    fn test_display_unsupported_wire_type() {
        let err = DecodeError::UnsupportedWireType {
            offset: 0,
            wire_type: 3,
        };
        assert_eq!(err.to_string(), "unsupported wire type 3 at offset 0");
    }
}
