use super::error::DecodeError;

/// Longest legal varint encoding of a `u64`.
const MAX_VARINT_LEN: usize = 10;

/// The protobuf wire types this decoder understands.
///
/// Groups (3 and 4) are deprecated and never appear in GTFS-RT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
}

impl WireType {
    fn from_raw(raw: u8, offset: usize) -> Result<Self, DecodeError> {
        match raw {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            5 => Ok(WireType::Fixed32),
            wire_type => Err(DecodeError::UnsupportedWireType { offset, wire_type }),
        }
    }
}

/// A decoded field key: `field number << 3 | wire type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub field: u32,
    pub wire: WireType,
}

/// Read position over a borrowed protobuf buffer.
///
/// Every read is bounds-checked against the buffer; slices returned by
/// [`ByteCursor::read_length_delimited`] borrow from the original buffer.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset >= self.buf.len()
    }

    /// Reads a base-128 varint, 7 bits per byte, least significant group first.
    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let start = self.offset;
        let mut value = 0u64;

        for i in 0..MAX_VARINT_LEN {
            let Some(&byte) = self.buf.get(self.offset) else {
                return Err(DecodeError::Truncated {
                    offset: self.offset,
                    needed: 1,
                });
            };
            self.offset += 1;
            value |= u64::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }

        Err(DecodeError::VarintOverflow { offset: start })
    }

    /// Reads a field key and splits it into field number and wire type.
    pub fn read_tag(&mut self) -> Result<Tag, DecodeError> {
        let offset = self.offset;
        let key = self.read_varint()?;
        let wire = WireType::from_raw((key & 0x7) as u8, offset)?;
        Ok(Tag {
            field: (key >> 3) as u32,
            wire,
        })
    }

    /// Reads a varint length prefix and returns exactly that many bytes.
    pub fn read_length_delimited(&mut self) -> Result<&'a [u8], DecodeError> {
        let offset = self.offset;
        let declared = self.read_varint()?;
        let remaining = self.remaining();
        if declared > remaining as u64 {
            return Err(DecodeError::LengthOutOfBounds {
                offset,
                declared,
                remaining,
            });
        }
        self.take(declared as usize)
    }

    /// Length-delimited payload interpreted as UTF-8, replacing invalid sequences.
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let bytes = self.read_length_delimited()?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn read_fixed32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        self.read_fixed32().map(f32::from_bits)
    }

    pub fn read_fixed64(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Advances past one field payload without interpreting it.
    pub fn skip_field(&mut self, wire: WireType) -> Result<(), DecodeError> {
        match wire {
            WireType::Varint => self.read_varint().map(drop),
            WireType::Fixed64 => self.take(8).map(drop),
            WireType::LengthDelimited => self.read_length_delimited().map(drop),
            WireType::Fixed32 => self.take(4).map(drop),
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(DecodeError::Truncated {
                offset: self.offset,
                needed: len - remaining,
            });
        }
        let slice = &self.buf[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }
}
