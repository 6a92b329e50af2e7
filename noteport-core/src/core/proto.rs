//! Minimal reader for the length-prefixed, tagged binary message format used
//! by note bodies and mergeable data.
//!
//! Messages are sequences of `(field number, wire type)` keys followed by a
//! varint, a fixed-width value or a length-delimited byte run. The reader is a
//! flat iterator over one message level; nested messages are read by calling
//! [`fields`] again on a field's bytes. Fields a caller does not recognise are
//! simply not matched, which is how newer producer releases are tolerated.

use crate::core::error::DecodeError;

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

/// A decoded field payload, borrowing from the message buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WireValue<'a> {
    Varint(u64),
    Fixed64(u64),
    Bytes(&'a [u8]),
    Fixed32(u32),
}

/// One field of a message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field<'a> {
    pub number: u32,
    pub value: WireValue<'a>,
}

impl<'a> Field<'a> {
    /// Payload of a length-delimited field (string, bytes or sub-message).
    pub fn bytes(&self) -> Result<&'a [u8], DecodeError> {
        match self.value {
            WireValue::Bytes(b) => Ok(b),
            _ => Err(self.wrong_type("length-delimited")),
        }
    }

    /// UTF-8 text of a length-delimited field. Invalid sequences are replaced,
    /// never rejected, so user text is not dropped over one bad byte.
    pub fn string(&self) -> Result<String, DecodeError> {
        Ok(String::from_utf8_lossy(self.bytes()?).into_owned())
    }

    pub fn uint(&self) -> Result<u64, DecodeError> {
        match self.value {
            WireValue::Varint(v) | WireValue::Fixed64(v) => Ok(v),
            WireValue::Fixed32(v) => Ok(u64::from(v)),
            WireValue::Bytes(_) => Err(self.wrong_type("integer")),
        }
    }

    /// Signed view of an `int32`/`int64` varint (negative values are sign-extended to 64 bits).
    pub fn int(&self) -> Result<i64, DecodeError> {
        self.uint().map(|v| v as i64)
    }

    pub fn float(&self) -> Result<f32, DecodeError> {
        match self.value {
            WireValue::Fixed32(v) => Ok(f32::from_bits(v)),
            _ => Err(self.wrong_type("fixed32")),
        }
    }

    fn wrong_type(&self, expected: &str) -> DecodeError {
        DecodeError::Malformed(format!("field {} is not {expected}", self.number))
    }
}

/// Iterator over the fields of one message level.
///
/// After the first error the iterator is exhausted.
#[derive(Debug, Clone)]
pub struct Fields<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

/// Starts reading the fields of the message in `buf`.
pub fn fields(buf: &[u8]) -> Fields<'_> {
    Fields { buf, pos: 0, failed: false }
}

impl<'a> Fields<'a> {
    fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let start = self.pos;
        let mut value: u64 = 0;
        for shift in (0..70).step_by(7) {
            let byte = *self.buf.get(self.pos).ok_or(DecodeError::Truncated(self.pos))?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << shift.min(63);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(DecodeError::VarintOverflow(start))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(len).ok_or(DecodeError::Truncated(self.pos))?;
        let slice = self.buf.get(self.pos..end).ok_or(DecodeError::Truncated(self.pos))?;
        self.pos = end;
        Ok(slice)
    }

    fn read_field(&mut self) -> Result<Field<'a>, DecodeError> {
        let key = self.read_varint()?;
        let number = u32::try_from(key >> 3)
            .map_err(|_| DecodeError::Malformed(format!("field number {} out of range", key >> 3)))?;
        if number == 0 {
            return Err(DecodeError::Malformed("field number 0".to_string()));
        }
        let wire_type = (key & 0x7) as u8;
        let value = match wire_type {
            WIRE_VARINT => WireValue::Varint(self.read_varint()?),
            WIRE_FIXED64 => {
                let b = self.take(8)?;
                WireValue::Fixed64(u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            }
            WIRE_LEN => {
                let len = usize::try_from(self.read_varint()?)
                    .map_err(|_| DecodeError::Truncated(self.pos))?;
                WireValue::Bytes(self.take(len)?)
            }
            WIRE_FIXED32 => {
                let b = self.take(4)?;
                WireValue::Fixed32(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            }
            other => return Err(DecodeError::UnsupportedWireType { field: number, wire_type: other }),
        };
        Ok(Field { number, value })
    }
}

impl<'a> Iterator for Fields<'a> {
    type Item = Result<Field<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.buf.len() {
            return None;
        }
        let result = self.read_field();
        self.failed = result.is_err();
        Some(result)
    }
}


#[cfg(test)]
mod tests {
    use super::encode::Message;
    use super::*;

    #[test]
    fn test_reads_each_wire_type() {
        let mut buf = Message::new()
            .varint(1, 300)
            .string(2, "hi")
            .float(3, 1.5)
            .finish();
        // field 4, fixed64
        buf.push((4 << 3) | 1);
        buf.extend_from_slice(&7u64.to_le_bytes());

        let got: Vec<Field> = fields(&buf).collect::<Result<_, _>>().unwrap();
        assert_eq!(got.len(), 4);
        assert_eq!(got[0].uint().unwrap(), 300);
        assert_eq!(got[1].string().unwrap(), "hi");
        assert_eq!(got[2].float().unwrap(), 1.5);
        assert_eq!(got[3].uint().unwrap(), 7);
    }

    #[test]
    fn test_negative_int32_is_sign_extended() {
        let buf = Message::new().int(1, -1).finish();
        let f = fields(&buf).next().unwrap().unwrap();
        assert_eq!(f.int().unwrap(), -1);
    }

    #[test]
    fn test_truncated_length_is_an_error() {
        let mut buf = Message::new().string(1, "hello").finish();
        buf.truncate(buf.len() - 2);
        let results: Vec<_> = fields(&buf).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(DecodeError::Truncated(_))));
    }

    #[test]
    fn test_group_wire_type_is_rejected() {
        let buf = [(5 << 3) | 3u8, 0];
        let first = fields(&buf).next().unwrap();
        assert_eq!(first, Err(DecodeError::UnsupportedWireType { field: 5, wire_type: 3 }));
    }

    #[test]
    fn test_varint_overflow() {
        let buf = [0x08, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        assert!(matches!(fields(&buf).next(), Some(Err(DecodeError::VarintOverflow(_)))));
    }

    #[test]
    fn test_type_mismatch_is_malformed() {
        let buf = Message::new().varint(1, 3).finish();
        let f = fields(&buf).next().unwrap().unwrap();
        assert!(matches!(f.bytes(), Err(DecodeError::Malformed(_))));
    }
}
