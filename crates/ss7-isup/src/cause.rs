//! Cause Indicators parameter: location + coding standard + cause value,
//! with an optional diagnostic tail.

use bytes::{Buf, BufMut, Bytes, BytesMut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cause {
    pub location: u8,
    pub coding_standard: u8,
    pub value: u8,
    pub diagnostic: Bytes,
}

impl Cause {
    pub fn new(location: u8, value: u8) -> Cause {
        Cause {
            location: location & 0x0f,
            coding_standard: 0,
            value: value & 0x7f,
            diagnostic: Bytes::new(),
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(0x80 | ((self.coding_standard & 0x03) << 5) | (self.location & 0x0f));
        buf.put_u8(0x80 | (self.value & 0x7f));
        buf.put_slice(&self.diagnostic);
    }

    pub fn decode(buf: &mut Bytes) -> Option<Cause> {
        if buf.remaining() < 2 {
            return None;
        }
        let b0 = buf.get_u8();
        let b1 = buf.get_u8();
        let diagnostic = buf.copy_to_bytes(buf.remaining());
        Some(Cause {
            location: b0 & 0x0f,
            coding_standard: (b0 >> 5) & 0x03,
            value: b1 & 0x7f,
            diagnostic,
        })
    }
}

/// Common cause values referenced by the per-call timer table.
pub mod value {
    pub const NORMAL_CLEARING: u8 = 16;
    pub const ADDRESS_INCOMPLETE: u8 = 28;
    pub const NO_CIRCUIT_AVAILABLE: u8 = 34;
    pub const NORMAL_UNSPECIFIED: u8 = 31;
    pub const TEMPORARY_FAILURE: u8 = 41;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_without_diagnostic() {
        let cause = Cause::new(0, value::NORMAL_CLEARING);
        let mut buf = BytesMut::new();
        cause.encode(&mut buf);
        let mut bytes = buf.freeze();
        assert_eq!(Cause::decode(&mut bytes), Some(cause));
    }
}
