//! Range-and-status parameter shared by the group-supervision messages
//! (GRS/GRA/CGB/CGU/CGBA/CGUA/CQM/CQR): a range byte plus an optional
//! bitmap of up to 32 CIC statuses.

use bytes::{Buf, BufMut, Bytes, BytesMut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeAndStatus {
    /// Range + 1 is the number of CICs covered, starting at the message's CIC.
    pub range: u8,
    /// One bit per CIC in range order; empty for request messages (GRS/CQM)
    /// that carry no status of their own.
    pub status: Vec<bool>,
}

impl RangeAndStatus {
    pub fn request(range: u8) -> RangeAndStatus {
        RangeAndStatus { range, status: Vec::new() }
    }

    pub fn with_status(range: u8, status: Vec<bool>) -> RangeAndStatus {
        RangeAndStatus { range, status }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.range);
        if self.status.is_empty() {
            return;
        }
        for byte_bits in self.status.chunks(8) {
            let mut byte = 0u8;
            for (i, bit) in byte_bits.iter().enumerate() {
                if *bit {
                    byte |= 1 << i;
                }
            }
            buf.put_u8(byte);
        }
    }

    pub fn decode(buf: &mut Bytes) -> Option<RangeAndStatus> {
        if buf.remaining() < 1 {
            return None;
        }
        let range = buf.get_u8();
        let n = range as usize + 1;
        if buf.remaining() == 0 {
            return Some(RangeAndStatus::request(range));
        }
        let expected_bytes = n.div_ceil(8);
        if buf.remaining() < expected_bytes {
            return None;
        }
        let bytes = buf.copy_to_bytes(expected_bytes);
        let mut status = Vec::with_capacity(n);
        for i in 0..n {
            let byte = bytes[i / 8];
            status.push(byte & (1 << (i % 8)) != 0);
        }
        Some(RangeAndStatus { range, status })
    }

    /// Whether `other`, sent as a request, is a subset of the CICs this
    /// status superset covers — used to validate A-messages against what
    /// was requested.
    pub fn is_superset_of(&self, other: &RangeAndStatus) -> bool {
        self.range >= other.range
    }
}
