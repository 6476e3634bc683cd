//! Network-management message codec: changeover/changeback, inhibition,
//! traffic restart, and route-set state broadcast. All net-mgmt messages
//! share an `h0|h1` heading octet followed by a message-specific body.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// The Q.707 test pattern carried by SLTM/SLTA.
pub const SLT_TEST_PATTERN: &[u8] = b"SLTSLTSLT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetMgmtMessage {
    /// Changeover Order: last FSN accepted on the failed link.
    Coo { last_fsn_received: u8 },
    /// Changeover Acknowledgment.
    Coa { last_fsn_received: u8 },
    /// Emergency Changeover Order (no historical FSN known).
    Eco,
    /// Emergency Changeover Acknowledgment.
    Eca,
    /// Changeback Declaration, with the changeback sequence byte.
    Cbd { sequence: u8 },
    /// Changeback Acknowledgment.
    Cba { sequence: u8 },
    Tfp { dpc: u32 },
    Tfa { dpc: u32 },
    Tfr { dpc: u32 },
    Rst,
    Rsr,
    Lin,
    Lun,
    Lia,
    Lua,
    Lfu,
    Llt,
    Lrt,
    Tra,
    Sltm { pattern: Bytes },
    Slta { pattern: Bytes },
}

impl NetMgmtMessage {
    fn kind_bits(&self) -> (u8, u8) {
        match self {
            NetMgmtMessage::Coo { .. } => (0x1, 0x1),
            NetMgmtMessage::Coa { .. } => (0x1, 0x2),
            NetMgmtMessage::Eco => (0x1, 0x3),
            NetMgmtMessage::Eca => (0x1, 0x4),
            NetMgmtMessage::Cbd { .. } => (0x1, 0x5),
            NetMgmtMessage::Cba { .. } => (0x1, 0x6),
            NetMgmtMessage::Tfp { .. } => (0x2, 0x1),
            NetMgmtMessage::Tfa { .. } => (0x2, 0x2),
            NetMgmtMessage::Tfr { .. } => (0x2, 0x3),
            NetMgmtMessage::Rst => (0x3, 0x1),
            NetMgmtMessage::Rsr => (0x3, 0x2),
            NetMgmtMessage::Lin => (0x4, 0x1),
            NetMgmtMessage::Lun => (0x4, 0x2),
            NetMgmtMessage::Lia => (0x4, 0x3),
            NetMgmtMessage::Lua => (0x4, 0x4),
            NetMgmtMessage::Lfu => (0x4, 0x5),
            NetMgmtMessage::Llt => (0x4, 0x6),
            NetMgmtMessage::Lrt => (0x4, 0x7),
            NetMgmtMessage::Tra => (0x5, 0x1),
            NetMgmtMessage::Sltm { .. } => (0x6, 0x1),
            NetMgmtMessage::Slta { .. } => (0x6, 0x2),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(16);
        let (h0, h1) = self.kind_bits();
        buf.put_u8((h1 << 4) | h0);
        match self {
            NetMgmtMessage::Coo { last_fsn_received } | NetMgmtMessage::Coa { last_fsn_received } => {
                buf.put_u8(*last_fsn_received);
            }
            NetMgmtMessage::Cbd { sequence } | NetMgmtMessage::Cba { sequence } => {
                buf.put_u8(*sequence);
            }
            NetMgmtMessage::Tfp { dpc } | NetMgmtMessage::Tfa { dpc } | NetMgmtMessage::Tfr { dpc } => {
                buf.put_uint_le(*dpc as u64, 3);
            }
            NetMgmtMessage::Sltm { pattern } | NetMgmtMessage::Slta { pattern } => {
                buf.put_u8(pattern.len() as u8);
                buf.put_slice(pattern);
            }
            NetMgmtMessage::Eco
            | NetMgmtMessage::Eca
            | NetMgmtMessage::Rst
            | NetMgmtMessage::Rsr
            | NetMgmtMessage::Lin
            | NetMgmtMessage::Lun
            | NetMgmtMessage::Lia
            | NetMgmtMessage::Lua
            | NetMgmtMessage::Lfu
            | NetMgmtMessage::Llt
            | NetMgmtMessage::Lrt
            | NetMgmtMessage::Tra => {}
        }
        buf.freeze()
    }

    pub fn decode(raw: &[u8]) -> Option<NetMgmtMessage> {
        let mut buf = Bytes::copy_from_slice(raw);
        if buf.remaining() < 1 {
            return None;
        }
        let heading = buf.get_u8();
        let h0 = heading & 0x0f;
        let h1 = (heading >> 4) & 0x0f;
        Some(match (h0, h1) {
            (0x1, 0x1) => NetMgmtMessage::Coo { last_fsn_received: buf.get_u8() },
            (0x1, 0x2) => NetMgmtMessage::Coa { last_fsn_received: buf.get_u8() },
            (0x1, 0x3) => NetMgmtMessage::Eco,
            (0x1, 0x4) => NetMgmtMessage::Eca,
            (0x1, 0x5) => NetMgmtMessage::Cbd { sequence: buf.get_u8() },
            (0x1, 0x6) => NetMgmtMessage::Cba { sequence: buf.get_u8() },
            (0x2, 0x1) => NetMgmtMessage::Tfp { dpc: buf.get_uint_le(3) as u32 },
            (0x2, 0x2) => NetMgmtMessage::Tfa { dpc: buf.get_uint_le(3) as u32 },
            (0x2, 0x3) => NetMgmtMessage::Tfr { dpc: buf.get_uint_le(3) as u32 },
            (0x3, 0x1) => NetMgmtMessage::Rst,
            (0x3, 0x2) => NetMgmtMessage::Rsr,
            (0x4, 0x1) => NetMgmtMessage::Lin,
            (0x4, 0x2) => NetMgmtMessage::Lun,
            (0x4, 0x3) => NetMgmtMessage::Lia,
            (0x4, 0x4) => NetMgmtMessage::Lua,
            (0x4, 0x5) => NetMgmtMessage::Lfu,
            (0x4, 0x6) => NetMgmtMessage::Llt,
            (0x4, 0x7) => NetMgmtMessage::Lrt,
            (0x5, 0x1) => NetMgmtMessage::Tra,
            (0x6, 0x1) => {
                let len = buf.get_u8() as usize;
                if buf.remaining() < len {
                    return None;
                }
                NetMgmtMessage::Sltm { pattern: buf.copy_to_bytes(len) }
            }
            (0x6, 0x2) => {
                let len = buf.get_u8() as usize;
                if buf.remaining() < len {
                    return None;
                }
                NetMgmtMessage::Slta { pattern: buf.copy_to_bytes(len) }
            }
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_each_message_kind() {
        let samples = vec![
            NetMgmtMessage::Coo { last_fsn_received: 5 },
            NetMgmtMessage::Coa { last_fsn_received: 9 },
            NetMgmtMessage::Eco,
            NetMgmtMessage::Eca,
            NetMgmtMessage::Cbd { sequence: 1 },
            NetMgmtMessage::Cba { sequence: 1 },
            NetMgmtMessage::Tfp { dpc: 0x01_0203 },
            NetMgmtMessage::Tfa { dpc: 0x01_0203 },
            NetMgmtMessage::Tfr { dpc: 0x01_0203 },
            NetMgmtMessage::Rst,
            NetMgmtMessage::Rsr,
            NetMgmtMessage::Lin,
            NetMgmtMessage::Lun,
            NetMgmtMessage::Lia,
            NetMgmtMessage::Lua,
            NetMgmtMessage::Lfu,
            NetMgmtMessage::Llt,
            NetMgmtMessage::Lrt,
            NetMgmtMessage::Tra,
            NetMgmtMessage::Sltm { pattern: Bytes::from_static(SLT_TEST_PATTERN) },
            NetMgmtMessage::Slta { pattern: Bytes::from_static(SLT_TEST_PATTERN) },
        ];
        for msg in samples {
            let encoded = msg.encode();
            assert_eq!(NetMgmtMessage::decode(&encoded), Some(msg));
        }
    }

    #[test]
    fn unknown_heading_fails_to_decode() {
        assert_eq!(NetMgmtMessage::decode(&[0xff]), None);
    }
}
