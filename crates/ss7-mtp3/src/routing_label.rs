//! Routing-label and SIO codecs. Bit-exact per variant.

use bytes::{Buf, BufMut, Bytes, BytesMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Itu,
    Ansi,
}

/// (OPC, DPC, SLS) prefix present on every MSU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingLabel {
    pub opc: u32,
    pub dpc: u32,
    pub sls: u8,
}

impl RoutingLabel {
    pub fn encode(&self, variant: Variant, buf: &mut BytesMut) {
        match variant {
            Variant::Ansi => {
                buf.put_uint_le(self.dpc as u64 & 0xff_ffff, 3);
                buf.put_uint_le(self.opc as u64 & 0xff_ffff, 3);
                buf.put_u8(self.sls);
            }
            Variant::Itu => {
                // 14-bit DPC, 14-bit OPC, 4-bit SLS packed little-endian
                // across 4 octets, matching Q.704 figure 5.
                let packed: u32 = (self.dpc & 0x3fff)
                    | ((self.opc & 0x3fff) << 14)
                    | ((self.sls as u32 & 0x0f) << 28);
                buf.put_u32_le(packed);
            }
        }
    }

    pub fn decode(variant: Variant, buf: &mut Bytes) -> Option<RoutingLabel> {
        match variant {
            Variant::Ansi => {
                if buf.remaining() < 7 {
                    return None;
                }
                let dpc = buf.get_uint_le(3) as u32;
                let opc = buf.get_uint_le(3) as u32;
                let sls = buf.get_u8();
                Some(RoutingLabel { opc, dpc, sls })
            }
            Variant::Itu => {
                if buf.remaining() < 4 {
                    return None;
                }
                let packed = buf.get_u32_le();
                Some(RoutingLabel {
                    dpc: packed & 0x3fff,
                    opc: (packed >> 14) & 0x3fff,
                    sls: ((packed >> 28) & 0x0f) as u8,
                })
            }
        }
    }

    pub fn encoded_len(variant: Variant) -> usize {
        match variant {
            Variant::Ansi => 7,
            Variant::Itu => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserPart {
    NetMng,
    Sltm,
    SltmSpare,
    Sccp,
    Isup,
    Other(u8),
}

impl UserPart {
    fn from_bits(v: u8) -> UserPart {
        match v {
            0 => UserPart::NetMng,
            1 => UserPart::Sltm,
            2 => UserPart::SltmSpare,
            3 => UserPart::Sccp,
            5 => UserPart::Isup,
            other => UserPart::Other(other),
        }
    }

    fn to_bits(self) -> u8 {
        match self {
            UserPart::NetMng => 0,
            UserPart::Sltm => 1,
            UserPart::SltmSpare => 2,
            UserPart::Sccp => 3,
            UserPart::Isup => 5,
            UserPart::Other(v) => v,
        }
    }
}

/// Service Information Octet: `(NI<<6) | (priority<<4, ANSI only) | user-part`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sio {
    pub ni: u8,
    pub priority: u8,
    pub user_part: UserPart,
}

impl Sio {
    pub fn encode(&self, variant: Variant) -> u8 {
        let prio = if variant == Variant::Ansi { self.priority & 0x03 } else { 0 };
        ((self.ni & 0x03) << 6) | (prio << 4) | (self.user_part.to_bits() & 0x0f)
    }

    pub fn decode(variant: Variant, byte: u8) -> Sio {
        let ni = (byte >> 6) & 0x03;
        let priority = if variant == Variant::Ansi { (byte >> 4) & 0x03 } else { 0 };
        let user_part = UserPart::from_bits(byte & 0x0f);
        Sio { ni, priority, user_part }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn itu_roundtrip_boundary() {
        let label = RoutingLabel { opc: 0x3fff, dpc: 0, sls: 0x0f };
        let mut buf = BytesMut::new();
        label.encode(Variant::Itu, &mut buf);
        let mut bytes = buf.freeze();
        assert_eq!(RoutingLabel::decode(Variant::Itu, &mut bytes), Some(label));
    }

    #[test]
    fn ansi_roundtrip_boundary() {
        let label = RoutingLabel { opc: 0xff_ffff, dpc: 1, sls: 0xff };
        let mut buf = BytesMut::new();
        label.encode(Variant::Ansi, &mut buf);
        let mut bytes = buf.freeze();
        assert_eq!(RoutingLabel::decode(Variant::Ansi, &mut bytes), Some(label));
    }

    #[test]
    fn sio_roundtrip() {
        let sio = Sio { ni: 2, priority: 1, user_part: UserPart::Isup };
        let byte = sio.encode(Variant::Ansi);
        assert_eq!(Sio::decode(Variant::Ansi, byte), sio);
    }

    proptest! {
        #[test]
        fn itu_routing_label_roundtrip_full_range(
            opc in 0u32..(1 << 14),
            dpc in 0u32..(1 << 14),
            sls in 0u8..16,
        ) {
            let label = RoutingLabel { opc, dpc, sls };
            let mut buf = BytesMut::new();
            label.encode(Variant::Itu, &mut buf);
            let mut bytes = buf.freeze();
            prop_assert_eq!(RoutingLabel::decode(Variant::Itu, &mut bytes), Some(label));
        }

        #[test]
        fn ansi_routing_label_roundtrip_full_range(
            opc in 0u32..(1 << 24),
            dpc in 0u32..(1 << 24),
            sls in any::<u8>(),
        ) {
            let label = RoutingLabel { opc, dpc, sls };
            let mut buf = BytesMut::new();
            label.encode(Variant::Ansi, &mut buf);
            let mut bytes = buf.freeze();
            prop_assert_eq!(RoutingLabel::decode(Variant::Ansi, &mut bytes), Some(label));
        }
    }
}
