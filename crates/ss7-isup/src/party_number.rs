//! Called/calling/connected/redirecting-number encoding: NAI + a
//! variant-specific second octet, followed by BCD digits.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::bcd;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyNumber {
    pub nature_of_address: u8,
    /// Numbering plan indicator, screening and presentation bits packed
    /// as the source does: callers needing the individual fields should
    /// use the named constructors below.
    pub second_octet: u8,
    pub digits: String,
}

impl PartyNumber {
    pub fn called(nai: u8, plan: u8, inn: bool, digits: &str) -> PartyNumber {
        PartyNumber {
            nature_of_address: nai,
            second_octet: (plan << 4) | ((inn as u8) << 7),
            digits: digits.to_string(),
        }
    }

    pub fn calling(nai: u8, plan: u8, presentation: u8, screening: u8, digits: &str) -> PartyNumber {
        PartyNumber {
            nature_of_address: nai,
            second_octet: (screening & 0x03) | ((presentation & 0x03) << 2) | (plan << 4),
            digits: digits.to_string(),
        }
    }

    pub fn plan(&self) -> u8 {
        (self.second_octet >> 4) & 0x07
    }

    pub fn presentation(&self) -> u8 {
        (self.second_octet >> 2) & 0x03
    }

    pub fn screening(&self) -> u8 {
        self.second_octet & 0x03
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Option<()> {
        let (packed, odd) = bcd::encode_digits(&self.digits)?;
        buf.put_u8((self.nature_of_address & 0x7f) | ((odd as u8) << 7));
        buf.put_u8(self.second_octet);
        buf.put_slice(&packed);
        Some(())
    }

    pub fn decode(buf: &mut Bytes) -> Option<PartyNumber> {
        if buf.remaining() < 2 {
            return None;
        }
        let b0 = buf.get_u8();
        let odd = b0 & 0x80 != 0;
        let nai = b0 & 0x7f;
        let second_octet = buf.get_u8();
        let rest = buf.copy_to_bytes(buf.remaining());
        let digits = bcd::decode_digits(&rest, odd)?;
        Some(PartyNumber {
            nature_of_address: nai,
            second_octet,
            digits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn called_number_roundtrip() {
        let pn = PartyNumber::called(0x03, 0x01, false, "12345");
        let mut buf = BytesMut::new();
        pn.encode(&mut buf).unwrap();
        let mut bytes = buf.freeze();
        assert_eq!(PartyNumber::decode(&mut bytes), Some(pn));
    }

    #[test]
    fn calling_number_roundtrip_with_presentation() {
        let pn = PartyNumber::calling(0x03, 0x01, 0x01, 0x03, "7654321");
        assert_eq!(pn.presentation(), 0x01);
        assert_eq!(pn.screening(), 0x03);
        let mut buf = BytesMut::new();
        pn.encode(&mut buf).unwrap();
        let mut bytes = buf.freeze();
        assert_eq!(PartyNumber::decode(&mut bytes), Some(pn));
    }
}
