//! MTP2 signal-unit framing: the 3-octet header and the three unit kinds.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Length indicator value meaning "this MSU's true SIF length is >= 63
/// octets"; the true length (up to 272) travels in the SIF itself.
pub const LI_MSU_EXTENDED: u8 = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuHeader {
    pub bsn: u8,
    pub bib: bool,
    pub fsn: u8,
    pub fib: bool,
    pub li: u8,
}

impl SuHeader {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8((self.bsn & 0x7f) | ((self.bib as u8) << 7));
        buf.put_u8((self.fsn & 0x7f) | ((self.fib as u8) << 7));
        buf.put_u8(self.li & 0x3f);
    }

    pub fn decode(buf: &mut Bytes) -> Option<SuHeader> {
        if buf.remaining() < 3 {
            return None;
        }
        let b0 = buf.get_u8();
        let b1 = buf.get_u8();
        let b2 = buf.get_u8();
        Some(SuHeader {
            bsn: b0 & 0x7f,
            bib: b0 & 0x80 != 0,
            fsn: b1 & 0x7f,
            fib: b1 & 0x80 != 0,
            li: b2 & 0x3f,
        })
    }
}

/// Q.703 LSSU status field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LssuStatus {
    /// SIO — out of alignment.
    Sio = 0,
    /// SIN — normal alignment.
    Sin = 1,
    /// SIE — emergency alignment.
    Sie = 2,
    /// SIOS — out of service.
    Sios = 3,
    /// SIPO — processor outage.
    Sipo = 4,
    /// SIB — busy.
    Sib = 5,
}

impl LssuStatus {
    fn from_bits(v: u8) -> Option<LssuStatus> {
        Some(match v & 0x07 {
            0 => LssuStatus::Sio,
            1 => LssuStatus::Sin,
            2 => LssuStatus::Sie,
            3 => LssuStatus::Sios,
            4 => LssuStatus::Sipo,
            5 => LssuStatus::Sib,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalUnit {
    Fisu {
        header: SuHeader,
    },
    Lssu {
        header: SuHeader,
        status: LssuStatus,
    },
    Msu {
        header: SuHeader,
        sio: u8,
        sif: Bytes,
    },
}

impl SignalUnit {
    pub fn header(&self) -> &SuHeader {
        match self {
            SignalUnit::Fisu { header }
            | SignalUnit::Lssu { header, .. }
            | SignalUnit::Msu { header, .. } => header,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(3 + 275);
        match self {
            SignalUnit::Fisu { header } => {
                let mut h = *header;
                h.li = 0;
                h.encode(&mut buf);
            }
            SignalUnit::Lssu { header, status } => {
                let mut h = *header;
                h.li = 1;
                h.encode(&mut buf);
                buf.put_u8(*status as u8);
            }
            SignalUnit::Msu { header, sio, sif } => {
                let mut h = *header;
                h.li = if sif.len() + 1 >= LI_MSU_EXTENDED as usize {
                    LI_MSU_EXTENDED
                } else {
                    (sif.len() + 1) as u8
                };
                h.encode(&mut buf);
                buf.put_u8(*sio);
                buf.put_slice(sif);
            }
        }
        buf.freeze()
    }

    /// Decodes a single SU. `raw` must already have the trailing FCS/CRC
    /// stripped by the device driver, per the external-interface contract.
    pub fn decode(raw: &[u8]) -> Option<SignalUnit> {
        let mut buf = Bytes::copy_from_slice(raw);
        let header = SuHeader::decode(&mut buf)?;
        match header.li {
            0 => Some(SignalUnit::Fisu { header }),
            1..=2 => {
                if buf.remaining() < 1 {
                    return None;
                }
                let status = LssuStatus::from_bits(buf.get_u8())?;
                Some(SignalUnit::Lssu { header, status })
            }
            _ => {
                if buf.remaining() < 1 {
                    return None;
                }
                let sio = buf.get_u8();
                Some(SignalUnit::Msu {
                    header,
                    sio,
                    sif: buf,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn fisu_roundtrip() {
        let su = SignalUnit::Fisu {
            header: SuHeader {
                bsn: 5,
                bib: true,
                fsn: 9,
                fib: false,
                li: 0,
            },
        };
        let bytes = su.encode();
        assert_eq!(bytes.len(), 3);
        assert_eq!(SignalUnit::decode(&bytes), Some(su));
    }

    #[test]
    fn lssu_roundtrip_all_statuses() {
        for status in [
            LssuStatus::Sio,
            LssuStatus::Sin,
            LssuStatus::Sie,
            LssuStatus::Sios,
            LssuStatus::Sipo,
            LssuStatus::Sib,
        ] {
            let su = SignalUnit::Lssu {
                header: SuHeader {
                    bsn: 0,
                    bib: false,
                    fsn: 0,
                    fib: false,
                    li: 1,
                },
                status,
            };
            let bytes = su.encode();
            assert_eq!(SignalUnit::decode(&bytes), Some(su));
        }
    }

    #[test]
    fn msu_roundtrip_sets_li_extended_for_long_sif() {
        let sif = Bytes::from(vec![0xAB; 200]);
        let su = SignalUnit::Msu {
            header: SuHeader {
                bsn: 127,
                bib: true,
                fsn: 126,
                fib: true,
                li: 0,
            },
            sio: 0x45,
            sif: sif.clone(),
        };
        let bytes = su.encode();
        assert_eq!(bytes[2] & 0x3f, LI_MSU_EXTENDED);
        let decoded = SignalUnit::decode(&bytes).unwrap();
        match decoded {
            SignalUnit::Msu { sio, sif: got, .. } => {
                assert_eq!(sio, 0x45);
                assert_eq!(got, sif);
            }
            _ => panic!("expected MSU"),
        }
    }

    #[test]
    fn truncated_header_fails_to_decode() {
        assert_eq!(SignalUnit::decode(&[0x00, 0x00]), None);
    }

    proptest! {
        #[test]
        fn msu_roundtrip_any_payload(sif in proptest::collection::vec(any::<u8>(), 0..270), sio in any::<u8>(), bsn in 0u8..128, fsn in 0u8..128) {
            let su = SignalUnit::Msu {
                header: SuHeader { bsn, bib: false, fsn, fib: false, li: 0 },
                sio,
                sif: Bytes::from(sif),
            };
            let bytes = su.encode();
            prop_assert_eq!(SignalUnit::decode(&bytes), Some(su));
        }
    }
}
