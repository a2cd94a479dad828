use crate::{
    Address, ProtoError, Unpacked, VERSION,
    addr::{AddrType, pack_addr_port, unpack_addr_port},
};

/// SOCKS5 REP values (RFC 1928 §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Reply {
    Success = 0x00,
    GeneralFailure = 0x01,
    NotAllowed = 0x02,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    TtlExpired = 0x06,
    CommandNotSupported = 0x07,
    AddressTypeNotSupported = 0x08,
}

/// A parsed `VER | REP | RSV | ATYPE | BND.ADDR | BND.PORT` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response<'a> {
    pub rep: u8,
    pub atype_raw: u8,
    pub addr: Address<'a>,
    pub port: u16,
}

/// `VER | REP | RSV=0 | ATYPE | BND.ADDR | BND.PORT`
pub fn pack_response(rep: Reply, addr: &Address, port: u16) -> Result<Vec<u8>, ProtoError> {
    let mut out = Vec::with_capacity(10);
    out.push(VERSION);
    out.push(rep as u8);
    out.push(0x00);
    out.push(addr.addr_type() as u8);
    pack_addr_port(&mut out, addr, port)?;
    Ok(out)
}

pub fn unpack_response(buf: &[u8]) -> Result<Unpacked<Response<'_>>, ProtoError> {
    const HEADER_LEN: usize = 4;
    if buf.len() < HEADER_LEN {
        return Ok(Unpacked::Incomplete { needed: HEADER_LEN - buf.len() });
    }

    let rep = buf[1];
    let atype_raw = buf[3];
    let atype = AddrType::from_u8(atype_raw);

    match unpack_addr_port(atype, &buf[HEADER_LEN..])? {
        Unpacked::Incomplete { needed } => Ok(Unpacked::Incomplete { needed }),
        Unpacked::Complete { value: (addr, port), consumed } => Ok(Unpacked::Complete {
            value: Response { rep, atype_raw, addr, port },
            consumed: HEADER_LEN + consumed,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn success_ipv4_round_trips() {
        let packed = pack_response(Reply::Success, &Address::V4(Ipv4Addr::new(127, 0, 0, 1)), 80).unwrap();
        assert_eq!(packed, vec![0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50]);

        match unpack_response(&packed).unwrap() {
            Unpacked::Complete { value, consumed } => {
                assert_eq!(value.rep, Reply::Success as u8);
                assert_eq!(value.addr, Address::V4(Ipv4Addr::new(127, 0, 0, 1)));
                assert_eq!(value.port, 80);
                assert_eq!(consumed, packed.len());
            }
            other => panic!("expected complete, got {other:?}"),
        }
    }

    #[test]
    fn command_not_supported_round_trips() {
        let packed = pack_response(Reply::CommandNotSupported, &Address::V4(Ipv4Addr::new(127, 0, 0, 1)), 80).unwrap();
        let Unpacked::Complete { value, .. } = unpack_response(&packed).unwrap() else {
            panic!("expected complete")
        };
        assert_eq!(value.rep, Reply::CommandNotSupported as u8);
    }

    #[test]
    fn reports_exact_shortfall_at_every_prefix() {
        let packed = pack_response(Reply::Success, &Address::Domain("h"), 1).unwrap();
        for k in 0..packed.len() {
            match unpack_response(&packed[..k]).unwrap() {
                Unpacked::Incomplete { needed } => assert_eq!(needed, packed.len() - k),
                Unpacked::Complete { .. } => panic!("prefix {k} should be incomplete"),
            }
        }
    }
}
