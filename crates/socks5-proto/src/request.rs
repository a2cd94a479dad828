use crate::{
    Address, ProtoError, Unpacked, VERSION,
    addr::{AddrType, pack_addr_port, unpack_addr_port},
};

/// SOCKS5 CMD values (RFC 1928 §4). Only `Connect` is implemented — see
/// spec Non-goals (no BIND, no UDP ASSOCIATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Connect = 0x01,
    Bind = 0x02,
    UdpAssociate = 0x03,
}

impl Command {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(Self::Connect),
            0x02 => Some(Self::Bind),
            0x03 => Some(Self::UdpAssociate),
            _ => None,
        }
    }
}

/// A parsed `VER | CMD | RSV | ATYPE | DST.ADDR | DST.PORT` frame.
///
/// `cmd` and `atype` are kept as raw bytes alongside their decoded forms
/// because an unsupported value of either is not a parse failure — the
/// session state machine needs the raw byte to echo back in a rejection
/// response (`REP=0x07`/`0x08`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request<'a> {
    pub cmd_raw: u8,
    pub atype_raw: u8,
    pub addr: Address<'a>,
    pub port: u16,
}

impl Request<'_> {
    pub fn command(&self) -> Option<Command> {
        Command::from_u8(self.cmd_raw)
    }
}

/// `VER | CMD | RSV=0 | ATYPE | DST.ADDR | DST.PORT`
pub fn pack_request(cmd: Command, addr: &Address, port: u16) -> Result<Vec<u8>, ProtoError> {
    let mut out = Vec::with_capacity(10);
    out.push(VERSION);
    out.push(cmd as u8);
    out.push(0x00);
    out.push(addr.addr_type() as u8);
    pack_addr_port(&mut out, addr, port)?;
    Ok(out)
}

pub fn unpack_request(buf: &[u8]) -> Result<Unpacked<Request<'_>>, ProtoError> {
    const HEADER_LEN: usize = 4;
    if buf.len() < HEADER_LEN {
        return Ok(Unpacked::Incomplete { needed: HEADER_LEN - buf.len() });
    }

    let cmd_raw = buf[1];
    let atype_raw = buf[3];
    let atype = AddrType::from_u8(atype_raw);

    match unpack_addr_port(atype, &buf[HEADER_LEN..])? {
        Unpacked::Incomplete { needed } => Ok(Unpacked::Incomplete { needed }),
        Unpacked::Complete { value: (addr, port), consumed } => Ok(Unpacked::Complete {
            value: Request { cmd_raw, atype_raw, addr, port },
            consumed: HEADER_LEN + consumed,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn connect_ipv4_round_trips() {
        let packed = pack_request(Command::Connect, &Address::V4(Ipv4Addr::new(127, 0, 0, 1)), 80).unwrap();
        assert_eq!(packed, vec![0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50]);

        match unpack_request(&packed).unwrap() {
            Unpacked::Complete { value, consumed } => {
                assert_eq!(value.command(), Some(Command::Connect));
                assert_eq!(value.addr, Address::V4(Ipv4Addr::new(127, 0, 0, 1)));
                assert_eq!(value.port, 80);
                assert_eq!(consumed, packed.len());
            }
            other => panic!("expected complete, got {other:?}"),
        }
    }

    #[test]
    fn domain_round_trips() {
        let packed = pack_request(Command::Connect, &Address::Domain("example.com"), 443).unwrap();
        match unpack_request(&packed).unwrap() {
            Unpacked::Complete { value, consumed } => {
                assert_eq!(value.addr, Address::Domain("example.com"));
                assert_eq!(value.port, 443);
                assert_eq!(consumed, packed.len());
            }
            other => panic!("expected complete, got {other:?}"),
        }
    }

    #[test]
    fn ipv4_reports_exact_shortfall_at_every_prefix() {
        let packed = pack_request(Command::Connect, &Address::V4(Ipv4Addr::new(8, 8, 8, 8)), 53).unwrap();
        for k in 0..packed.len() {
            match unpack_request(&packed[..k]).unwrap() {
                Unpacked::Incomplete { needed } => assert_eq!(needed, packed.len() - k),
                Unpacked::Complete { .. } => panic!("prefix {k} should be incomplete"),
            }
        }
    }

    #[test]
    fn unsupported_command_still_parses() {
        // BIND (0x02), IPv4 address — CMD is not validated by the codec,
        // only by the session state machine.
        let packed = pack_request(Command::Bind, &Address::V4(Ipv4Addr::new(1, 2, 3, 4)), 1).unwrap();
        let Unpacked::Complete { value, .. } = unpack_request(&packed).unwrap() else {
            panic!("expected complete")
        };
        assert_eq!(value.command(), Some(Command::Bind));
    }

    #[test]
    fn unsupported_atype_yields_unspecified_address() {
        // hand-build a frame with ATYPE=0x04 (IPv6, reserved/unimplemented)
        let buf = [0x05, 0x01, 0x00, 0x04];
        let Unpacked::Complete { value, consumed } = unpack_request(&buf).unwrap() else {
            panic!("expected complete")
        };
        assert_eq!(value.atype_raw, 0x04);
        assert_eq!(value.addr, Address::V6Unspecified);
        assert_eq!(consumed, 4);
    }

    #[test]
    fn packing_ipv6_fails() {
        let err = pack_request(Command::Connect, &Address::V6Unspecified, 1).unwrap_err();
        assert_eq!(err, ProtoError::Ipv6Unsupported);
    }
}
