use std::net::Ipv4Addr;

use crate::{ProtoError, Unpacked};

/// SOCKS5 ATYPE values (RFC 1928 §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AddrType {
    V4 = 0x01,
    Domain = 0x03,
    V6 = 0x04,
}

impl AddrType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(Self::V4),
            0x03 => Some(Self::Domain),
            0x04 => Some(Self::V6),
            _ => None,
        }
    }
}

/// A destination (or bound) address as carried by a SOCKS5 request or
/// response frame.
///
/// `Domain` borrows directly from the input buffer — the original C
/// implementation NUL-terminates the domain in place to hand callers a C
/// string; a borrowed `&str` is the safe equivalent for a Rust caller and
/// requires no buffer mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address<'a> {
    V4(Ipv4Addr),
    Domain(&'a str),
    /// Reserved per RFC 1928 but not implemented (see spec Non-goals).
    /// Unpacking an ATYPE=4 frame yields this instead of failing — the
    /// original implementation treats IPv6 as "unspecified", not an error.
    V6Unspecified,
}

impl Address<'_> {
    pub fn addr_type(&self) -> AddrType {
        match self {
            Address::V4(_) => AddrType::V4,
            Address::Domain(_) => AddrType::Domain,
            Address::V6Unspecified => AddrType::V6,
        }
    }
}

/// Appends `ATYPE`-dependent address bytes plus the trailing port to `out`.
/// Shared by the request and response packers, which differ only in the
/// byte that precedes the address (CMD vs REP).
pub(crate) fn pack_addr_port(out: &mut Vec<u8>, addr: &Address, port: u16) -> Result<(), ProtoError> {
    match addr {
        Address::V4(ip) => out.extend_from_slice(&ip.octets()),
        Address::Domain(name) => {
            if name.len() > 255 {
                return Err(ProtoError::DomainTooLong);
            }
            out.push(name.len() as u8);
            out.extend_from_slice(name.as_bytes());
        }
        Address::V6Unspecified => return Err(ProtoError::Ipv6Unsupported),
    }
    out.extend_from_slice(&port.to_be_bytes());
    Ok(())
}

/// Parses the address+port tail of a request/response frame, given the
/// already-read ATYPE. `rest` starts right after the 4-byte header.
///
/// Unknown or reserved (`V6`) address types are *not* an error here — per
/// spec they unpack to an address-less placeholder with nothing consumed
/// past the header, leaving the caller (the session state machine) to
/// decide to reject the frame with `REP=0x08`.
pub(crate) fn unpack_addr_port<'a>(
    atype: Option<AddrType>,
    rest: &'a [u8],
) -> Result<Unpacked<(Address<'a>, u16)>, ProtoError> {
    match atype {
        Some(AddrType::V4) => {
            if rest.len() < 6 {
                return Ok(Unpacked::Incomplete { needed: 6 - rest.len() });
            }
            let ip = Ipv4Addr::new(rest[0], rest[1], rest[2], rest[3]);
            let port = u16::from_be_bytes([rest[4], rest[5]]);
            Ok(Unpacked::Complete {
                value: (Address::V4(ip), port),
                consumed: 6,
            })
        }
        Some(AddrType::Domain) => {
            if rest.is_empty() {
                return Ok(Unpacked::Incomplete { needed: 1 });
            }
            let domain_len = rest[0] as usize;
            let total = 1 + domain_len + 2;
            if rest.len() < total {
                return Ok(Unpacked::Incomplete { needed: total - rest.len() });
            }
            let name = std::str::from_utf8(&rest[1..1 + domain_len])
                .map_err(|_| ProtoError::InvalidDomain)?;
            let port = u16::from_be_bytes([rest[1 + domain_len], rest[2 + domain_len]]);
            Ok(Unpacked::Complete {
                value: (Address::Domain(name), port),
                consumed: total,
            })
        }
        Some(AddrType::V6) | None => Ok(Unpacked::Complete {
            value: (Address::V6Unspecified, 0),
            consumed: 0,
        }),
    }
}
