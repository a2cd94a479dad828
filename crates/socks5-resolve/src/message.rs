//! Pure, I/O-free encoding/decoding of the single-question A/IN query and
//! its response. Kept separate from `resolver.rs` so the wire format can be
//! exercised with plain byte slices.

use std::net::Ipv4Addr;

use crate::error::ResolveError;

const HEADER_LEN: usize = 12;
const QTYPE_A: u16 = 1;
const QCLASS_IN: u16 = 1;

/// Builds a single-question `A IN` query for `domain`, with transaction id
/// `id`. `RD` (recursion desired) is set, matching the original resolver.
pub fn build_query(id: u16, domain: &str) -> Result<Vec<u8>, ResolveError> {
    let domain = domain.trim_end_matches('.');
    if domain.is_empty() || domain.len() > 253 {
        return Err(ResolveError::DomainTooLong);
    }

    let mut out = Vec::with_capacity(HEADER_LEN + domain.len() + 2 + 4);
    out.extend_from_slice(&id.to_be_bytes());
    out.push(0x01); // RD=1, everything else 0
    out.push(0x00);
    out.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    out.extend_from_slice(&0u16.to_be_bytes()); // ANCOUNT
    out.extend_from_slice(&0u16.to_be_bytes()); // NSCOUNT
    out.extend_from_slice(&0u16.to_be_bytes()); // ARCOUNT

    for label in domain.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(ResolveError::DomainTooLong);
        }
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0x00); // root label

    out.extend_from_slice(&QTYPE_A.to_be_bytes());
    out.extend_from_slice(&QCLASS_IN.to_be_bytes());
    Ok(out)
}

/// The transaction id carried in a message's first two bytes, if present.
pub fn query_id(buf: &[u8]) -> Option<u16> {
    Some(u16::from_be_bytes([*buf.first()?, *buf.get(1)?]))
}

/// Skips one encoded name starting at `offset`, returning the offset just
/// past it. A compression pointer is skipped (two bytes) without being
/// followed — enough to keep walking the record list, since the pointed-to
/// name itself is never needed here.
fn skip_name(buf: &[u8], mut offset: usize) -> Option<usize> {
    loop {
        let len = *buf.get(offset)?;
        if len == 0 {
            return Some(offset + 1);
        } else if len & 0xc0 == 0xc0 {
            buf.get(offset + 1)?;
            return Some(offset + 2);
        } else {
            offset = offset.checked_add(1 + len as usize)?;
        }
    }
}

/// Walks past the question section and scans the answer section for the
/// first `A`/`IN` record, returning its address. Returns `None` for any
/// response that is too short, truncated, or simply carries no A record —
/// none of those are wire errors, just "no address resolved".
pub fn parse_first_a_record(buf: &[u8]) -> Option<Ipv4Addr> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    let qdcount = u16::from_be_bytes([buf[4], buf[5]]) as usize;
    let ancount = u16::from_be_bytes([buf[6], buf[7]]) as usize;
    if ancount == 0 {
        return None;
    }

    let mut offset = HEADER_LEN;
    for _ in 0..qdcount {
        offset = skip_name(buf, offset)?;
        offset = offset.checked_add(4)?; // QTYPE + QCLASS
    }

    for _ in 0..ancount {
        offset = skip_name(buf, offset)?;
        let rdlength_at = offset.checked_add(8)?;
        if buf.len() < rdlength_at + 2 {
            return None;
        }
        let rtype = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
        let rclass = u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]);
        let rdlength = u16::from_be_bytes([buf[rdlength_at], buf[rdlength_at + 1]]) as usize;
        let rdata_offset = rdlength_at + 2;
        if buf.len() < rdata_offset + rdlength {
            return None;
        }
        if rtype == QTYPE_A && rclass == QCLASS_IN && rdlength == 4 {
            return Some(Ipv4Addr::new(
                buf[rdata_offset],
                buf[rdata_offset + 1],
                buf[rdata_offset + 2],
                buf[rdata_offset + 3],
            ));
        }
        offset = rdata_offset + rdlength;
    }
    None
}
