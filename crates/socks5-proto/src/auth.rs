use crate::{ProtoError, Unpacked, VERSION};

/// SOCKS5 authentication methods (RFC 1928 §3). Only `NoAuth` is ever
/// selected by this server — see spec Non-goals (no GSSAPI / username-
/// password support).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Method {
    NoAuth = 0x00,
    GssApi = 0x01,
    UserPass = 0x02,
    NoAcceptable = 0xFF,
}

impl Method {
    pub fn from_u8(v: u8) -> Method {
        match v {
            0x00 => Method::NoAuth,
            0x01 => Method::GssApi,
            0x02 => Method::UserPass,
            _ => Method::NoAcceptable,
        }
    }
}

/// `VER | NMETHODS | METHODS[NMETHODS]`
pub fn pack_auth_req(methods: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + methods.len());
    out.push(VERSION);
    out.push(methods.len() as u8);
    out.extend_from_slice(methods);
    out
}

/// Unpacks an auth-method request, reporting `Incomplete` rather than
/// failing when more bytes are needed.
pub fn unpack_auth_req(buf: &[u8]) -> Result<Unpacked<Vec<u8>>, ProtoError> {
    if buf.len() < 2 {
        return Ok(Unpacked::Incomplete { needed: 2 - buf.len() });
    }

    let method_count = buf[1] as usize;
    let total = 2 + method_count;
    if buf.len() < total {
        return Ok(Unpacked::Incomplete { needed: total - buf.len() });
    }

    Ok(Unpacked::Complete {
        value: buf[2..total].to_vec(),
        consumed: total,
    })
}

/// `VER | METHOD`
pub fn pack_auth_res(method: Method) -> Vec<u8> {
    vec![VERSION, method as u8]
}

pub fn unpack_auth_res(buf: &[u8]) -> Result<Unpacked<Method>, ProtoError> {
    if buf.len() < 2 {
        return Ok(Unpacked::Incomplete { needed: 2 - buf.len() });
    }
    Ok(Unpacked::Complete {
        value: Method::from_u8(buf[1]),
        consumed: 2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_req_round_trips() {
        let packed = pack_auth_req(&[0x00, 0x02]);
        match unpack_auth_req(&packed).unwrap() {
            Unpacked::Complete { value, consumed } => {
                assert_eq!(value, vec![0x00, 0x02]);
                assert_eq!(consumed, packed.len());
            }
            other => panic!("expected complete, got {other:?}"),
        }
    }

    #[test]
    fn auth_req_reports_exact_shortfall() {
        let packed = pack_auth_req(&[0x00, 0x02, 0x01]);
        for k in 0..packed.len() {
            match unpack_auth_req(&packed[..k]).unwrap() {
                Unpacked::Incomplete { needed } => assert_eq!(needed, packed.len() - k),
                Unpacked::Complete { .. } => panic!("prefix of len {k} should be incomplete"),
            }
        }
        assert!(unpack_auth_req(&packed).unwrap().is_complete());
    }

    #[test]
    fn auth_res_round_trips() {
        let packed = pack_auth_res(Method::NoAuth);
        assert_eq!(packed, vec![0x05, 0x00]);
        match unpack_auth_res(&packed).unwrap() {
            Unpacked::Complete { value, consumed } => {
                assert_eq!(value, Method::NoAuth);
                assert_eq!(consumed, 2);
            }
            other => panic!("expected complete, got {other:?}"),
        }
    }

    #[test]
    fn auth_res_incomplete_on_one_byte() {
        let packed = pack_auth_res(Method::NoAuth);
        assert_eq!(
            unpack_auth_res(&packed[..1]).unwrap(),
            Unpacked::Incomplete { needed: 1 }
        );
    }
}
