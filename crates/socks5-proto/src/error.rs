use thiserror::Error;

/// Errors a SOCKS5 frame can fail to pack/unpack with.
///
/// Short input is *not* an error — see `Unpacked::Incomplete`. These are
/// reserved for frames that are long enough but semantically malformed,
/// or that this implementation deliberately does not support.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtoError {
    #[error("unsupported SOCKS5 version {0:#x}")]
    UnsupportedVersion(u8),
    #[error("IPv6 addresses are not supported for packing")]
    Ipv6Unsupported,
    #[error("domain name longer than 255 bytes")]
    DomainTooLong,
    #[error("domain name is not valid UTF-8")]
    InvalidDomain,
}
