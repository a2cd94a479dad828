use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("domain name too long to encode as a DNS query")]
    DomainTooLong,
    #[error("dns query timed out")]
    Timeout,
    #[error("no A record found in DNS response")]
    NoAddressFound,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
