use thiserror::Error;

/// The session-level error kinds. Any of these ends the session: there is
/// no retry or recovery inside a session, only the two wire-visible
/// rejections (`Rejected` for CMD/ATYPE, surfaced by the caller as a SOCKS5
/// reply before closing).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Pool(#[from] socks5_pool::PoolError),
    #[error(transparent)]
    Protocol(#[from] socks5_proto::ProtoError),
    #[error(transparent)]
    Resolve(#[from] socks5_resolve::ResolveError),
    #[error("peer closed the connection")]
    PeerClosed,
    #[error("session cancelled")]
    Cancelled,
}
