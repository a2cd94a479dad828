use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use socks5_pool::BufferPool;
use socks5_proto::{
    Address, Command, Method, Reply, VERSION, pack_auth_res, pack_response, unpack_auth_req, unpack_request,
    Unpacked,
};
use socks5_resolve::Resolver;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::SessionError;
use crate::registry::SessionHandle;

/// Shared, per-server resources a session needs: the buffer pool and the
/// DNS resolver. Cheap to clone (both are already `Arc`-wrapped).
#[derive(Clone)]
pub struct SessionParams {
    pub pool: Arc<BufferPool>,
    pub resolver: Arc<Resolver>,
}

/// The destination address carried by a CONNECT request, detached from the
/// buffer it was parsed out of.
enum TargetAddr {
    V4(Ipv4Addr),
    Domain(String),
    /// ATYPE was IPv6 (reserved, unimplemented) or otherwise unrecognized.
    Unsupported,
}

struct ParsedRequest {
    cmd_raw: u8,
    atype_raw: u8,
    addr: TargetAddr,
    port: u16,
}

/// Runs one client connection end to end: handshake, request, connect,
/// relay. Every early return other than a hard I/O error already wrote
/// whatever wire response the protocol calls for; the caller just needs to
/// log and drop the connection.
pub async fn run(
    mut stream: TcpStream,
    peer: SocketAddr,
    params: SessionParams,
    handle: Arc<SessionHandle>,
) -> Result<(), SessionError> {
    if !handshake(&mut stream, &params.pool).await? {
        debug!(%peer, "client proposed no acceptable auth method");
        return Ok(());
    }
    handle.mark_active();

    let ParsedRequest { cmd_raw, atype_raw, addr, port } = read_request(&mut stream, &params.pool).await?;
    handle.mark_active();

    let Some(command) = Command::from_u8(cmd_raw) else {
        reject(&mut stream, Reply::CommandNotSupported, atype_raw, &addr, port).await?;
        return Ok(());
    };
    if !matches!(command, Command::Connect) {
        reject(&mut stream, Reply::CommandNotSupported, atype_raw, &addr, port).await?;
        return Ok(());
    }

    let ip = match addr {
        TargetAddr::Unsupported => {
            reject(&mut stream, Reply::AddressTypeNotSupported, atype_raw, &TargetAddr::Unsupported, port).await?;
            return Ok(());
        }
        TargetAddr::V4(ip) => ip,
        TargetAddr::Domain(name) => match name.parse::<Ipv4Addr>() {
            Ok(ip) => ip,
            Err(_) => match params.resolver.resolve(&name).await {
                Ok(ip) => ip,
                Err(e) => {
                    debug!(domain = %name, error = %e, "dns resolve failed");
                    reject(&mut stream, Reply::HostUnreachable, atype_raw, &TargetAddr::Domain(name), port).await?;
                    return Ok(());
                }
            },
        },
    };
    handle.mark_active();

    let target = SocketAddr::from((ip, port));
    let outbound = match TcpStream::connect(target).await {
        Ok(s) => s,
        Err(e) => {
            // Parity with the original: a failed connect closes the
            // client connection silently, with no REP written.
            debug!(%target, error = %e, "connect to target failed");
            return Ok(());
        }
    };
    handle.mark_active();

    let packed = pack_response(Reply::Success, &Address::V4(ip), port)
        .expect("V4 address always packs");
    stream.write_all(&packed).await?;
    handle.mark_active();

    relay(stream, outbound, params.pool, handle).await
}

/// Writes a rejection response (CMD/ATYPE not supported, or destination
/// unreachable), echoing the request's own ATYPE/address/port back to the
/// client per spec §4.6's `{VER=5, REP, RSV=0, ATYPE=atype, addr, port}`,
/// then lets the caller close the connection.
async fn reject<S: AsyncWrite + Unpin>(
    stream: &mut S,
    rep: Reply,
    atype_raw: u8,
    addr: &TargetAddr,
    port: u16,
) -> Result<(), SessionError> {
    stream.write_all(&pack_reject(rep, atype_raw, addr, port)).await?;
    Ok(())
}

/// Builds the bytes for [`reject`]. Pulled out as a pure function so the
/// three address shapes a rejection can carry are each handled once.
fn pack_reject(rep: Reply, atype_raw: u8, addr: &TargetAddr, port: u16) -> Vec<u8> {
    match addr {
        TargetAddr::V4(ip) => pack_response(rep, &Address::V4(*ip), port).expect("V4 address always packs"),
        TargetAddr::Domain(name) => {
            pack_response(rep, &Address::Domain(name), port).expect("a previously-parsed domain always packs")
        }
        TargetAddr::Unsupported => {
            // The codec never parses address bytes for an ATYPE it doesn't
            // recognize (consumed=0 past the header), so there's nothing to
            // echo but the raw ATYPE itself; address/port go out zeroed.
            vec![VERSION, rep as u8, 0x00, atype_raw, 0, 0, 0, 0, 0, 0]
        }
    }
}

/// READ_AUTH_REQ + WRITE_AUTH_RES. Returns `false` (without erroring) when
/// the client's method list has no acceptable entry — NOAUTH is the only
/// method this server ever selects.
async fn handshake<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S, pool: &BufferPool) -> Result<bool, SessionError> {
    let mut buf = pool.alloc()?;
    let mut filled = 0usize;
    let methods = loop {
        match unpack_auth_req(&buf.as_full()[..filled])? {
            Unpacked::Complete { value, .. } => break value,
            Unpacked::Incomplete { .. } => {
                if filled == buf.capacity() {
                    return Err(SessionError::PeerClosed);
                }
                let n = stream.read(&mut buf.as_full_mut()[filled..]).await?;
                if n == 0 {
                    return Err(SessionError::PeerClosed);
                }
                filled += n;
            }
        }
    };

    if !methods.contains(&(Method::NoAuth as u8)) {
        stream.write_all(&pack_auth_res(Method::NoAcceptable)).await?;
        return Ok(false);
    }

    stream.write_all(&pack_auth_res(Method::NoAuth)).await?;
    Ok(true)
}

/// READ_REQ. Parses the CONNECT request frame, detaching the address from
/// the buffer it came from so the buffer can be returned to the pool
/// immediately on return.
async fn read_request<S: AsyncRead + Unpin>(stream: &mut S, pool: &BufferPool) -> Result<ParsedRequest, SessionError> {
    let mut buf = pool.alloc()?;
    let mut filled = 0usize;
    loop {
        match unpack_request(&buf.as_full()[..filled])? {
            Unpacked::Complete { value, .. } => {
                let addr = match value.addr {
                    Address::V4(ip) => TargetAddr::V4(ip),
                    Address::Domain(name) => TargetAddr::Domain(name.to_owned()),
                    Address::V6Unspecified => TargetAddr::Unsupported,
                };
                return Ok(ParsedRequest {
                    cmd_raw: value.cmd_raw,
                    atype_raw: value.atype_raw,
                    addr,
                    port: value.port,
                });
            }
            Unpacked::Incomplete { .. } => {
                if filled == buf.capacity() {
                    return Err(SessionError::PeerClosed);
                }
                let n = stream.read(&mut buf.as_full_mut()[filled..]).await?;
                if n == 0 {
                    return Err(SessionError::PeerClosed);
                }
                filled += n;
            }
        }
    }
}

/// RELAY. Two independent directions, each reading up to one pool buffer's
/// worth at a time and writing it back out; a partial write advances the
/// buffer's active window instead of re-reading. Ends as soon as either
/// direction sees EOF or an error, which drops both stream halves and
/// closes the whole connection.
async fn relay(
    client: TcpStream,
    target: TcpStream,
    pool: Arc<BufferPool>,
    handle: Arc<SessionHandle>,
) -> Result<(), SessionError> {
    let (mut client_r, mut client_w) = client.into_split();
    let (mut target_r, mut target_w) = target.into_split();

    let upload = copy_loop(&mut client_r, &mut target_w, &pool, &handle);
    let download = copy_loop(&mut target_r, &mut client_w, &pool, &handle);

    tokio::select! {
        r = upload => r,
        r = download => r,
    }
}

async fn copy_loop(
    reader: &mut (impl AsyncRead + Unpin),
    writer: &mut (impl AsyncWrite + Unpin),
    pool: &BufferPool,
    handle: &SessionHandle,
) -> Result<(), SessionError> {
    let mut buf = pool.alloc()?;
    loop {
        let n = reader.read(buf.as_full_mut()).await?;
        if n == 0 {
            return Ok(());
        }
        handle.mark_active();
        buf.set_filled(n);

        while !buf.is_empty() {
            let written = writer.write(buf.active()).await?;
            if written == 0 {
                return Err(SessionError::PeerClosed);
            }
            buf.advance(written);
            handle.mark_active();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socks5_proto::{pack_auth_req, pack_request};
    use tokio::io::duplex;

    fn pool() -> BufferPool {
        BufferPool::new(4)
    }

    #[tokio::test]
    async fn handshake_accepts_noauth_and_writes_selection() {
        let (mut client, mut server) = duplex(1024);
        let p = pool();

        client.write_all(&pack_auth_req(&[0x01, 0x00])).await.unwrap();

        let ok = handshake(&mut server, &p).await.unwrap();
        assert!(ok);

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00]);
    }

    #[tokio::test]
    async fn handshake_rejects_when_noauth_not_offered() {
        let (mut client, mut server) = duplex(1024);
        let p = pool();

        client.write_all(&pack_auth_req(&[0x01, 0x02])).await.unwrap();

        let ok = handshake(&mut server, &p).await.unwrap();
        assert!(!ok);

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0xFF]);
    }

    #[tokio::test]
    async fn handshake_over_split_reads_still_assembles() {
        let (mut client, mut server) = duplex(1024);
        let p = pool();
        let frame = pack_auth_req(&[0x00]);

        let writer = tokio::spawn(async move {
            for byte in frame {
                client.write_all(&[byte]).await.unwrap();
            }
            client
        });

        let ok = handshake(&mut server, &p).await.unwrap();
        assert!(ok);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn read_request_parses_domain_target() {
        let (mut client, mut server) = duplex(1024);
        let p = pool();

        client
            .write_all(&pack_request(Command::Connect, &Address::Domain("example.com"), 443).unwrap())
            .await
            .unwrap();

        let parsed = read_request(&mut server, &p).await.unwrap();
        assert_eq!(parsed.cmd_raw, Command::Connect as u8);
        assert_eq!(parsed.port, 443);
        match parsed.addr {
            TargetAddr::Domain(name) => assert_eq!(name, "example.com"),
            _ => panic!("expected domain target"),
        }
    }

    #[tokio::test]
    async fn read_request_flags_unsupported_atype() {
        let (mut client, mut server) = duplex(1024);
        let p = pool();

        // ATYPE=0x04 (IPv6), nothing follows the header.
        client.write_all(&[0x05, 0x01, 0x00, 0x04]).await.unwrap();

        let parsed = read_request(&mut server, &p).await.unwrap();
        assert!(matches!(parsed.addr, TargetAddr::Unsupported));
        assert_eq!(parsed.atype_raw, 0x04);
    }

    #[tokio::test]
    async fn reject_echoes_the_request_s_own_address_and_port() {
        let (mut client, mut server) = duplex(1024);

        reject(&mut server, Reply::CommandNotSupported, 0x01, &TargetAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 80)
            .await
            .unwrap();

        let mut buf = [0u8; 10];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x05, 0x07, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50]);
    }
}
