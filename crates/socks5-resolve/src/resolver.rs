use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use rand::Rng;
use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout_at};
use tracing::debug;

use crate::error::ResolveError;
use crate::message::{build_query, parse_first_a_record, query_id};

/// Large enough for any response to a single-question A/IN query; DNS/UDP
/// responses this resolver cares about never approach it.
const MAX_RESPONSE_SIZE: usize = 512;

/// Resolves a domain name to its first IPv4 address via a single configured
/// DNS server, with no cross-timeout retries.
#[derive(Debug, Clone)]
pub struct Resolver {
    server: SocketAddr,
    timeout: Duration,
}

impl Resolver {
    pub fn new(server: SocketAddr, timeout: Duration) -> Self {
        Self { server, timeout }
    }

    /// Sends one query, waits up to the resolver's timeout for a reply
    /// whose transaction id matches, and extracts the first A record.
    ///
    /// Responses with a foreign or stale transaction id are dropped and the
    /// read retried — *within* the same deadline, not as a fresh attempt —
    /// matching the upstream forwarder's "ignore stale/foreign packets"
    /// receive loop.
    pub async fn resolve(&self, domain: &str) -> Result<Ipv4Addr, ResolveError> {
        let id: u16 = rand::rng().random();
        let query = build_query(id, domain)?;
        let deadline = Instant::now() + self.timeout;

        let bind_addr: SocketAddr = if self.server.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(self.server).await?;

        timeout_at(deadline, socket.send(&query))
            .await
            .map_err(|_| ResolveError::Timeout)??;

        let mut buf = vec![0u8; MAX_RESPONSE_SIZE];
        loop {
            let n = timeout_at(deadline, socket.recv(&mut buf))
                .await
                .map_err(|_| ResolveError::Timeout)??;
            let resp = &buf[..n];

            if query_id(resp) != Some(id) {
                debug!(domain, "dropped dns response with mismatched query id");
                continue;
            }

            return parse_first_a_record(resp).ok_or(ResolveError::NoAddressFound);
        }
    }
}
