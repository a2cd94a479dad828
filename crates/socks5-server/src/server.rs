use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use socks5_pool::BufferPool;
use socks5_resolve::Resolver;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::{debug, info, warn};

use crate::registry::{SessionHandle, SessionRegistry};
use crate::session::{self, SessionParams};

/// How often the idle reaper sweeps the session registry. A session is
/// evicted after two consecutive sweeps with no activity, so the
/// effective idle window is `[REAP_PERIOD, 2 * REAP_PERIOD)`.
pub const REAP_PERIOD: Duration = Duration::from_secs(30);

/// The accept-loop + reaper + session registry together. One `Server`
/// serves exactly one listening address.
pub struct Server {
    pool: Arc<BufferPool>,
    resolver: Arc<Resolver>,
    registry: Arc<SessionRegistry>,
}

impl Server {
    pub fn new(pool: Arc<BufferPool>, resolver: Arc<Resolver>) -> Self {
        Self {
            pool,
            resolver,
            registry: Arc::new(SessionRegistry::new()),
        }
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Binds, listens, and runs until the accept loop hits a fatal error.
    /// The reaper runs alongside as an independent low-frequency task, so
    /// it never competes with accept/relay for scheduling.
    pub async fn run(self: Arc<Self>, bind_addr: SocketAddr) -> anyhow::Result<()> {
        let listener = bind_reuseaddr(bind_addr)?;
        info!(%bind_addr, "socks5 server listening");

        let registry = self.registry.clone();
        let reaper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REAP_PERIOD);
            loop {
                ticker.tick().await;
                registry.reap_tick();
            }
        });

        let result = self.accept_loop(listener).await;
        reaper.abort();
        result
    }

    async fn accept_loop(&self, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };
            self.spawn_session(stream, peer);
        }
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) {
        let id = self.registry.next_id();
        let handle = Arc::new(SessionHandle::new());
        // Registered before the task is spawned: if the session finishes
        // and calls `registry.remove(id)` before this function returns, the
        // entry must already be visible or the remove is a no-op and the
        // handle is orphaned until the reaper's next sweep.
        self.registry.insert(id, handle.clone());

        let params = SessionParams {
            pool: self.pool.clone(),
            resolver: self.resolver.clone(),
        };
        let registry = self.registry.clone();
        let handle_for_task = handle.clone();

        let join = tokio::spawn(async move {
            let result = session::run(stream, peer, params, handle_for_task).await;
            registry.remove(id);
            if let Err(e) = result {
                debug!(%peer, error = %e, "session ended with error");
            }
        });

        handle.set_abort(join.abort_handle());
    }
}

/// Binds with `SO_REUSEADDR` and a 100-connection backlog, matching the
/// original listen socket configuration.
fn bind_reuseaddr(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(100)
}
