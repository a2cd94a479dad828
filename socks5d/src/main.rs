use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use socks5_pool::BufferPool;
use socks5_resolve::Resolver;
use socks5_server::Server;
use tokio::signal;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::{DEFAULT_CONFIG_PATH, load_config};

/// Matches the buffer pool's max_count: the per-buffer data area is
/// `socks5_pool::HEV_BUFFER_DATA_SIZE` bytes, and up to this many can be
/// live at once.
const BUFFER_POOL_CAPACITY: usize = 4096;

#[derive(Parser, Debug)]
#[command(name = "socks5d", about = "A minimal SOCKS5 proxy: CONNECT only, NOAUTH only")]
struct Cli {
    /// Address to listen on. Overrides the config file's server.bind_addr.
    #[arg(short = 'a', long)]
    addr: Option<String>,
    /// Port to listen on. Overrides the config file's server.bind_port.
    #[arg(short = 'p', long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = env::var("SOCKS5D_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = load_config(&config_path)?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_filter(LevelFilter::from(config.server.log_level.clone())),
        )
        .init();

    let bind_addr = cli.addr.unwrap_or_else(|| config.server.bind_addr.clone());
    let bind_port = cli.port.unwrap_or(config.server.bind_port);
    let bind: SocketAddr = format!("{bind_addr}:{bind_port}")
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid listen address {bind_addr}:{bind_port}: {e}"))?;

    let pool = Arc::new(BufferPool::new(BUFFER_POOL_CAPACITY));
    let resolver = Arc::new(Resolver::new(
        config.resolver.dns_server,
        Duration::from_secs(config.resolver.timeout_secs),
    ));
    let server = Arc::new(Server::new(pool, resolver));

    tokio::select! {
        r = server.run(bind) => {
            if let Err(e) = r {
                tracing::error!(error = %e, "server exited with error");
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    Ok(())
}
