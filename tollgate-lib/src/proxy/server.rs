use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::Result;
use crate::proxy::context::ProxyContext;
use crate::proxy::worker::handle_connection;

const LISTEN_BACKLOG: i32 = 50;

/// Accept loop: one detached worker per connection, shutdown observed
/// through the watch channel. When logging is enabled the reduced
/// statistics are flushed through the sink before returning.
pub async fn run(ctx: Arc<ProxyContext>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let listener = bind_listener(ctx.config.port)?;
    let local = listener.local_addr()?;
    info!(addr = %local, "proxy listening");

    loop {
        tokio::select! {
            res = shutdown.changed() => {
                if res.is_ok() {
                    info!("shutdown signal received, stopping accept loop");
                } else {
                    warn!("shutdown channel closed, stopping accept loop");
                }
                break;
            }
            result = listener.accept() => {
                let (client, peer) = match result {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };
                info!(%peer, "accepted connection");
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    handle_connection(ctx, client, peer).await;
                });
            }
        }
    }

    if ctx.config.logging_enabled {
        ctx.sink.flush_summary(&ctx.stats.reduce());
    }
    Ok(())
}

/// Bind on all interfaces with address reuse and the fixed backlog.
fn bind_listener(port: u16) -> std::io::Result<TcpListener> {
    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;
    TcpListener::from_std(socket.into())
}
