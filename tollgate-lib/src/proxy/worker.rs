use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::proxy::classify::classify;
use crate::proxy::context::ProxyContext;
use crate::proxy::dns;
use crate::proxy::forward::forward_http;
use crate::proxy::tunnel::tunnel_connect;
use crate::security::Admission;
use crate::sink::ProxyEvent;

/// Per-connection pipeline: admit, read, classify, policy, resolve,
/// dispatch. Terminal errors answer with a status line where the
/// protocol allows one; nothing propagates out of the task.
pub async fn handle_connection(ctx: Arc<ProxyContext>, mut client: TcpStream, peer: SocketAddr) {
    let source_ip = peer.ip();

    // Rate-limited connections are turned away before any byte is read.
    if let Admission::Limited { current } = ctx.limiter.admit(source_ip) {
        warn!(peer = %source_ip, current, "rate limit exceeded");
        ctx.sink.emit(&ProxyEvent::RateLimited {
            source_ip: source_ip.to_string(),
            current_count: current,
        });
        send_status(&mut client, 429, "Too Many Requests").await;
        return;
    }

    let mut raw = vec![0u8; ctx.config.buffer_size];
    let n = match timeout(ctx.config.timeouts.client_read(), client.read(&mut raw)).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            debug!(peer = %source_ip, error = %e, "client read failed");
            return;
        }
        Err(_) => {
            debug!(peer = %source_ip, "client read timed out");
            return;
        }
    };
    if n == 0 {
        send_status(&mut client, 502, "Bad Gateway").await;
        return;
    }
    raw.truncate(n);

    let Some(request) = classify(&raw) else {
        send_status(&mut client, 400, "Bad Request").await;
        return;
    };

    if ctx.blocklist.is_blocked(&request.host) {
        info!(host = %request.host, peer = %source_ip, "blocked request");
        ctx.sink.emit(&ProxyEvent::RequestBlocked {
            host: request.host.clone(),
            source_ip: source_ip.to_string(),
        });
        send_status(&mut client, 403, "Forbidden").await;
        return;
    }

    let origin = match dns::resolve(&request.host, request.port).await {
        Ok(addr) => addr,
        Err(e) => {
            debug!(host = %request.host, error = %e, "resolution failed");
            send_status(&mut client, 502, "Bad Gateway").await;
            return;
        }
    };

    let start = Instant::now();
    if request.is_tunnel {
        tunnel_connect(&ctx, client, origin, &request, source_ip, &raw, start).await;
    } else {
        forward_http(&ctx, client, origin, &request, source_ip, &raw, start).await;
    }
}

/// Best-effort status-line-only response; the socket closes when dropped.
pub(crate) async fn send_status(client: &mut TcpStream, code: u16, reason: &str) {
    let line = format!("HTTP/1.1 {code} {reason}\r\n\r\n");
    if let Err(e) = client.write_all(line.as_bytes()).await {
        debug!(code, error = %e, "failed to send error response");
    }
    let _ = client.shutdown().await;
}
