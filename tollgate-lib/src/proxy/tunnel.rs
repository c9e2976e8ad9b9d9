use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::proxy::classify::RequestInfo;
use crate::proxy::context::ProxyContext;
use crate::proxy::worker::send_status;
use crate::sink::{excerpt, Protocol, ProxyEvent};

const ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// Bridge a CONNECT tunnel: dial the origin, acknowledge the client and
/// relay bytes both ways until either side closes.
///
/// Each direction runs as its own task and reports its byte count
/// through its join handle. A relay that observes EOF or an error shuts
/// down its write side, which unwinds the opposite relay: one half-close
/// tears the whole tunnel down.
pub(crate) async fn tunnel_connect(
    ctx: &ProxyContext,
    mut client: TcpStream,
    origin_addr: SocketAddr,
    request: &RequestInfo,
    source_ip: IpAddr,
    raw: &[u8],
    start: Instant,
) {
    let connect = timeout(ctx.config.timeouts.connect_https(), TcpStream::connect(origin_addr));
    let origin = match connect.await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            debug!(host = %request.host, error = %e, "tunnel connect failed");
            send_status(&mut client, 502, "Bad Gateway").await;
            return;
        }
        Err(_) => {
            debug!(host = %request.host, "tunnel connect timed out");
            send_status(&mut client, 502, "Bad Gateway").await;
            return;
        }
    };

    if let Err(e) = client.write_all(ESTABLISHED).await {
        debug!(host = %request.host, error = %e, "client went away before tunnel start");
        return;
    }
    let ttfb = start.elapsed().as_secs_f64();

    let (client_read, client_write) = client.into_split();
    let (origin_read, origin_write) = origin.into_split();

    let buffer_size = ctx.config.buffer_size;
    let upstream = tokio::spawn(relay(client_read, origin_write, buffer_size));
    let downstream = tokio::spawn(relay(origin_read, client_write, buffer_size));

    // client -> origin counts as received, origin -> client as sent
    let bytes_received = upstream.await.unwrap_or(0);
    let bytes_sent = downstream.await.unwrap_or(0);

    let duration = start.elapsed().as_secs_f64();
    ctx.stats.record(&request.host, bytes_sent, bytes_received, duration, Some(ttfb));
    ctx.sink.emit(&ProxyEvent::RequestCompleted {
        host: request.host.clone(),
        source_ip: source_ip.to_string(),
        port: request.port,
        protocol: Protocol::Connect,
        bytes_sent,
        bytes_received,
        duration,
        ttfb: Some(ttfb),
        raw_request_excerpt: Some(excerpt(&String::from_utf8_lossy(raw))),
        response_excerpt: None,
    });
}

/// Copy bytes one way until EOF or an error, then shut down the write
/// side so the opposite relay unwinds. Returns the bytes moved.
async fn relay(mut from: OwnedReadHalf, mut to: OwnedWriteHalf, buffer_size: usize) -> u64 {
    let mut buf = vec![0u8; buffer_size];
    let mut total: u64 = 0;
    loop {
        let n = match from.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };
        if to.write_all(&buf[..n]).await.is_err() {
            break;
        }
        total += n as u64;
    }
    let _ = to.shutdown().await;
    total
}
