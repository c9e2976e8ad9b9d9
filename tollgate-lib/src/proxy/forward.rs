use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error};

use crate::proxy::classify::RequestInfo;
use crate::proxy::context::ProxyContext;
use crate::proxy::rewrite::rewrite_request;
use crate::sink::{excerpt, Protocol, ProxyEvent, EXCERPT_LIMIT};

/// Forward one plain HTTP exchange and stream the origin response back.
///
/// The request is rewritten to origin-form with `Connection: close`, so
/// the response is read until the origin hangs up. A peer that resets or
/// goes away mid-stream ends the exchange normally with the bytes moved
/// so far; only the dial and the initial send can fail it outright.
pub(crate) async fn forward_http(
    ctx: &ProxyContext,
    mut client: TcpStream,
    origin_addr: SocketAddr,
    request: &RequestInfo,
    source_ip: IpAddr,
    raw: &[u8],
    start: Instant,
) {
    let client_text = String::from_utf8_lossy(raw).into_owned();
    let rewritten = rewrite_request(&client_text);

    let connect = timeout(ctx.config.timeouts.connect_http(), TcpStream::connect(origin_addr));
    let mut origin = match connect.await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            debug!(host = %request.host, error = %e, "origin connect failed");
            return;
        }
        Err(_) => {
            debug!(host = %request.host, "origin connect timed out");
            return;
        }
    };

    if let Err(e) = origin.write_all(rewritten.as_bytes()).await {
        error!(host = %request.host, error = %e, "failed to send request to origin");
        return;
    }

    let mut bytes_sent: u64 = 0;
    let mut ttfb: Option<f64> = None;
    let mut response_head: Vec<u8> = Vec::new();
    let mut buf = vec![0u8; ctx.config.buffer_size];

    loop {
        let n = match origin.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if is_disconnect(&e) => break,
            Err(e) => {
                error!(host = %request.host, error = %e, "origin read failed");
                return;
            }
        };
        match client.write_all(&buf[..n]).await {
            Ok(()) => {}
            Err(e) if is_disconnect(&e) => break,
            Err(e) => {
                error!(host = %request.host, error = %e, "client write failed");
                return;
            }
        }
        if ttfb.is_none() {
            ttfb = Some(start.elapsed().as_secs_f64());
        }
        bytes_sent += n as u64;
        if response_head.len() < EXCERPT_LIMIT {
            let need = EXCERPT_LIMIT - response_head.len();
            response_head.extend_from_slice(&buf[..n.min(need)]);
        }
    }

    let duration = start.elapsed().as_secs_f64();
    let bytes_received = client_text.len() as u64;

    ctx.stats.record(&request.host, bytes_sent, bytes_received, duration, ttfb);
    ctx.sink.emit(&ProxyEvent::RequestCompleted {
        host: request.host.clone(),
        source_ip: source_ip.to_string(),
        port: request.port,
        protocol: Protocol::Http,
        bytes_sent,
        bytes_received,
        duration,
        ttfb,
        raw_request_excerpt: Some(excerpt(&client_text)),
        response_excerpt: (!response_head.is_empty())
            .then(|| String::from_utf8_lossy(&response_head).into_owned()),
    });
}

/// Peer-went-away error kinds that end a stream without being failures.
fn is_disconnect(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
    )
}
