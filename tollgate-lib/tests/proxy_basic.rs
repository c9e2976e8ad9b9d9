#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tollgate_lib::sink::{EventSink, Protocol, ProxyEvent};
use tollgate_lib::stats::DomainSummary;
use tollgate_lib::{proxy, Config, ProxyContext};

type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

fn pick_free_port() -> TestResult<SocketAddr> {
    let listener = StdTcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

#[derive(Default)]
struct TestSink {
    events: Mutex<Vec<ProxyEvent>>,
    summaries: Mutex<Vec<BTreeMap<String, DomainSummary>>>,
}

impl TestSink {
    fn events(&self) -> Vec<ProxyEvent> {
        self.events.lock().expect("events lock").clone()
    }

    async fn wait_for_events(&self, count: usize) -> Vec<ProxyEvent> {
        for _ in 0..100 {
            let events = self.events();
            if events.len() >= count {
                return events;
            }
            sleep(Duration::from_millis(20)).await;
        }
        self.events()
    }
}

impl EventSink for TestSink {
    fn emit(&self, event: &ProxyEvent) {
        self.events.lock().expect("events lock").push(event.clone());
    }

    fn flush_summary(&self, summary: &BTreeMap<String, DomainSummary>) {
        self.summaries.lock().expect("summaries lock").push(summary.clone());
    }
}

fn make_config(port: u16) -> Config {
    Config { port, ..Config::default() }
}

async fn start_proxy(
    cfg: Config,
) -> TestResult<(Arc<ProxyContext>, Arc<TestSink>, watch::Sender<bool>, SocketAddr)> {
    let port = cfg.port;
    let sink = Arc::new(TestSink::default());
    let ctx = Arc::new(ProxyContext::new(cfg, sink.clone())?);

    let (tx, rx) = watch::channel(false);
    tokio::spawn({
        let ctx = ctx.clone();
        async move { proxy::run(ctx, rx).await }
    });

    // Give the proxy a moment to bind.
    sleep(Duration::from_millis(50)).await;
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse()?;
    Ok((ctx, sink, tx, addr))
}

/// Origin that records the received request and answers with a fixed
/// HTTP response before closing.
async fn spawn_http_origin(
    response: &'static str,
) -> TestResult<(SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>)> {
    let addr = pick_free_port()?;
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(_) => return,
        };
        loop {
            let Ok((mut s, _)) = listener.accept().await else {
                continue;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 65536];
                if let Ok(n) = s.read(&mut buf).await {
                    buf.truncate(n);
                    let _ = tx.send(buf);
                }
                let _ = s.write_all(response.as_bytes()).await;
                let _ = s.shutdown().await;
            });
        }
    });
    sleep(Duration::from_millis(50)).await;
    Ok((addr, rx))
}

/// Origin that echoes the first chunk it receives, then closes.
async fn spawn_echo_origin() -> TestResult<SocketAddr> {
    let addr = pick_free_port()?;
    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(_) => return,
        };
        loop {
            let Ok((mut s, _)) = listener.accept().await else {
                continue;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                if let Ok(n) = s.read(&mut buf).await {
                    if n > 0 {
                        let _ = s.write_all(&buf[..n]).await;
                    }
                }
                let _ = s.shutdown().await;
            });
        }
    });
    sleep(Duration::from_millis(50)).await;
    Ok(addr)
}

#[tokio::test]
async fn http_forward_rewrites_and_relays() -> TestResult<()> {
    let response = "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello";
    let (origin_addr, mut origin_rx) = spawn_http_origin(response).await?;
    let (ctx, sink, _tx, proxy_addr) = start_proxy(make_config(pick_free_port()?.port())).await?;

    let mut client = TcpStream::connect(proxy_addr).await?;
    let request = format!(
        "GET http://127.0.0.1:{port}/a?b=1 HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: keep-alive\r\n\r\n",
        port = origin_addr.port()
    );
    client.write_all(request.as_bytes()).await?;

    let mut received = Vec::new();
    client.read_to_end(&mut received).await?;
    assert_eq!(received, response.as_bytes());

    let forwarded = timeout(Duration::from_secs(2), origin_rx.recv())
        .await?
        .ok_or("origin saw no request")?;
    let forwarded = std::str::from_utf8(&forwarded)?;
    assert!(forwarded.starts_with("GET /a?b=1 HTTP/1.1\r\n"), "got: {forwarded}");
    assert!(forwarded.contains("\r\nConnection: close\r\n"));
    assert!(!forwarded.contains("keep-alive"));

    let events = sink.wait_for_events(1).await;
    match &events[..] {
        [ProxyEvent::RequestCompleted { host, protocol, bytes_sent, ttfb, .. }] => {
            assert_eq!(host, "127.0.0.1");
            assert_eq!(*protocol, Protocol::Http);
            assert_eq!(*bytes_sent, response.len() as u64);
            assert!(ttfb.is_some());
        }
        other => panic!("unexpected events: {other:?}"),
    }

    let reduced = ctx.stats.reduce();
    assert_eq!(reduced["127.0.0.1"].requests, 1);
    assert_eq!(reduced["127.0.0.1"].bytes_sent, response.len() as u64);
    Ok(())
}

#[tokio::test]
async fn connect_tunnel_establishes_and_accounts_bytes() -> TestResult<()> {
    let origin_addr = spawn_echo_origin().await?;
    let (ctx, sink, _tx, proxy_addr) = start_proxy(make_config(pick_free_port()?.port())).await?;

    let mut client = TcpStream::connect(proxy_addr).await?;
    let request = format!("CONNECT 127.0.0.1:{} HTTP/1.1\r\n\r\n", origin_addr.port());
    client.write_all(request.as_bytes()).await?;

    // The established line arrives before any relayed byte.
    let mut ack = vec![0u8; ESTABLISHED.len()];
    client.read_exact(&mut ack).await?;
    assert_eq!(ack, ESTABLISHED);

    client.write_all(b"hello").await?;
    let mut echoed = [0u8; 5];
    client.read_exact(&mut echoed).await?;
    assert_eq!(&echoed, b"hello");
    client.shutdown().await?;
    drop(client);

    let events = sink.wait_for_events(1).await;
    match &events[..] {
        [ProxyEvent::RequestCompleted {
            host,
            port,
            protocol,
            bytes_sent,
            bytes_received,
            ttfb,
            ..
        }] => {
            assert_eq!(host, "127.0.0.1");
            assert_eq!(*port, origin_addr.port());
            assert_eq!(*protocol, Protocol::Connect);
            assert_eq!(*bytes_received, 5, "client -> origin bytes");
            assert_eq!(*bytes_sent, 5, "origin -> client bytes");
            assert!(ttfb.is_some());
        }
        other => panic!("unexpected events: {other:?}"),
    }

    let reduced = ctx.stats.reduce();
    assert_eq!(reduced["127.0.0.1"].requests, 1);
    Ok(())
}

#[tokio::test]
async fn malformed_request_gets_400() -> TestResult<()> {
    let (_ctx, sink, _tx, proxy_addr) = start_proxy(make_config(pick_free_port()?.port())).await?;

    let mut client = TcpStream::connect(proxy_addr).await?;
    client.write_all(b"GARBAGE").await?;

    let mut response = Vec::new();
    client.read_to_end(&mut response).await?;
    assert_eq!(response, b"HTTP/1.1 400 Bad Request\r\n\r\n");
    assert!(sink.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn blocked_host_gets_403_and_event() -> TestResult<()> {
    let mut cfg = make_config(pick_free_port()?.port());
    cfg.blocklist = vec!["*.youtube.com".to_string()];
    let (_ctx, sink, _tx, proxy_addr) = start_proxy(cfg).await?;

    let mut client = TcpStream::connect(proxy_addr).await?;
    client.write_all(b"GET http://m.youtube.com/watch HTTP/1.1\r\n\r\n").await?;

    let mut response = Vec::new();
    client.read_to_end(&mut response).await?;
    assert_eq!(response, b"HTTP/1.1 403 Forbidden\r\n\r\n");

    let events = sink.wait_for_events(1).await;
    match &events[..] {
        [ProxyEvent::RequestBlocked { host, .. }] => assert_eq!(host, "m.youtube.com"),
        other => panic!("unexpected events: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn over_limit_source_gets_429_and_event() -> TestResult<()> {
    let mut cfg = make_config(pick_free_port()?.port());
    cfg.rate_limit.max_requests = 1;
    let (_ctx, sink, _tx, proxy_addr) = start_proxy(cfg).await?;

    // First connection takes the only slot in the window.
    let mut first = TcpStream::connect(proxy_addr).await?;
    first.write_all(b"GARBAGE").await?;
    let mut response = Vec::new();
    first.read_to_end(&mut response).await?;
    assert_eq!(response, b"HTTP/1.1 400 Bad Request\r\n\r\n");

    // Second connection is refused before any byte is read from it.
    let mut second = TcpStream::connect(proxy_addr).await?;
    let mut response = Vec::new();
    second.read_to_end(&mut response).await?;
    assert_eq!(response, b"HTTP/1.1 429 Too Many Requests\r\n\r\n");

    let events = sink.wait_for_events(1).await;
    match &events[..] {
        [ProxyEvent::RateLimited { current_count, .. }] => assert_eq!(*current_count, 1),
        other => panic!("unexpected events: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn empty_request_gets_502() -> TestResult<()> {
    let (_ctx, _sink, _tx, proxy_addr) = start_proxy(make_config(pick_free_port()?.port())).await?;

    let mut client = TcpStream::connect(proxy_addr).await?;
    client.shutdown().await?;

    let mut response = Vec::new();
    client.read_to_end(&mut response).await?;
    assert_eq!(response, b"HTTP/1.1 502 Bad Gateway\r\n\r\n");
    Ok(())
}

#[tokio::test]
async fn connect_to_down_origin_gets_502() -> TestResult<()> {
    let dead_addr = pick_free_port()?;
    let (_ctx, sink, _tx, proxy_addr) = start_proxy(make_config(pick_free_port()?.port())).await?;

    let mut client = TcpStream::connect(proxy_addr).await?;
    let request = format!("CONNECT 127.0.0.1:{} HTTP/1.1\r\n\r\n", dead_addr.port());
    client.write_all(request.as_bytes()).await?;

    let mut response = Vec::new();
    client.read_to_end(&mut response).await?;
    assert_eq!(response, b"HTTP/1.1 502 Bad Gateway\r\n\r\n");
    assert!(sink.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn shutdown_flushes_summary_when_logging() -> TestResult<()> {
    let mut cfg = make_config(pick_free_port()?.port());
    cfg.logging_enabled = true;
    cfg.blocklist = vec!["*.youtube.com".to_string()];

    let port = cfg.port;
    let sink = Arc::new(TestSink::default());
    let ctx = Arc::new(ProxyContext::new(cfg, sink.clone())?);
    let (tx, rx) = watch::channel(false);
    let server = tokio::spawn({
        let ctx = ctx.clone();
        async move { proxy::run(ctx, rx).await }
    });
    sleep(Duration::from_millis(50)).await;

    let mut client = TcpStream::connect(format!("127.0.0.1:{port}")).await?;
    client.write_all(b"GET http://m.youtube.com/ HTTP/1.1\r\n\r\n").await?;
    let mut response = Vec::new();
    client.read_to_end(&mut response).await?;

    tx.send(true)?;
    timeout(Duration::from_secs(2), server).await???;

    let summaries = sink.summaries.lock().expect("summaries lock");
    assert_eq!(summaries.len(), 1);
    // Blocked requests never reach the stats aggregator.
    assert!(summaries[0].is_empty());
    Ok(())
}
