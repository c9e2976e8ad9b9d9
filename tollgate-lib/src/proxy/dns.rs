use std::io;
use std::net::SocketAddr;

use tokio::net::lookup_host;

/// Resolve a hostname through the system resolver.
///
/// Returns the first address the resolver yields; no caching beyond what
/// the host resolver provides.
pub async fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    let mut addrs = lookup_host((host, port)).await?;
    addrs.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("no addresses found for {host}"))
    })
}
