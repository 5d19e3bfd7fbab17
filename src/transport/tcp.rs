//! TCP connect with a bounded wait.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use pixelflut_client::transport::connect;
//!
//! let stream = connect("pixelflut.example.org:1234", Duration::from_secs(5)).await?;
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{lookup_host, TcpStream};

use crate::error::{PixelflutError, Result};

/// Resolve `address` (`host:port`) to socket addresses.
///
/// DNS failures and empty results are connection errors.
pub async fn resolve(address: &str) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = lookup_host(address).await?.collect();
    if addrs.is_empty() {
        return Err(PixelflutError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} did not resolve to any address", address),
        )));
    }
    Ok(addrs)
}

/// Connect to the first reachable address of `address` within `timeout`.
///
/// The timeout covers resolution and every connect attempt together.
/// Nagle is disabled: commands are small and latency adds up per row.
pub async fn connect(address: &str, timeout: Duration) -> Result<TcpStream> {
    let attempt = async {
        let mut last_err = None;
        for addr in resolve(address).await? {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    tracing::debug!("Connected to {} ({})", address, addr);
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::debug!("Connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }
        Err(PixelflutError::Io(last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "no address attempted")
        })))
    };

    tokio::time::timeout(timeout, attempt)
        .await
        .map_err(|_| PixelflutError::Timeout {
            operation: "connect",
            after: timeout,
        })?
}
