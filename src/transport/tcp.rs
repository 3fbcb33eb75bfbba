//! TCP and TLS dialing.
//!
//! # Example
//!
//! ```ignore
//! use qwire_client::transport::dial_tcp;
//!
//! let stream = dial_tcp("localhost:5001").await?;
//! ```

use std::io;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::{QwireError, Result};

/// A duplex byte stream a connection can own.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Open a TCP connection with Nagle disabled.
pub async fn dial_tcp<A: ToSocketAddrs>(addr: A) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    debug!(peer = ?stream.peer_addr().ok(), "TCP connected");
    Ok(stream)
}

/// Open a TCP connection and run the TLS client handshake on it.
///
/// `server_name` is used for SNI and certificate verification.
pub async fn dial_tls<A: ToSocketAddrs>(
    addr: A,
    server_name: &str,
    config: Arc<ClientConfig>,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let name = ServerName::try_from(server_name.to_owned())
        .map_err(|_| QwireError::InvalidServerName(server_name.to_owned()))?;

    let tcp = dial_tcp(addr).await?;
    let stream = TlsConnector::from(config)
        .connect(name, tcp)
        .await
        .map_err(tls_failure)?;
    debug!(server_name, "TLS established");
    Ok(stream)
}

// tokio-rustls reports rustls failures wrapped in an io::Error.
fn tls_failure(err: io::Error) -> QwireError {
    match err.get_ref().and_then(|inner| inner.downcast_ref::<rustls::Error>()) {
        Some(tls) => QwireError::Tls(tls.clone()),
        None => QwireError::Io(err),
    }
}
