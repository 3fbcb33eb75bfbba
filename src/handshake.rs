//! Connection handshake and capacity negotiation.
//!
//! The client sends `<auth><capacity>\0` in one write. The server answers
//! with exactly one byte, its own capacity, or closes the socket when it
//! rejects the credentials.
//!
//! # Example
//!
//! ```ignore
//! use qwire_client::handshake::negotiate;
//! use qwire_client::protocol::Capacity;
//!
//! let mut stream = tokio::net::TcpStream::connect("localhost:5001").await?;
//! let capacity = negotiate(&mut stream, "user:pass", Capacity::V3).await?;
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::{QwireError, Result};
use crate::protocol::Capacity;

/// Bytes the client sends for a handshake.
pub fn handshake_request(auth: &str, requested: Capacity) -> Result<Vec<u8>> {
    if auth.as_bytes().contains(&0) {
        return Err(QwireError::InvalidValue(
            "Credentials must not contain a NUL byte".into(),
        ));
    }
    let mut request = Vec::with_capacity(auth.len() + 2);
    request.extend_from_slice(auth.as_bytes());
    request.push(requested.as_u8());
    request.push(0);
    Ok(request)
}

/// Run the handshake on a fresh stream and return the agreed capacity.
///
/// The reply is read once into a buffer of `auth.len() + 2` bytes. Exactly
/// one byte is success; anything else, including the server closing the
/// socket, is [`QwireError::Authentication`]. The caller owns the stream and
/// must drop it on failure.
pub async fn negotiate<S>(stream: &mut S, auth: &str, requested: Capacity) -> Result<Capacity>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = handshake_request(auth, requested)?;
    stream.write_all(&request).await?;
    stream.flush().await?;

    let mut reply = vec![0u8; auth.len() + 2];
    let n = match stream.read(&mut reply).await {
        Ok(n) => n,
        Err(e) => {
            return Err(QwireError::Authentication(format!(
                "Handshake read failed: {}",
                e
            )))
        }
    };

    if n != 1 {
        return Err(QwireError::Authentication(format!(
            "Expected a 1-byte handshake reply, got {} bytes {:02x?}",
            n,
            &reply[..n]
        )));
    }

    let server = Capacity::from(reply[0]);
    if server > requested {
        warn!(%requested, %server, "Server replied above the requested capacity");
    }
    let negotiated = requested.min(server);
    debug!(%requested, %server, %negotiated, "Handshake complete");

    Ok(negotiated)
}
