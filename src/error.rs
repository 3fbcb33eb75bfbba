//! Error types for qwire-client.

use thiserror::Error;

/// Main error type for all qwire operations.
#[derive(Debug, Error)]
pub enum QwireError {
    /// I/O error while dialling, reading or writing the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS setup or handshake failure.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// The host name cannot be used as a TLS server name.
    #[error("Invalid TLS server name: {0}")]
    InvalidServerName(String),

    /// The server rejected the credentials or closed the connection during the handshake.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Malformed header or payload. The connection cannot be resynchronized.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server answered a sync call with an error value.
    #[error("Remote error: {0}")]
    Remote(String),

    /// A value that cannot be put on the wire (embedded NUL, ragged table, ...).
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Connection closed, either by the peer or by `close()`.
    #[error("Connection closed")]
    ConnectionClosed,

    /// An earlier fatal error invalidated the connection.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Dial, handshake or sync call did not finish in time.
    #[error("Operation timed out")]
    Timeout,

    /// Backpressure timeout - write queue full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,
}

impl QwireError {
    /// Build a protocol error from anything printable.
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Whether the connection must be dropped after this error.
    ///
    /// Remote errors, invalid values and timeouts leave the connection usable.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Remote(_) | Self::InvalidValue(_) | Self::Timeout | Self::BackpressureTimeout
        )
    }
}

/// Result type alias using QwireError.
pub type Result<T> = std::result::Result<T, QwireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_is_recoverable() {
        assert!(!QwireError::Remote("type".into()).is_fatal());
        assert!(!QwireError::Timeout.is_fatal());
    }

    #[test]
    fn test_protocol_error_is_fatal() {
        let err = QwireError::protocol("reserved bytes");
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "Protocol error: reserved bytes");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err: QwireError = io.into();
        assert!(matches!(err, QwireError::Io(_)));
        assert!(err.is_fatal());
    }
}
