//! Transport module - byte streams the connection runs over.
//!
//! Provides:
//! - Plain TCP via [`dial_tcp`]
//! - TLS over TCP via [`dial_tls`] (rustls)
//!
//! Anything else implementing [`AsyncStream`] can be handed to
//! [`Connection::connect_stream`](crate::Connection::connect_stream).

mod tcp;

pub use tcp::{dial_tcp, dial_tls, AsyncStream};
