//! # qwire-client
//!
//! Async Rust client for the kdb+/q IPC protocol.
//!
//! A connection starts with a handshake that authenticates and agrees on a
//! capacity level. After that every message is an 8-byte header followed
//! by one type-tagged value.
//!
//! ## Architecture
//!
//! - **Handshake** ([`handshake`]): credentials and capacity, once per connection
//! - **Framing** ([`protocol`]): header encode/decode and reassembly of partial reads
//! - **Values** ([`codec`]): atoms, vectors, dictionaries, tables, error values
//! - **Dispatch** ([`dispatch`]): one writer task, one read loop, at most one sync call in flight
//!
//! ## Example
//!
//! ```ignore
//! use qwire_client::{Connection, Value};
//!
//! #[tokio::main]
//! async fn main() -> qwire_client::Result<()> {
//!     let conn = Connection::builder()
//!         .auth("user:password")
//!         .connect("localhost:5000")
//!         .await?;
//!
//!     let sum = conn.call(&Value::list(vec![
//!         Value::string("+"),
//!         Value::from(1i64),
//!         Value::from(2i64),
//!     ])).await?;
//!     assert_eq!(sum, Value::from(3i64));
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod dispatch;
pub mod error;
pub mod handshake;
pub mod protocol;
pub mod transport;
pub mod writer;

mod client;

pub use client::{ConnectOptions, Connection, ConnectionBuilder};
pub use codec::{Atom, Dictionary, Table, Value, Vector, VectorData};
pub use dispatch::{AsyncHandler, Message};
pub use error::{QwireError, Result};
pub use protocol::{Capacity, Endianness, MessageType};
