//! Connection builder and handle.
//!
//! The [`ConnectionBuilder`] provides a fluent API for configuring the
//! connection. Connecting runs through these steps:
//! 1. Dial TCP (optionally TLS), or take a caller-supplied stream
//! 2. Handshake and negotiate the capacity
//! 3. Spawn the writer task and the read loop
//!
//! A failed handshake shuts the stream down and returns no [`Connection`].
//!
//! # Example
//!
//! ```ignore
//! use qwire_client::{Connection, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let conn = Connection::builder()
//!         .auth("user:password")
//!         .call_timeout(std::time::Duration::from_secs(5))
//!         .connect("localhost:5000")
//!         .await?;
//!
//!     let result = conn.query("til 10").await?;
//!     println!("{:?}", result);
//!
//!     conn.close();
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rustls::ClientConfig;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::ToSocketAddrs;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::codec::{encode_value, Value};
use crate::dispatch::{read_loop, spawn_handler_task, AsyncHandler, CallSlot, Router};
use crate::error::{QwireError, Result};
use crate::handshake::negotiate;
use crate::protocol::{Capacity, Endianness, FrameBuffer, MessageType, DEFAULT_MAX_MESSAGE_SIZE};
use crate::transport::{dial_tcp, dial_tls, AsyncStream};
use crate::writer::{
    spawn_writer_task, OutboundFrame, WriterConfig, WriterHandle, DEFAULT_BACKPRESSURE_TIMEOUT,
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_PENDING_FRAMES,
};

/// Connection settings.
///
/// Deserializable with defaults for every missing field, so it can be read
/// from an application's own config file.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    /// `"user:password"`, `"user"`, or empty.
    pub auth: String,
    /// Highest capacity to request. Default: 3
    pub capacity: Capacity,
    /// Byte order of outgoing messages. Default: little
    pub endianness: Endianness,
    /// Limit for one sync call, including waiting for earlier calls.
    pub call_timeout: Option<Duration>,
    /// Limit for dial plus handshake.
    pub connect_timeout: Option<Duration>,
    /// Largest inbound message accepted, header included. Default: 1 GiB
    pub max_message_size: u32,
    /// Default: 1024
    pub max_pending_frames: usize,
    /// Default: 1024
    pub channel_capacity: usize,
    /// Default: 5 seconds
    pub backpressure_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            auth: String::new(),
            capacity: Capacity::DEFAULT,
            endianness: Endianness::default(),
            call_timeout: None,
            connect_timeout: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

impl ConnectOptions {
    fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            max_pending_frames: self.max_pending_frames,
            channel_capacity: self.channel_capacity,
            backpressure_timeout: self.backpressure_timeout,
        }
    }
}

// Keeps the password out of logs.
impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let user = self.auth.split(':').next().unwrap_or("");
        f.debug_struct("ConnectOptions")
            .field("user", &user)
            .field("capacity", &self.capacity)
            .field("endianness", &self.endianness)
            .field("call_timeout", &self.call_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("max_message_size", &self.max_message_size)
            .field("max_pending_frames", &self.max_pending_frames)
            .field("channel_capacity", &self.channel_capacity)
            .field("backpressure_timeout", &self.backpressure_timeout)
            .finish()
    }
}

/// Builder for configuring and opening a [`Connection`].
pub struct ConnectionBuilder {
    options: ConnectOptions,
    handler: Option<Arc<dyn AsyncHandler>>,
}

impl ConnectionBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::from_options(ConnectOptions::default())
    }

    /// Start from loaded options.
    pub fn from_options(options: ConnectOptions) -> Self {
        Self {
            options,
            handler: None,
        }
    }

    /// Set the credentials sent in the handshake.
    pub fn auth(mut self, auth: impl Into<String>) -> Self {
        self.options.auth = auth.into();
        self
    }

    /// Set the highest capacity to request.
    ///
    /// Default: 3
    pub fn capacity(mut self, capacity: Capacity) -> Self {
        self.options.capacity = capacity;
        self
    }

    /// Set the byte order of outgoing messages.
    ///
    /// Default: little
    pub fn endianness(mut self, endianness: Endianness) -> Self {
        self.options.endianness = endianness;
        self
    }

    /// Fail sync calls that take longer than `timeout`.
    ///
    /// The request is still on the wire; its late response is discarded.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.options.call_timeout = Some(timeout);
        self
    }

    /// Limit dial plus handshake time.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = Some(timeout);
        self
    }

    /// Set the largest accepted inbound message.
    ///
    /// Default: 1 GiB
    pub fn max_message_size(mut self, size: u32) -> Self {
        self.options.max_message_size = size;
        self
    }

    /// Set the maximum pending frames for backpressure.
    ///
    /// Default: 1024
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.options.max_pending_frames = limit;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.options.channel_capacity = capacity;
        self
    }

    /// Set the backpressure timeout.
    ///
    /// Default: 5 seconds
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.options.backpressure_timeout = timeout;
        self
    }

    /// Register the handler for async and unsolicited messages.
    ///
    /// Without one, such messages are logged and dropped.
    pub fn on_async<H: AsyncHandler>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Dial `addr` over plain TCP and handshake.
    pub async fn connect<A: ToSocketAddrs>(self, addr: A) -> Result<Connection> {
        let limit = self.options.connect_timeout;
        with_timeout(limit, async move {
            let stream = dial_tcp(addr).await?;
            self.establish(stream).await
        })
        .await
    }

    /// Dial `addr`, run TLS with `server_name`, then handshake.
    pub async fn connect_tls<A: ToSocketAddrs>(
        self,
        addr: A,
        server_name: &str,
        config: Arc<ClientConfig>,
    ) -> Result<Connection> {
        let limit = self.options.connect_timeout;
        with_timeout(limit, async move {
            let stream = dial_tls(addr, server_name, config).await?;
            self.establish(stream).await
        })
        .await
    }

    /// Handshake over an already open stream.
    pub async fn connect_stream<S: AsyncStream>(self, stream: S) -> Result<Connection> {
        let limit = self.options.connect_timeout;
        with_timeout(limit, self.establish(stream)).await
    }

    async fn establish<S: AsyncStream>(self, mut stream: S) -> Result<Connection> {
        let options = &self.options;
        let capacity = match negotiate(&mut stream, &options.auth, options.capacity).await {
            Ok(capacity) => capacity,
            Err(e) => {
                let _ = stream.shutdown().await;
                return Err(e);
            }
        };

        Ok(Connection::start(stream, capacity, self.options, self.handler))
    }
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn with_timeout<T, F>(limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| QwireError::Timeout)?,
        None => fut.await,
    }
}

/// An open, negotiated connection.
///
/// All methods take `&self`; share it between tasks with an `Arc`. Sync
/// calls from different tasks run one at a time in arrival order. Dropping
/// the connection closes it.
pub struct Connection {
    writer: Mutex<Option<WriterHandle>>,
    slot: Arc<CallSlot>,
    reader_task: JoinHandle<()>,
    capacity: Capacity,
    endianness: Endianness,
    call_timeout: Option<Duration>,
}

impl Connection {
    /// Create a new connection builder.
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Plain TCP connect with default options.
    pub async fn connect<A: ToSocketAddrs>(addr: A, auth: &str) -> Result<Self> {
        ConnectionBuilder::new().auth(auth).connect(addr).await
    }

    fn start<S: AsyncStream>(
        stream: S,
        capacity: Capacity,
        options: ConnectOptions,
        handler: Option<Arc<dyn AsyncHandler>>,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);

        let (writer, writer_task) = spawn_writer_task(write_half, options.writer_config());
        let slot = Arc::new(CallSlot::new());

        let events = handler.map(|handler| spawn_handler_task(handler).0);
        let router = Router {
            capacity,
            slot: slot.clone(),
            events,
        };
        let frame_buffer = FrameBuffer::with_max_message_size(options.max_message_size);

        let reader_slot = slot.clone();
        let reader_task = tokio::spawn(async move {
            let reason = match read_loop(read_half, frame_buffer, router).await {
                Ok(()) => {
                    debug!("Server closed the connection");
                    QwireError::ConnectionClosed
                }
                Err(e) => {
                    error!("Read loop error: {}", e);
                    e
                }
            };
            reader_slot.fail(reason);
        });

        let writer_slot = slot.clone();
        tokio::spawn(async move {
            let reason = match writer_task.await {
                Ok(Ok(())) => return,
                Ok(Err(e)) => e,
                Err(e) => QwireError::ConnectionLost(format!("writer task failed: {}", e)),
            };
            error!("Writer task error: {}", reason);
            writer_slot.fail(reason);
        });

        debug!(%capacity, "Connection established");

        Self {
            writer: Mutex::new(Some(writer)),
            slot,
            reader_task,
            capacity,
            endianness: options.endianness,
            call_timeout: options.call_timeout,
        }
    }

    fn lock_writer(&self) -> MutexGuard<'_, Option<WriterHandle>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn writer(&self) -> Result<WriterHandle> {
        if self.slot.is_closed() {
            return Err(self.slot.closed_error());
        }
        self.lock_writer()
            .clone()
            .ok_or(QwireError::ConnectionClosed)
    }

    fn frame(&self, message_type: MessageType, value: &Value) -> Result<OutboundFrame> {
        let payload = encode_value(value, self.endianness, self.capacity)?;
        OutboundFrame::new(message_type, self.endianness, payload)
    }

    /// Send a sync message and wait for its response.
    ///
    /// An error value in the response comes back as [`QwireError::Remote`]
    /// and leaves the connection usable.
    pub async fn call(&self, value: &Value) -> Result<Value> {
        let reply = with_timeout(self.call_timeout, self.exchange(value)).await?;
        reply.into_result()
    }

    async fn exchange(&self, value: &Value) -> Result<Value> {
        let frame = self.frame(MessageType::Sync, value)?;

        let (guard, reply) = self.slot.begin().await?;
        self.writer()?.send(frame).await?;
        guard.disarm();

        match reply.await {
            Ok(result) => result,
            Err(_) => Err(self.slot.closed_error()),
        }
    }

    /// Evaluate q source text on the server.
    pub async fn query(&self, text: &str) -> Result<Value> {
        self.call(&Value::string(text)).await
    }

    /// Send an async message. Returns once it is queued for writing.
    pub async fn send_async(&self, value: &Value) -> Result<()> {
        let frame = self.frame(MessageType::Async, value)?;
        self.writer()?.send(frame).await
    }

    /// Capacity agreed in the handshake.
    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// Byte order of outgoing messages.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// True after `close()` or a fatal error.
    pub fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }

    /// Get the current backpressure status.
    pub fn is_backpressure_active(&self) -> bool {
        self.lock_writer()
            .as_ref()
            .is_some_and(WriterHandle::is_backpressure_active)
    }

    /// Get the current pending frame count.
    pub fn pending_frames(&self) -> usize {
        self.lock_writer()
            .as_ref()
            .map_or(0, WriterHandle::pending_count)
    }

    /// Close the connection. Safe to call more than once.
    ///
    /// A pending call fails with [`QwireError::ConnectionClosed`]. Frames
    /// already queued are still written before the socket is shut down.
    pub fn close(&self) {
        if self.slot.close() {
            debug!("Closing connection");
        }
        self.lock_writer().take();
        self.reader_task.abort();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("capacity", &self.capacity)
            .field("endianness", &self.endianness)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Message;

    #[test]
    fn test_builder_default() {
        let builder = ConnectionBuilder::default();
        assert_eq!(builder.options, ConnectOptions::default());
        assert!(builder.handler.is_none());
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Connection::builder()
            .auth("user:secret")
            .capacity(Capacity::V6)
            .endianness(Endianness::Big)
            .call_timeout(Duration::from_secs(2))
            .connect_timeout(Duration::from_secs(1))
            .max_message_size(1024)
            .max_pending_frames(2048)
            .channel_capacity(512)
            .backpressure_timeout(Duration::from_secs(10))
            .on_async(|_msg: Message| async {});

        let options = &builder.options;
        assert_eq!(options.auth, "user:secret");
        assert_eq!(options.capacity, Capacity::V6);
        assert_eq!(options.endianness, Endianness::Big);
        assert_eq!(options.call_timeout, Some(Duration::from_secs(2)));
        assert_eq!(options.connect_timeout, Some(Duration::from_secs(1)));
        assert_eq!(options.max_message_size, 1024);
        assert_eq!(options.writer_config().max_pending_frames, 2048);
        assert_eq!(options.writer_config().channel_capacity, 512);
        assert_eq!(
            options.writer_config().backpressure_timeout,
            Duration::from_secs(10)
        );
        assert!(builder.handler.is_some());
    }

    #[test]
    fn test_options_debug_hides_password() {
        let options = ConnectOptions {
            auth: "alice:hunter2".into(),
            ..Default::default()
        };
        let printed = format!("{:?}", options);
        assert!(printed.contains("alice"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_options_from_partial_json() {
        let options: ConnectOptions = serde_json::from_str(
            r#"{"auth": "u:p", "capacity": 6, "endianness": "big", "call_timeout": {"secs": 3, "nanos": 0}}"#,
        )
        .unwrap();

        assert_eq!(options.capacity, Capacity::V6);
        assert_eq!(options.endianness, Endianness::Big);
        assert_eq!(options.call_timeout, Some(Duration::from_secs(3)));
        assert_eq!(options.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        assert_eq!(options.connect_timeout, None);
    }

    #[tokio::test]
    async fn test_connect_timeout_covers_handshake() {
        // The peer never answers the handshake.
        let (client, _server) = tokio::io::duplex(64);
        let result = Connection::builder()
            .connect_timeout(Duration::from_millis(20))
            .connect_stream(client)
            .await;

        assert!(matches!(result, Err(QwireError::Timeout)));
    }
}
