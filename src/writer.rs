//! Dedicated writer task, the only owner of the stream's write half.
//!
//! Every outgoing frame goes through one mpsc channel, so two frames can
//! never interleave on the wire no matter how many tasks send.
//!
//! ```text
//! call()       ─┐
//! send_async() ─┼─► mpsc::Sender<OutboundFrame> ─► writer_loop ─► socket
//! query()      ─┘
//! ```
//!
//! Whatever is already queued when the task wakes goes out in one
//! `write_vectored` call. A shared backlog counter limits how many frames
//! may wait unwritten.

use std::io::{self, IoSlice};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::trace;

use crate::error::{QwireError, Result};
use crate::protocol::{Endianness, Header, MessageType, HEADER_SIZE};

/// Default limit of unwritten frames before senders wait.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default time a sender waits for the backlog to drain.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_BATCH_SIZE: usize = 64;

/// A header and an encoded value, ready for the socket.
#[derive(Debug)]
pub struct OutboundFrame {
    pub header: [u8; HEADER_SIZE],
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Build a frame around an encoded payload.
    ///
    /// Fails if the payload is too large for the 32-bit length field.
    pub fn new(message_type: MessageType, endianness: Endianness, payload: Bytes) -> Result<Self> {
        let header = Header::new(message_type, endianness, payload.len())?;
        Ok(Self::from_header(&header, payload))
    }

    #[inline]
    pub fn from_header(header: &Header, payload: Bytes) -> Self {
        Self {
            header: header.encode(),
            payload,
        }
    }
}

/// Limits for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Unwritten frames allowed before `send` starts waiting.
    pub max_pending_frames: usize,
    /// Capacity of the frame channel.
    pub channel_capacity: usize,
    /// How long `send` waits for the backlog before giving up.
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

/// Frames handed to the channel but not yet written.
#[derive(Debug, Default)]
struct Backlog {
    queued: AtomicUsize,
    drained: Notify,
}

impl Backlog {
    fn written(&self, frames: usize) {
        self.queued.fetch_sub(frames, Ordering::AcqRel);
        self.drained.notify_waiters();
    }
}

/// Handle for queueing frames on the writer task.
///
/// Cheaply cloneable. Dropping the last clone shuts the writer down.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    backlog: Arc<Backlog>,
    max_pending: usize,
    timeout: Duration,
}

impl WriterHandle {
    fn new(tx: mpsc::Sender<OutboundFrame>, backlog: Arc<Backlog>, config: &WriterConfig) -> Self {
        Self {
            tx,
            backlog,
            max_pending: config.max_pending_frames,
            timeout: config.backpressure_timeout,
        }
    }

    /// Queue a frame for writing.
    ///
    /// Waits up to the backpressure timeout while the backlog is full.
    /// Cancel safe: a frame is counted only once it sits in the channel.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        if self.is_backpressure_active() {
            tokio::time::timeout(self.timeout, self.below_limit())
                .await
                .map_err(|_| QwireError::BackpressureTimeout)?;
        }

        let permit = self
            .tx
            .reserve()
            .await
            .map_err(|_| QwireError::ConnectionClosed)?;
        self.backlog.queued.fetch_add(1, Ordering::AcqRel);
        permit.send(frame);
        Ok(())
    }

    async fn below_limit(&self) {
        loop {
            // Registered before the check so a wakeup in between is not lost.
            let drained = self.backlog.drained.notified();
            if !self.is_backpressure_active() {
                return;
            }
            drained.await;
        }
    }

    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.pending_count() >= self.max_pending
    }

    /// Frames queued but not yet written.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.backlog.queued.load(Ordering::Acquire)
    }
}

/// Spawn the writer task over `writer`.
///
/// The task ends with `Ok(())` after every handle is dropped and the queue
/// is flushed, or with the first write error.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let backlog = Arc::new(Backlog::default());
    let handle = WriterHandle::new(tx, backlog.clone(), &config);
    let task = tokio::spawn(writer_loop(rx, writer, backlog));
    (handle, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
    backlog: Arc<Backlog>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);

    // recv_many waits for one frame, then takes whatever else is ready.
    while rx.recv_many(&mut batch, MAX_BATCH_SIZE).await > 0 {
        write_batch(&mut writer, &batch).await?;
        trace!(frames = batch.len(), "Batch written");
        backlog.written(batch.len());
        batch.clear();
    }

    // Every handle is gone: send FIN to the server.
    writer.shutdown().await?;
    Ok(())
}

/// Write frames back to back with vectored I/O, resuming after short writes.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut storage: Vec<IoSlice<'_>> = batch
        .iter()
        .flat_map(|frame| [IoSlice::new(&frame.header), IoSlice::new(&frame.payload)])
        .filter(|slice| !slice.is_empty())
        .collect();
    let mut slices = &mut storage[..];

    while !slices.is_empty() {
        let n = writer.write_vectored(slices).await?;
        if n == 0 {
            return Err(io::Error::from(io::ErrorKind::WriteZero).into());
        }
        IoSlice::advance_slices(&mut slices, n);
    }

    writer.flush().await?;
    Ok(())
}
