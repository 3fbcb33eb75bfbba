//! Read loop - reads frames and routes them by message type.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::handler::Message;
use super::pending::{CallSlot, Completion};
use crate::codec::{decode_payload, Value};
use crate::error::{QwireError, Result};
use crate::protocol::{Capacity, Frame, FrameBuffer, MessageType};

/// Everything the read loop routes frames to.
pub(crate) struct Router {
    pub(crate) capacity: Capacity,
    pub(crate) slot: Arc<CallSlot>,
    /// `None` when no async handler is registered.
    pub(crate) events: Option<mpsc::UnboundedSender<Message>>,
}

impl Router {
    /// Route one frame. An error here is fatal to the connection.
    pub(crate) fn dispatch_frame(&self, frame: &Frame) -> Result<()> {
        let message_type = frame.message_type();
        trace!(%message_type, len = frame.payload_len(), "Frame received");

        if let MessageType::Other(raw) = message_type {
            warn!("Dropping message with unknown type {}", raw);
            return Ok(());
        }

        let value = decode_payload(frame.payload(), frame.endianness(), self.capacity)?;

        match message_type {
            MessageType::Response => match self.slot.complete(value) {
                Completion::Delivered => {}
                Completion::Discarded => debug!("Discarding late response"),
                Completion::Unsolicited(value) => {
                    warn!("Response with no pending call");
                    self.deliver(message_type, frame, value);
                }
            },
            _ => self.deliver(message_type, frame, value),
        }

        Ok(())
    }

    fn deliver(&self, message_type: MessageType, frame: &Frame, value: Value) {
        let Some(events) = &self.events else {
            debug!(%message_type, "No async handler, dropping message");
            return;
        };
        let message = Message {
            message_type,
            endianness: frame.endianness(),
            value,
        };
        if events.send(message).is_err() {
            debug!("Async handler task gone, dropping message");
        }
    }
}

/// Main read loop. Returns `Ok(())` when the server closes the socket.
pub(crate) async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    mut frame_buffer: FrameBuffer,
    router: Router,
) -> Result<()> {
    let mut buf = vec![0u8; 64 * 1024]; // 64KB read buffer

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                if frame_buffer.has_partial() {
                    return Err(QwireError::protocol(format!(
                        "Connection closed inside a partial message ({} bytes buffered)",
                        frame_buffer.len()
                    )));
                }
                return Ok(());
            }
            Ok(n) => n,
            Err(e) => return Err(QwireError::Io(e)),
        };

        let frames = frame_buffer.push(&buf[..n])?;

        for frame in frames {
            router.dispatch_frame(&frame)?;
        }
    }
}
