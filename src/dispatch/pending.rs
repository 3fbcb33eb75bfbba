//! The single outstanding synchronous call.
//!
//! The protocol has no correlation id, so a connection has at most one sync
//! request in flight. Callers queue on a one-permit semaphore (FIFO). The
//! permit is stored with the pending reply and is only released when the
//! matching response arrives, or the connection dies.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};

use crate::codec::Value;
use crate::error::{QwireError, Result};

/// Sender half for one call's reply.
pub(crate) type Reply = oneshot::Sender<Result<Value>>;

enum PendingCall {
    Idle,
    AwaitingResponse {
        reply: Reply,
        _permit: OwnedSemaphorePermit,
    },
}

#[derive(Debug, Clone)]
enum Closed {
    ByUser,
    Lost(String),
}

struct State {
    pending: PendingCall,
    closed: Option<Closed>,
}

/// What happened to a response handed to [`CallSlot::complete`].
#[derive(Debug)]
pub(crate) enum Completion {
    /// A caller was waiting and got it.
    Delivered,
    /// The caller gave up before the response arrived.
    Discarded,
    /// No call was pending; the value is returned to the caller.
    Unsolicited(Value),
}

/// Shared between the caller side and the read loop.
pub(crate) struct CallSlot {
    state: Mutex<State>,
    turn: Arc<Semaphore>,
}

impl CallSlot {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State {
                pending: PendingCall::Idle,
                closed: None,
            }),
            turn: Arc::new(Semaphore::new(1)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for the previous call to finish, then register a new one.
    ///
    /// The returned guard must be disarmed once the request is queued on the
    /// writer; dropping it armed puts the slot back to idle.
    pub(crate) async fn begin(
        &self,
    ) -> Result<(PendingGuard<'_>, oneshot::Receiver<Result<Value>>)> {
        let permit = match self.turn.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return Err(self.closed_error()),
        };

        let mut state = self.lock();
        if let Some(closed) = &state.closed {
            return Err(closed_to_error(closed));
        }

        let (tx, rx) = oneshot::channel();
        state.pending = PendingCall::AwaitingResponse {
            reply: tx,
            _permit: permit,
        };

        Ok((PendingGuard { slot: self, armed: true }, rx))
    }

    /// Hand a response to the waiting caller.
    pub(crate) fn complete(&self, value: Value) -> Completion {
        let pending = std::mem::replace(&mut self.lock().pending, PendingCall::Idle);
        match pending {
            PendingCall::AwaitingResponse { reply, _permit } => match reply.send(Ok(value)) {
                Ok(()) => Completion::Delivered,
                Err(_) => Completion::Discarded,
            },
            PendingCall::Idle => Completion::Unsolicited(value),
        }
    }

    /// Mark the connection dead and fail the pending call with `error`.
    ///
    /// The first reason sticks; later calls see it as `ConnectionLost`.
    pub(crate) fn fail(&self, error: QwireError) {
        let pending = {
            let mut state = self.lock();
            if state.closed.is_none() {
                state.closed = Some(Closed::Lost(error.to_string()));
            }
            std::mem::replace(&mut state.pending, PendingCall::Idle)
        };
        self.turn.close();

        if let PendingCall::AwaitingResponse { reply, .. } = pending {
            let _ = reply.send(Err(error));
        }
    }

    /// Close on behalf of the user. Returns false if already closed.
    pub(crate) fn close(&self) -> bool {
        let pending = {
            let mut state = self.lock();
            if state.closed.is_some() {
                return false;
            }
            state.closed = Some(Closed::ByUser);
            std::mem::replace(&mut state.pending, PendingCall::Idle)
        };
        self.turn.close();

        if let PendingCall::AwaitingResponse { reply, .. } = pending {
            let _ = reply.send(Err(QwireError::ConnectionClosed));
        }
        true
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed.is_some()
    }

    /// Error for operations attempted after the connection ended.
    pub(crate) fn closed_error(&self) -> QwireError {
        match &self.lock().closed {
            Some(closed) => closed_to_error(closed),
            None => QwireError::ConnectionLost("reply channel dropped".into()),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_awaiting(&self) -> bool {
        matches!(self.lock().pending, PendingCall::AwaitingResponse { .. })
    }

    fn abandon(&self) {
        self.lock().pending = PendingCall::Idle;
    }
}

fn closed_to_error(closed: &Closed) -> QwireError {
    match closed {
        Closed::ByUser => QwireError::ConnectionClosed,
        Closed::Lost(reason) => QwireError::ConnectionLost(reason.clone()),
    }
}

/// Resets the slot if the request never reached the writer.
pub(crate) struct PendingGuard<'a> {
    slot: &'a CallSlot,
    armed: bool,
}

impl PendingGuard<'_> {
    /// The request is queued; from now on only a response frees the slot.
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.slot.abandon();
        }
    }
}
