//! Handler for messages the client did not ask for.
//!
//! Async messages, server-initiated sync messages and responses with no
//! pending call all go to one [`AsyncHandler`]. It runs on its own task and
//! sees messages in arrival order, so a slow handler never stalls delivery
//! of sync responses.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::codec::Value;
use crate::protocol::{Endianness, MessageType};

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub message_type: MessageType,
    /// Byte order the server used for this message.
    pub endianness: Endianness,
    pub value: Value,
}

/// Trait for async message handlers.
///
/// Implemented for every `Fn(Message) -> impl Future<Output = ()>`.
pub trait AsyncHandler: Send + Sync + 'static {
    fn handle(&self, message: Message) -> BoxFuture<'static, ()>;
}

impl<F, Fut> AsyncHandler for F
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn handle(&self, message: Message) -> BoxFuture<'static, ()> {
        Box::pin(self(message))
    }
}

/// Spawn the handler task. It ends once the sender is dropped and the queue
/// is drained.
pub(crate) fn spawn_handler_task(
    handler: Arc<dyn AsyncHandler>,
) -> (mpsc::UnboundedSender<Message>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            handler.handle(message).await;
        }
        debug!("Async handler task finished");
    });

    (tx, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn message(n: i64) -> Message {
        Message {
            message_type: MessageType::Async,
            endianness: Endianness::Little,
            value: Value::from(n),
        }
    }

    #[tokio::test]
    async fn test_closure_is_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = move |m: Message| {
            let sink = sink.clone();
            async move { sink.lock().unwrap().push(m.value) }
        };

        handler.handle(message(7)).await;
        assert_eq!(*seen.lock().unwrap(), vec![Value::from(7i64)]);
    }

    #[tokio::test]
    async fn test_handler_task_keeps_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: Arc<dyn AsyncHandler> = Arc::new(move |m: Message| {
            let sink = sink.clone();
            async move {
                // Later messages must still wait for this one.
                tokio::task::yield_now().await;
                sink.lock().unwrap().push(m.value);
            }
        });

        let (tx, task) = spawn_handler_task(handler);
        for n in 0..50 {
            tx.send(message(n)).unwrap();
        }
        drop(tx);
        task.await.unwrap();

        let expected: Vec<Value> = (0..50i64).map(Value::from).collect();
        assert_eq!(*seen.lock().unwrap(), expected);
    }
}
