//! Dispatch module - routing of inbound messages.
//!
//! Provides:
//! - [`AsyncHandler`] - receives async and unsolicited messages
//! - [`Message`] - a decoded inbound message
//!
//! Internally, the read loop hands `Response` frames to the one pending
//! sync call and everything else to the handler task.
//!
//! # Example
//!
//! ```ignore
//! use qwire_client::{Connection, Message};
//!
//! let conn = Connection::builder()
//!     .on_async(|msg: Message| async move {
//!         println!("{:?}", msg.value);
//!     })
//!     .connect("localhost:5010")
//!     .await?;
//! ```

mod handler;
mod pending;
mod reader;

pub use handler::{AsyncHandler, BoxFuture, Message};
pub(crate) use handler::spawn_handler_task;
pub(crate) use pending::CallSlot;
pub(crate) use reader::{read_loop, Router};
