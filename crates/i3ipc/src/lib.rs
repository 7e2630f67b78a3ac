//! Client for the i3 window manager IPC protocol
//!
//! This crate talks to a running i3 instance over its Unix domain socket.
//! It lets callers:
//! - Send commands and state queries and read back their replies
//! - Navigate replies as a generic JSON tree without predefined schemas
//! - Subscribe to workspace, output, mode, window, bar and binding events
//!
//! ## Architecture
//!
//! - `Transport`: frames requests and parses reply/event frames on one channel
//! - `Reply`: the parsed JSON document handed back to callers
//! - `Connection`: request/reply round trips and event subscriptions
//! - `I3Error`: error types for IPC operations
//!
//! ## Protocol
//!
//! Every message is a 14-byte header (`"i3-ipc"`, payload length and message
//! type, both little-endian `u32`) followed by the payload. Event frames carry
//! the high bit of the type field; the remaining bits name the event category.
//!
//! Subscribing hands the channel over to a background listener, so commands
//! and events never share one socket. See `Connection::subscribe`.

mod client;
mod error;
mod events;
pub mod protocol;
mod reply;
mod transport;

pub use client::{Connection, RetryPolicy};
pub use error::{FieldError, I3Error};
pub use events::{EventHandler, EventStream, Subscription};
pub use protocol::{EventKind, Frame, Header, MessageType};
pub use reply::{Fields, Reply, ReplyKind};
pub use transport::{Connector, Transport, UnixConnector};

pub use i3ipc_config as config;
