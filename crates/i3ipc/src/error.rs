//! Error types for i3 IPC operations

use thiserror::Error;

use crate::reply::ReplyKind;

/// Errors that can occur when communicating with i3
#[derive(Debug, Error)]
pub enum I3Error {
    /// A send or receive was attempted while the channel is closed
    #[error("Not connected to i3 - call connect() first")]
    NotConnected,

    /// The frame header did not start with the `i3-ipc` marker
    #[error("Magic string expected 'i3-ipc', but was '{magic}'")]
    WrongMagicString { magic: String },

    /// The frame carried a different message type than the one awaited
    #[error("Message type expected '{expected}', but was '{actual}'")]
    WrongType { expected: u32, actual: u32 },

    /// Unknown event name, or i3 refused the subscription
    #[error("Unable to subscribe to event '{event}'")]
    WrongEvent { event: String },

    /// The payload is not well-formed JSON
    #[error("Failed to parse reply: {0}")]
    ParseError(#[source] serde_json::Error),

    /// Failed to serialize an outgoing payload or convert a reply
    #[error("Failed to serialize payload: {0}")]
    SerializeFailed(#[source] serde_json::Error),

    /// A reply field lookup failed
    #[error(transparent)]
    Field(#[from] FieldError),

    /// No socket path was configured
    #[error("No i3 socket path configured")]
    SocketNotConfigured,

    /// Failed to connect to the i3 socket
    #[error("Failed to connect to i3 socket at {target}: {source}")]
    ConnectionFailed {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a frame to i3
    #[error("Failed to send message to i3: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Failed to read a frame from i3
    #[error("Failed to receive message from i3: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The channel reached EOF in the middle of, or before, a frame
    #[error("Connection to i3 closed unexpectedly")]
    ConnectionClosed,

    /// A payload exceeds the frame length field or the configured limit
    #[error("Payload of {size} bytes exceeds the limit of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Maximum retry attempts exceeded
    #[error("Failed to connect to i3 after {attempts} attempts")]
    MaxRetriesExceeded { attempts: u32 },

    /// The event listener task panicked or was aborted
    #[error("Event listener failed: {0}")]
    ListenerFailed(String),
}

/// Errors from navigating a `Reply` tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// The field-map has no entry under this key
    #[error("Reply has no field '{key}'")]
    NotFound { key: String },

    /// A key lookup was made on something other than a field-map
    #[error("Cannot look up field '{key}' on {kind} value")]
    NotAnObject { key: String, kind: ReplyKind },

    /// The sequence is shorter than the requested index
    #[error("Index {index} out of range for sequence of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// An index lookup was made on something other than a sequence
    #[error("Cannot index {kind} value at {index}")]
    NotAnArray { index: usize, kind: ReplyKind },
}
