//! i3 IPC wire format
//!
//! ```text
//! ┌──────────────┬────────────┬────────────┬──────────────────┐
//! │ Magic (6B)   │ Length     │ Type       │ Payload          │
//! │ "i3-ipc"     │ (4B LE)    │ (4B LE)    │ (Length bytes)   │
//! └──────────────┴────────────┴────────────┴──────────────────┘
//! ```
//!
//! Replies carry the request's type. Events set bit 31 of the type field and
//! keep the event category in the low 31 bits.

use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::I3Error;

/// Marker opening every frame.
pub const MAGIC: &[u8; 6] = b"i3-ipc";

/// Frame header: magic (6) + length (4) + type (4) = 14 bytes.
pub const HEADER_SIZE: usize = 14;

/// Bit set by i3 on the type field of event frames.
pub const EVENT_BIT: u32 = 0x8000_0000;

/// Mask recovering the event category from an event frame's type.
pub const EVENT_MASK: u32 = 0x7FFF_FFFF;

/// Request message types understood by i3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    RunCommand = 0,
    GetWorkspaces = 1,
    Subscribe = 2,
    GetOutputs = 3,
    GetTree = 4,
    GetMarks = 5,
    GetBarConfig = 6,
    GetVersion = 7,
}

impl MessageType {
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl From<MessageType> for u32 {
    fn from(message_type: MessageType) -> Self {
        message_type.code()
    }
}

impl TryFrom<u32> for MessageType {
    type Error = u32;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::RunCommand,
            1 => Self::GetWorkspaces,
            2 => Self::Subscribe,
            3 => Self::GetOutputs,
            4 => Self::GetTree,
            5 => Self::GetMarks,
            6 => Self::GetBarConfig,
            7 => Self::GetVersion,
            other => return Err(other),
        })
    }
}

/// Event categories a client can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Workspace,
    Output,
    Mode,
    Window,
    BarconfigUpdate,
    Binding,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Workspace,
        EventKind::Output,
        EventKind::Mode,
        EventKind::Window,
        EventKind::BarconfigUpdate,
        EventKind::Binding,
    ];

    /// Name used in the subscribe payload
    pub fn name(self) -> &'static str {
        match self {
            EventKind::Workspace => "workspace",
            EventKind::Output => "output",
            EventKind::Mode => "mode",
            EventKind::Window => "window",
            EventKind::BarconfigUpdate => "barconfig_update",
            EventKind::Binding => "binding",
        }
    }

    /// Category code carried in the low bits of an event frame's type
    pub fn code(self) -> u32 {
        match self {
            EventKind::Workspace => 0,
            EventKind::Output => 1,
            EventKind::Mode => 2,
            EventKind::Window => 3,
            EventKind::BarconfigUpdate => 4,
            EventKind::Binding => 5,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = I3Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| I3Error::WrongEvent {
                event: s.to_string(),
            })
    }
}

/// A decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 6],
    pub length: u32,
    pub message_type: u32,
}

impl Header {
    /// Split raw header bytes into their fields without validating them.
    pub fn unpack(raw: &[u8; HEADER_SIZE]) -> Self {
        let mut magic = [0u8; 6];
        magic.copy_from_slice(&raw[0..6]);
        let length = u32::from_le_bytes([raw[6], raw[7], raw[8], raw[9]]);
        let message_type = u32::from_le_bytes([raw[10], raw[11], raw[12], raw[13]]);

        Self {
            magic,
            length,
            message_type,
        }
    }

    /// Check the magic marker.
    pub fn validate(&self) -> Result<(), I3Error> {
        if &self.magic != MAGIC {
            return Err(I3Error::WrongMagicString {
                magic: String::from_utf8_lossy(&self.magic).into_owned(),
            });
        }
        Ok(())
    }

    pub fn is_event(&self) -> bool {
        self.message_type & EVENT_BIT != 0
    }

    /// The message type with the event bit cleared
    pub fn event_code(&self) -> u32 {
        self.message_type & EVENT_MASK
    }
}

/// One complete frame read off the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message type, or the event category for event frames
    pub message_type: u32,
    /// Whether the event bit was set on the wire
    pub is_event: bool,
    pub payload: Bytes,
}

/// Encode a message into the wire format.
pub fn pack(message_type: u32, payload: &[u8]) -> Result<Bytes, I3Error> {
    let length = u32::try_from(payload.len()).map_err(|_| I3Error::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;

    let mut dst = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    dst.put_slice(MAGIC);
    dst.put_u32_le(length);
    dst.put_u32_le(message_type);
    dst.put_slice(payload);
    Ok(dst.freeze())
}
