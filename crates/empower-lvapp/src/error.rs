//! Error types for the LVAPP layer.
//!
//! ```text
//! SessionError (per-connection, carries an ErrorKind)
//! ├── CodecError     (framing: truncated, bad version, unknown type, ...)
//! ├── RegistryError  (unknown AP / block / station, duplicate group)
//! └── io::Error      (transport)
//! ```

use std::io;

use empower_core::{Address, BlockRef, CoreError};
use thiserror::Error;

use crate::codec::MessageType;

// ---------------------------------------------------------------------------
// CodecError
// ---------------------------------------------------------------------------

/// Errors produced while decoding or encoding LVAPP frames.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Fewer bytes than the header or the declared `length`.
    #[error("truncated frame: need {needed} bytes, got {got}")]
    Truncated {
        needed: usize,
        got: usize,
    },

    /// Version byte other than 0.
    #[error("unsupported LVAPP version {version}")]
    BadVersion {
        version: u8,
    },

    /// Type byte outside the registered set.
    #[error("unknown message type {msg_type:#04x}")]
    UnknownType {
        msg_type: u8,
    },

    /// Declared length shorter than the header or larger than allowed.
    #[error("invalid frame length {length}")]
    BadLength {
        length: u32,
    },

    /// Body ended before a field could be read.
    #[error("{msg_type} body too short at offset {offset}")]
    ShortBody {
        msg_type: MessageType,
        offset: usize,
    },

    /// Body continues after the last field of a fixed layout.
    #[error("{msg_type} body has {extra} trailing bytes")]
    TrailingBytes {
        msg_type: MessageType,
        extra: usize,
    },

    /// A field holds a value the data model rejects.
    #[error("malformed {msg_type}: {source}")]
    Malformed {
        msg_type: MessageType,
        #[source]
        source: CoreError,
    },

    /// A list is longer than its count field can express.
    #[error("{msg_type} carries {count} {field}, at most {max} fit")]
    TooManyEntries {
        msg_type: MessageType,
        field: &'static str,
        count: usize,
        max: usize,
    },
}

// ---------------------------------------------------------------------------
// RegistryError
// ---------------------------------------------------------------------------

/// Lookups and mutations of the AP registry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("unknown AP {0}")]
    UnknownAp(Address),

    #[error("unknown radio block {0}")]
    UnknownBlock(BlockRef),

    #[error("unknown station {0}")]
    UnknownStation(Address),

    #[error("AP {0} is not online")]
    NotOnline(Address),

    #[error("multicast group {0} already exists")]
    DuplicateGroup(Address),

    #[error("unknown multicast group {0}")]
    UnknownGroup(Address),

    #[error(transparent)]
    Core(#[from] CoreError),
}

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

/// Error classes and the action they call for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Socket closed, write failed, heartbeat expired: tear down.
    Transport,
    /// Undecodable frame: warn and close.
    Framing,
    /// Valid frame in the wrong place or with a failure status: warn, discard.
    Protocol,
    /// Invalid parameter at construction: fail fast.
    Config,
    /// Reference to an unknown device, block or station: log, ignore.
    NotFound,
}

/// Errors raised while driving one AP session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("framing error: {0}")]
    Framing(#[from] CodecError),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// `HELLO_REQ` from a device that is not registered.
    #[error("unknown device {0}")]
    UnknownDevice(Address),

    #[error("no hello for {elapsed_ms} ms")]
    HeartbeatTimeout {
        elapsed_ms: u128,
    },

    /// The session went away while a request was outstanding.
    #[error("request cancelled")]
    Cancelled,

    /// The outbound channel to the socket writer is gone.
    #[error("session closed")]
    Closed,
}

impl SessionError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Classify this error per the controller's error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::HeartbeatTimeout { .. } | Self::Cancelled | Self::Closed => {
                ErrorKind::Transport
            }
            // Outbound only; the connection itself is fine.
            Self::Framing(CodecError::TooManyEntries { .. }) => ErrorKind::Protocol,
            Self::Framing(_) => ErrorKind::Framing,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Registry(RegistryError::Core(_)) => ErrorKind::Protocol,
            Self::Registry(RegistryError::NotOnline(_)) => ErrorKind::Protocol,
            Self::Registry(_) | Self::UnknownDevice(_) => ErrorKind::NotFound,
        }
    }

    /// Whether the session must be torn down. An unknown device is fatal
    /// because the socket belongs to nobody.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Framing)
            || matches!(self, Self::UnknownDevice(_))
    }
}
