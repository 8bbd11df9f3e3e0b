//! Bit-exact LVAPP frame codec.
//!
//! A frame is a [`Header`] followed by a type-specific body; the header's
//! `length` field counts the whole frame. [`decode`] consumes exactly
//! `length` bytes and [`encode`] fills `length` in after writing the body.

pub mod header;
pub mod messages;

pub use header::{peek_length, Header, MessageType, DEFAULT_PORT, HEADER_LEN, LVAPP_VERSION, MAX_FRAME_LEN};
pub use messages::{
    AssocRequest, AssocResponse, Auth, BlockCaps, CapsResponse, DelLvap, DelSlice, DelTxPolicy,
    DelVap, Hello, Lvap, LvapFlags, LvapResult, Message, Network, ProbeRequest, ProbeResponse,
    RcStatsEntry, RcStatsRequest, RcStatsResponse, Slice, TxPolicyFrame, Vap,
};

use empower_core::Address;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// A decoded frame: header plus typed body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub header: Header,
    pub message: Message,
}

impl Frame {
    pub fn msg_type(&self) -> MessageType {
        self.header.msg_type
    }
}

/// Decode one frame from the start of `data`.
///
/// Bytes past the declared `length` are left alone; callers reassembling a
/// stream should slice with [`peek_length`] first.
pub fn decode(data: &[u8]) -> Result<Frame, CodecError> {
    let header = Header::parse(data)?;
    let length = header.length as usize;
    if data.len() < length {
        return Err(CodecError::Truncated {
            needed: length,
            got: data.len(),
        });
    }

    let message = Message::read_body(header.msg_type, &data[HEADER_LEN..length])?;
    Ok(Frame { header, message })
}

/// Encode `message` with the given sequence number, transaction id and
/// device address.
///
/// Fails when a list outgrows its count field or the frame outgrows
/// [`MAX_FRAME_LEN`].
pub fn encode(seq: u32, xid: u32, device: Address, message: &Message) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(HEADER_LEN + 64);
    let header = Header {
        version: LVAPP_VERSION,
        msg_type: message.msg_type(),
        length: 0,
        seq,
        xid,
        device,
    };
    header.write(&mut buf);
    message.write_body(&mut buf)?;

    let length = u32::try_from(buf.len()).unwrap_or(u32::MAX);
    if buf.len() > MAX_FRAME_LEN {
        return Err(CodecError::BadLength { length });
    }
    buf[2..6].copy_from_slice(&length.to_be_bytes());
    Ok(buf)
}
