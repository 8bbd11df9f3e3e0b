//! LVAPP common header and message type registry.
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       1     version (always 0)
//! 1       1     type
//! 2       4     length  (whole frame, header included)
//! 6       4     seq
//! 10      4     xid
//! 14      6     device  (AP address)
//! ```

use std::fmt;
use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use empower_core::Address;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Protocol version carried in every header.
pub const LVAPP_VERSION: u8 = 0;

/// Size of the common header in bytes.
pub const HEADER_LEN: usize = 20;

/// Largest frame the controller accepts.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Default TCP port of the LVAPP server.
pub const DEFAULT_PORT: u16 = 4433;

macro_rules! message_types {
    ($( $(#[$doc:meta])* $variant:ident = $code:literal => $name:literal, )*) => {
        /// Registered LVAPP message types.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum MessageType {
            $( $(#[$doc])* $variant = $code, )*
        }

        impl MessageType {
            /// Map a wire code to a registered type.
            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    $( $code => Some(Self::$variant), )*
                    _ => None,
                }
            }

            /// Upper-case protocol name, e.g. `SET_TX_POLICY`.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $name, )*
                }
            }
        }
    };
}

message_types! {
    HelloRequest = 0x01 => "HELLO_REQ",
    HelloResponse = 0x02 => "HELLO_RES",
    CapsRequest = 0x03 => "CAPS_REQ",
    CapsResponse = 0x04 => "CAPS_RES",
    ProbeRequest = 0x05 => "PROBE_REQ",
    ProbeResponse = 0x06 => "PROBE_RES",
    AuthRequest = 0x07 => "AUTH_REQ",
    AuthResponse = 0x08 => "AUTH_RES",
    AssocRequest = 0x09 => "ASSOC_REQ",
    AssocResponse = 0x0A => "ASSOC_RES",
    AddLvapRequest = 0x0B => "ADD_LVAP_REQ",
    AddLvapResponse = 0x0C => "ADD_LVAP_RES",
    DelLvapRequest = 0x0D => "DEL_LVAP_REQ",
    DelLvapResponse = 0x0E => "DEL_LVAP_RES",
    LvapStatusRequest = 0x0F => "LVAP_STATUS_REQ",
    LvapStatusResponse = 0x10 => "LVAP_STATUS_RES",
    SetSlice = 0x11 => "SET_SLICE",
    DelSlice = 0x12 => "DEL_SLICE",
    SliceStatusRequest = 0x13 => "SLICE_STATUS_REQ",
    SliceStatusResponse = 0x14 => "SLICE_STATUS_RES",
    SetTxPolicy = 0x15 => "SET_TX_POLICY",
    DelTxPolicy = 0x16 => "DEL_TX_POLICY",
    TxPolicyStatusRequest = 0x17 => "TX_POLICY_STATUS_REQ",
    TxPolicyStatusResponse = 0x18 => "TX_POLICY_STATUS_RES",
    AddVap = 0x20 => "ADD_VAP",
    DelVap = 0x21 => "DEL_VAP",
    VapStatusRequest = 0x22 => "VAP_STATUS_REQ",
    VapStatusResponse = 0x23 => "VAP_STATUS_RES",
    WifiRcStatsRequest = 0x80 => "WIFI_RC_STATS_REQ",
    WifiRcStatsResponse = 0x81 => "WIFI_RC_STATS_RES",
}

impl MessageType {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Type the AP answers a controller request of this type with.
    pub fn reply_type(self) -> Option<Self> {
        match self {
            Self::CapsRequest => Some(Self::CapsResponse),
            Self::AddLvapRequest => Some(Self::AddLvapResponse),
            Self::DelLvapRequest => Some(Self::DelLvapResponse),
            Self::LvapStatusRequest => Some(Self::LvapStatusResponse),
            Self::SliceStatusRequest => Some(Self::SliceStatusResponse),
            Self::TxPolicyStatusRequest => Some(Self::TxPolicyStatusResponse),
            Self::VapStatusRequest => Some(Self::VapStatusResponse),
            Self::WifiRcStatsRequest => Some(Self::WifiRcStatsResponse),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The 20-byte header that starts every LVAPP frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub version: u8,
    pub msg_type: MessageType,
    /// Total frame size in bytes, header included.
    pub length: u32,
    pub seq: u32,
    pub xid: u32,
    pub device: Address,
}

impl Header {
    /// Parse the header at the start of `data`.
    ///
    /// Validates version, length bounds and type, but not that `length`
    /// bytes are present.
    pub fn parse(data: &[u8]) -> Result<Self, CodecError> {
        let (code, length) = Self::parse_prefix(data)?;

        let mut cursor = Cursor::new(&data[6..HEADER_LEN]);
        let seq = read_u32(&mut cursor)?;
        let xid = read_u32(&mut cursor)?;
        let mut device = [0u8; 6];
        device.copy_from_slice(&data[14..HEADER_LEN]);

        let msg_type = MessageType::from_code(code).ok_or(CodecError::UnknownType { msg_type: code })?;

        Ok(Self {
            version: LVAPP_VERSION,
            msg_type,
            length,
            seq,
            xid,
            device: Address(device),
        })
    }

    /// Raw type code and declared length, with version and bounds checked.
    fn parse_prefix(data: &[u8]) -> Result<(u8, u32), CodecError> {
        if data.len() < HEADER_LEN {
            return Err(CodecError::Truncated {
                needed: HEADER_LEN,
                got: data.len(),
            });
        }

        let version = data[0];
        if version != LVAPP_VERSION {
            return Err(CodecError::BadVersion { version });
        }

        let code = data[1];
        let mut cursor = Cursor::new(&data[2..6]);
        let length = read_u32(&mut cursor)?;
        if (length as usize) < HEADER_LEN || length as usize > MAX_FRAME_LEN {
            return Err(CodecError::BadLength { length });
        }
        Ok((code, length))
    }

    pub(crate) fn write(&self, buf: &mut Vec<u8>) {
        buf.push(self.version);
        buf.push(self.msg_type.code());
        // Infallible on a Vec.
        let _ = buf.write_u32::<BigEndian>(self.length);
        let _ = buf.write_u32::<BigEndian>(self.seq);
        let _ = buf.write_u32::<BigEndian>(self.xid);
        buf.extend_from_slice(self.device.as_bytes());
    }
}

/// Declared frame length once a full header is buffered, `None` before.
///
/// Used to reassemble frames from a byte stream without decoding bodies.
pub fn peek_length(data: &[u8]) -> Result<Option<usize>, CodecError> {
    if data.len() < HEADER_LEN {
        return Ok(None);
    }
    let (_, length) = Header::parse_prefix(data)?;
    Ok(Some(length as usize))
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, CodecError> {
    cursor
        .read_u32::<BigEndian>()
        .map_err(|_| CodecError::Truncated {
            needed: HEADER_LEN,
            got: cursor.get_ref().len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_header(code: u8, length: u32) -> Vec<u8> {
        let mut buf = vec![0u8, code];
        buf.extend_from_slice(&length.to_be_bytes());
        buf.extend_from_slice(&7u32.to_be_bytes());
        buf.extend_from_slice(&9u32.to_be_bytes());
        buf.extend_from_slice(&[0x00, 0x0D, 0xB9, 0x2F, 0x56, 0x64]);
        buf
    }

    #[test]
    fn test_parse_header_fields() {
        let header = Header::parse(&raw_header(0x15, 40)).unwrap();
        assert_eq!(header.msg_type, MessageType::SetTxPolicy);
        assert_eq!(header.length, 40);
        assert_eq!(header.seq, 7);
        assert_eq!(header.xid, 9);
        assert_eq!(header.device.to_string(), "00:0D:B9:2F:56:64");
    }

    #[test]
    fn test_header_write_matches_parse() {
        let header = Header::parse(&raw_header(0x01, 24)).unwrap();
        let mut buf = Vec::new();
        header.write(&mut buf);
        assert_eq!(buf, raw_header(0x01, 24));
    }

    #[test]
    fn test_reply_types() {
        assert_eq!(
            MessageType::WifiRcStatsRequest.reply_type(),
            Some(MessageType::WifiRcStatsResponse)
        );
        assert_eq!(MessageType::CapsRequest.reply_type(), Some(MessageType::CapsResponse));
        assert_eq!(MessageType::SetTxPolicy.reply_type(), None);
        assert_eq!(MessageType::ProbeRequest.reply_type(), None);
    }

    #[test]
    fn test_rejects_bad_version() {
        let mut data = raw_header(0x01, 20);
        data[0] = 1;
        assert!(matches!(Header::parse(&data), Err(CodecError::BadVersion { version: 1 })));
    }

    #[test]
    fn test_rejects_unknown_type() {
        let data = raw_header(0x7F, 20);
        assert!(matches!(
            Header::parse(&data),
            Err(CodecError::UnknownType { msg_type: 0x7F })
        ));
    }

    #[test]
    fn test_rejects_length_below_header() {
        let data = raw_header(0x01, 19);
        assert!(matches!(Header::parse(&data), Err(CodecError::BadLength { length: 19 })));
    }

    #[test]
    fn test_peek_length() {
        let data = raw_header(0x03, 20);
        assert_eq!(peek_length(&data[..10]).unwrap(), None);
        assert_eq!(peek_length(&data).unwrap(), Some(20));
    }

    #[test]
    fn test_type_codes_are_stable() {
        assert_eq!(MessageType::HelloRequest.code(), 0x01);
        assert_eq!(MessageType::CapsResponse.code(), 0x04);
        assert_eq!(MessageType::DelLvapRequest.code(), 0x0D);
        assert_eq!(MessageType::SetTxPolicy.code(), 0x15);
        assert_eq!(MessageType::WifiRcStatsResponse.code(), 0x81);
        assert_eq!(MessageType::from_code(0x81), Some(MessageType::WifiRcStatsResponse));
        assert_eq!(MessageType::SetTxPolicy.to_string(), "SET_TX_POLICY");
    }
}
