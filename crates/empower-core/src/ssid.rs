//! Service set identifiers.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

/// An SSID of 0–32 printable octets. The empty SSID is the wildcard.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Ssid(String);

impl Ssid {
    /// Longest SSID allowed by 802.11.
    pub const MAX_LEN: usize = 32;

    /// Size of the zero-padded field carrying an SSID on the wire.
    pub const WIRE_LEN: usize = 33;

    /// Build an SSID, rejecting over-long or non-printable input.
    pub fn new(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        if s.len() > Self::MAX_LEN {
            return Err(CoreError::InvalidSsid {
                reason: format!("{} octets, at most {} allowed", s.len(), Self::MAX_LEN),
            });
        }
        if let Some(b) = s.bytes().find(|b| !(0x20..=0x7E).contains(b)) {
            return Err(CoreError::InvalidSsid {
                reason: format!("non-printable octet {b:#04x}"),
            });
        }
        Ok(Self(s))
    }

    /// The wildcard (empty) SSID.
    pub fn wildcard() -> Self {
        Self(String::new())
    }

    /// True for the empty SSID.
    pub fn is_wildcard(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encode into the fixed 33-byte zero-padded wire field.
    pub fn to_wire(&self) -> [u8; Self::WIRE_LEN] {
        let mut out = [0u8; Self::WIRE_LEN];
        out[..self.0.len()].copy_from_slice(self.0.as_bytes());
        out
    }

    /// Decode the 33-byte wire field; bytes after the first NUL are ignored.
    pub fn from_wire(field: &[u8]) -> Result<Self, CoreError> {
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        let text = std::str::from_utf8(&field[..end]).map_err(|_| CoreError::InvalidSsid {
            reason: "not valid text".into(),
        })?;
        Self::new(text)
    }
}

impl fmt::Display for Ssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Ssid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Ssid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}
