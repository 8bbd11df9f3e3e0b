//! 48-bit IEEE 802 addresses.
//!
//! [`Address`] is used for AP device ids, radio block hardware addresses,
//! station addresses and multicast group addresses. The first octet's two low
//! bits carry the group (multicast) and locally-administered flags.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Address -- Value Object
// ---------------------------------------------------------------------------

/// An opaque 6-byte address with canonical text form `XX:XX:XX:XX:XX:XX`.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Default)]
pub struct Address(pub [u8; 6]);

impl Address {
    /// Number of octets on the wire.
    pub const LEN: usize = 6;

    /// The all-zero address.
    pub const ZERO: Address = Address([0; 6]);

    /// The broadcast address `FF:FF:FF:FF:FF:FF`.
    pub const BROADCAST: Address = Address([0xFF; 6]);

    /// Create an `Address` from a byte slice.
    ///
    /// Returns an error if the slice is not exactly 6 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        let arr: [u8; 6] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidAddressLength { len: bytes.len() })?;
        Ok(Self(arr))
    }

    /// Parse an address from colon-separated hex, either case.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 6 {
            return Err(CoreError::AddressParse {
                input: s.to_owned(),
            });
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(CoreError::AddressParse {
                    input: s.to_owned(),
                });
            }
            bytes[i] = u8::from_str_radix(part, 16).map_err(|_| CoreError::AddressParse {
                input: s.to_owned(),
            })?;
        }
        Ok(Self(bytes))
    }

    /// Return the raw 6-byte address.
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Group bit set: multicast or broadcast.
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Group bit clear.
    pub fn is_unicast(&self) -> bool {
        !self.is_multicast()
    }

    /// Locally administered bit set.
    pub fn is_local(&self) -> bool {
        self.0[0] & 0x02 != 0
    }

    /// All ones.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// All zeros.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Same address with the locally-administered bit set.
    ///
    /// Used to derive VAP BSSIDs from a block's hardware address.
    pub fn to_local(&self) -> Self {
        let mut bytes = self.0;
        bytes[0] |= 0x02;
        Self(bytes)
    }
}

/// Map an IPv4 multicast address to its Ethernet group address.
///
/// `a.b.c.d` maps to `01:00:5E:(b & 0x7F):c:d`. Addresses outside
/// 224.0.0.0/4 are rejected.
pub fn mcast_ip_to_ether(ip: Ipv4Addr) -> Result<Address, CoreError> {
    if !ip.is_multicast() {
        return Err(CoreError::NotMulticastIp { ip });
    }
    let [_, b, c, d] = ip.octets();
    Ok(Address([0x01, 0x00, 0x5E, b & 0x7F, c, d]))
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<[u8; 6]> for Address {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
