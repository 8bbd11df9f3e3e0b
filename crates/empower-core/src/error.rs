//! Error types for the core value objects.
//!
//! Every constructor in this crate that can reject its input returns
//! [`CoreError`]. Higher layers (codec, registry, engine) wrap it with
//! `#[from]` so that a malformed address read off the wire and a malformed
//! address read from a config file report the same way.

use thiserror::Error;

/// A specialized `Result` type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors produced while building core value objects.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// An address was built from a slice that is not 6 bytes long.
    #[error("invalid address: expected 6 bytes, got {len}")]
    InvalidAddressLength {
        /// Number of bytes provided.
        len: usize,
    },

    /// An address string is not of the form `XX:XX:XX:XX:XX:XX`.
    #[error("failed to parse address from '{input}': expected XX:XX:XX:XX:XX:XX")]
    AddressParse {
        /// The rejected input.
        input: String,
    },

    /// A group was built from an address that is not multicast.
    #[error("address {address} is not a multicast address")]
    NotMulticast {
        /// Canonical text of the rejected address.
        address: String,
    },

    /// A station was built from an address that is not unicast.
    #[error("address {address} is not a unicast address")]
    NotUnicast {
        /// Canonical text of the rejected address.
        address: String,
    },

    /// An IPv4 address outside 224.0.0.0/4 was used as a group address.
    #[error("{ip} is not an IPv4 multicast address")]
    NotMulticastIp {
        /// The rejected IP.
        ip: std::net::Ipv4Addr,
    },

    /// SSID longer than 32 octets or containing non-printable octets.
    #[error("invalid SSID: {reason}")]
    InvalidSsid {
        /// Why the SSID was rejected.
        reason: String,
    },

    /// Channel number outside 1..=165.
    #[error("invalid channel {channel}: expected 1..=165")]
    InvalidChannel {
        /// The rejected channel.
        channel: u8,
    },

    /// Band code that is neither L20 nor HT20.
    #[error("unknown band code {code}")]
    UnknownBand {
        /// The rejected wire code.
        code: u8,
    },

    /// Multicast transmission mode code not in {LEGACY, DMS, UR}.
    #[error("unknown multicast mode code {code}")]
    UnknownMcastMode {
        /// The rejected wire code.
        code: u8,
    },

    /// A legacy rate that cannot be expressed in half-Mbps units on a u8.
    #[error("legacy rate {mbps} Mbps is out of range")]
    InvalidRate {
        /// The rejected rate in Mbps.
        mbps: f64,
    },
}
