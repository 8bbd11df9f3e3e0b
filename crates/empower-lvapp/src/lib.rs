//! # EmPOWER LVAPP
//!
//! The Light Virtual Access Point Protocol spoken between the controller
//! and its Wi-Fi access points:
//!
//! - [`codec`]: bit-exact frame encoding and decoding
//! - [`session`]: the per-connection state machine (hello, capabilities,
//!   online dispatch, heartbeat, request/response correlation)
//! - [`registry`]: APs, radio blocks, stations, tx policies and multicast
//!   groups
//! - [`transport`]: frame reassembly over async byte streams
//!
//! ## Example
//!
//! ```rust
//! use empower_core::Address;
//! use empower_lvapp::codec::{decode, encode, Hello, Message};
//!
//! let device = Address::parse("00:0D:B9:2F:56:64").unwrap();
//! let bytes = encode(1, 1, device, &Message::HelloRequest(Hello { period: 2000 })).unwrap();
//! let frame = decode(&bytes).unwrap();
//! assert_eq!(frame.header.length as usize, bytes.len());
//! ```

#![forbid(unsafe_code)]

pub mod codec;
pub mod error;
pub mod registry;
pub mod session;
pub mod transport;

pub use codec::{decode, encode, Frame, Header, Message, MessageType};
pub use error::{CodecError, ErrorKind, RegistryError, SessionError};
pub use registry::{AccessPoint, ApRegistry, BlockState, ConnId, RegistrySnapshot, Station};
pub use session::{PendingReply, Session, SessionConfig, SessionState, HEARTBEAT_INTERVAL};
