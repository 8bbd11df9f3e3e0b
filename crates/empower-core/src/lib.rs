//! # EmPOWER Core
//!
//! Value objects shared by the LVAPP protocol layer and the SDN@Play
//! rate-adaptation engine:
//!
//! - [`Address`] and [`mcast_ip_to_ether`] for the 48-bit identifiers used for
//!   APs, radio blocks, stations and multicast groups
//! - [`Ssid`], carried on the wire as a zero-padded 33-byte field
//! - [`RadioBlock`], [`TxPolicy`] and [`MulticastGroup`], the radio-side model
//! - [`RateTable`], the per-station minstrel statistics with their derived
//!   best/valid rate selections
//!
//! ## Example
//!
//! ```rust
//! use empower_core::{Address, MulticastGroup};
//!
//! let receivers = [Address::parse("aa:bb:cc:dd:ee:01").unwrap()];
//! let group = MulticastGroup::new("224.0.1.200".parse().unwrap(), receivers).unwrap();
//! assert_eq!(group.addr.to_string(), "01:00:5E:00:01:C8");
//! ```

#![forbid(unsafe_code)]

pub mod address;
pub mod error;
pub mod rate_table;
pub mod ssid;
pub mod types;

pub use address::{mcast_ip_to_ether, Address};
pub use error::{CoreError, CoreResult};
pub use rate_table::{Probability, RateEntry, RateTable, DEFAULT_PROB_THRESHOLD, PROB_SCALE};
pub use ssid::Ssid;
pub use types::{
    Band, BlockRef, GroupStatus, LegacyRate, McastMode, MulticastGroup, RadioBlock, TxPolicy,
    DSSS_RATES, HT20_MCS, OFDM_RATES,
};
