//! # SDN@Play
//!
//! Multicast rate adaptation for Wi-Fi. Each multicast group alternates
//! between DMS (multicast-to-unicast conversion) and LEGACY (plain multicast
//! at a selected MCS) on a fixed schedule; in LEGACY the MCS is the fastest
//! rate every receiver on the block can decode reliably.
//!
//! - [`EngineConfig`]: recognized options and validation
//! - [`GroupScheduler`]: the per-group DMS/LEGACY phase wheel
//! - [`McsSelector`]: per-block MCS from the receivers' rate tables
//! - [`Engine`]: the periodic loop writing tx policies through a
//!   [`TxPolicySink`]

#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod selector;

pub use config::{DemoMode, EngineConfig};
pub use engine::{Engine, TickReport, TxPolicySink};
pub use error::ConfigError;
pub use scheduler::{GroupScheduler, Phase};
pub use selector::McsSelector;
