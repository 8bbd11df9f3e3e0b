//! # EmPOWER Controller
//!
//! Accepts LVAPP connections from access points, brings them online and
//! runs the SDN@Play engine against them on a timer.
//!
//! ```rust,no_run
//! use empower_controller::{Controller, ControllerConfig};
//!
//! # async fn run() -> Result<(), empower_controller::ControllerError> {
//! let (controller, handle) = Controller::new(ControllerConfig::default())?;
//! let task = tokio::spawn(controller.serve());
//! // ... register APs and groups through `handle` ...
//! handle.shutdown().await?;
//! # let _ = task.await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod controller;
pub mod error;
pub mod sink;

pub use config::{ApConfig, ControllerConfig, GroupConfig};
pub use controller::{Command, Controller, ControllerHandle};
pub use error::ControllerError;
pub use sink::SessionSink;
