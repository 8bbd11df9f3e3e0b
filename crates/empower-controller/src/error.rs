//! Error types for the controller.

use std::io;

use empower_core::{Address, CoreError};
use empower_lvapp::{RegistryError, SessionError};
use empower_sdnplay::ConfigError;
use thiserror::Error;

/// Errors surfaced by [`Controller`](crate::Controller) and
/// [`ControllerHandle`](crate::ControllerHandle).
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Binding the LVAPP listener failed.
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// No session speaks for the AP.
    #[error("AP {0} is not connected")]
    NotConnected(Address),

    /// The controller task is gone.
    #[error("controller stopped")]
    Stopped,
}
