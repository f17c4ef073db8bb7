//! Startup sequencing.
//!
//! # Responsibility
//! - Queue startup actions per instance and expose one completion future.
//! - Adapt the listener's bind callback into that future.
//!
//! # See also
//! - `crate::app::App::wait`, `crate::app::App::listen`

mod error;
pub mod listener;
pub mod sequencer;

pub use error::{StartupError, StartupResult};
pub use listener::{bind, BindCallback, Listener, RootHandle, TcpRoot};
pub use sequencer::{StartupFuture, StartupSequencer, StartupState};

use crate::config::EnvSource;

/// Environment variable consulted when `listen` gets no explicit port.
pub const PORT_ENV: &str = "PORT";

/// Reads the default port from `PORT`.
pub fn port_from_env(env: &dyn EnvSource) -> Result<u16, StartupError> {
    let raw = env.var(PORT_ENV).ok_or(StartupError::MissingPort)?;
    raw.trim()
        .parse::<u16>()
        .map_err(|_| StartupError::InvalidPort(raw))
}
