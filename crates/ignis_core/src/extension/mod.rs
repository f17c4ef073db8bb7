//! Extension attachment and initializer registration.
//!
//! Extensions are attached to a registry once; attaching usually installs
//! initializers, which every application instance then runs exactly once.

pub mod loader;
pub mod registry;
pub mod source;
