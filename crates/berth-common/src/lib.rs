//! Launch contract shared by the host CLI and the in-container init shim.
//!
//! Both sides of the deployment agree on exactly two things: the
//! environment-variable bindings the service is launched with, and the
//! layout of the persistent state volume. This crate owns both so the
//! contract cannot drift between the image builder and the shim.

pub mod launch;
pub mod volume;

pub use launch::{EnvError, LaunchConfig};
