//! Init shim for containerized services.
//!
//! Runs as PID 1 inside the runtime image. PID 1 has two obligations an
//! ordinary service process does not fulfill correctly: forwarding signals
//! to the service, and reaping orphaned descendants so terminated processes
//! never accumulate in the process table. Signal handling and reaping follow
//! the same patterns as [tini](https://github.com/krallin/tini).
//!
//! The shim supervises exactly one service process and exits with that
//! process's own exit code. It never restarts the service; restart policy
//! belongs to the external orchestrator.

pub mod pid1;
pub mod supervisor;

pub use supervisor::{InitError, supervise};
