mod build;
mod init;
mod start;
mod status;

pub use build::{BuildArgs, run_build};
pub use init::{InitArgs, run_init};
pub use start::{StartArgs, run_start};
pub use status::{StatusArgs, run_status};
