//! Container entry point.
//!
//! Startup sequence:
//! 1. Read the launch environment into an immutable `LaunchConfig`
//! 2. Install PID 1 signal dispositions (ignore SIGTTIN/SIGTTOU/SIGPIPE)
//! 3. Prepare the persistent state directory and report leftover side files
//! 4. Supervise the service command until it exits
//!
//! The process exit code is the service's own exit code; the orchestrator
//! observes the true outcome of the service, never the shim's.

use std::ffi::OsString;
use std::process::ExitCode;

use berth_common::{LaunchConfig, volume};
use berth_init::supervisor::InitError;
use berth_init::{pid1, supervise};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().init();

    match run().await {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            error!(error = %e, "init shim failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<i32, InitError> {
    let config = LaunchConfig::from_env()?;

    pid1::install_tty_ignores();
    if pid1::is_pid1() {
        info!("running as PID 1");
    } else if let Err(e) = pid1::become_subreaper() {
        warn!(error = %e, "subreaper registration failed; reaping limited to direct children");
    }

    volume::prepare_state_dir(&config.database_path).map_err(|e| InitError::StateDir {
        path: config.database_path.clone(),
        source: e,
    })?;
    let sides = volume::side_files(&config.database_path);
    if !sides.is_empty() {
        warn!(
            files = ?sides,
            "journal side files present; the service must recover the database before reuse"
        );
    }

    let command: Vec<OsString> = std::env::args_os().skip(1).collect();
    info!(
        port = config.port,
        database = %config.database_path.display(),
        "starting service under supervision"
    );
    supervise(command, CancellationToken::new()).await
}
