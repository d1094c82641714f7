//! Single-service supervision: spawn, forward signals, reap, propagate exit.
//!
//! Termination signals are converted into a [`CancellationToken`] event in
//! addition to being forwarded, so embedders observe shutdown through the
//! same explicit channel rather than installing their own signal handlers.

use std::ffi::OsString;
use std::process::Command;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use tokio::signal::unix::{Signal as SignalStream, SignalKind, signal};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Interval of the safety-net reap tick. SIGCHLD drives reaping; the tick
/// only covers deliveries coalesced before stream registration completed.
const REAP_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("no service command given (set the image CMD or pass arguments)")]
    EmptyCommand,

    #[error("launch environment: {0}")]
    Env(#[from] berth_common::EnvError),

    #[error("state directory {path}: {source}")]
    StateDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("spawn {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("signal stream registration: {0}")]
    Signals(std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Supervisor lifecycle. There is no recovery transition: once stopped, the
/// supervisor never restarts the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    NotStarted,
    Running,
    Terminating,
    Stopped,
}

/// Map a reaped wait status to the exit code the container reports.
///
/// Death by signal uses the conventional `128 + signo` encoding, so the
/// orchestrator observes the true outcome of the service.
pub fn exit_code(status: WaitStatus) -> Option<i32> {
    match status {
        WaitStatus::Exited(_, code) => Some(code),
        WaitStatus::Signaled(_, sig, _) => Some(128 + sig as i32),
        _ => None,
    }
}

fn is_termination(sig: Signal) -> bool {
    matches!(sig, Signal::SIGTERM | Signal::SIGINT | Signal::SIGQUIT)
}

fn stream(sig: Signal) -> Result<SignalStream, InitError> {
    signal(SignalKind::from_raw(sig as i32)).map_err(InitError::Signals)
}

/// Reap terminated children until none are pending.
///
/// Returns the service's exit code once the service itself has been reaped;
/// any other pid collected here is an orphan the service abandoned.
fn drain_zombies(service: Pid) -> Option<i32> {
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => return None,
            Ok(status) if status.pid() == Some(service) => return exit_code(status),
            Ok(status) => {
                trace!(pid = ?status.pid(), "reaped orphan");
            }
            Err(Errno::EINTR) => {}
            Err(Errno::ECHILD) => return None,
            Err(e) => {
                warn!(error = %e, "waitpid failed");
                return None;
            }
        }
    }
}

/// Forward `sig` to the service process.
///
/// ESRCH means the service already exited and its status is about to be
/// reaped; the signal is dropped on the floor exactly as it would be by the
/// kernel.
fn forward(sig: Signal, service: Pid) {
    match kill(service, sig) {
        Ok(()) => info!(signal = %sig, pid = service.as_raw(), "forwarded signal"),
        Err(Errno::ESRCH) => debug!(signal = %sig, "service already exited"),
        Err(e) => warn!(signal = %sig, error = %e, "signal forward failed"),
    }
}

/// Run the service under supervision until it exits.
///
/// Signal streams are registered *before* the service is spawned so a
/// SIGCHLD from a fast-exiting service can never be missed, and a
/// termination signal arriving before the service finishes initializing is
/// still forwarded immediately (the service owns early-termination
/// handling; nothing is buffered or delayed here).
pub async fn supervise(
    command: Vec<OsString>,
    shutdown: CancellationToken,
) -> Result<i32, InitError> {
    let (program, args) = command.split_first().ok_or(InitError::EmptyCommand)?;

    let mut sigchld = signal(SignalKind::child()).map_err(InitError::Signals)?;
    // SIGTERM/SIGINT/SIGQUIT are termination-class: forwarding one also
    // cancels the shutdown token. SIGHUP/SIGUSR1/SIGUSR2 pass through
    // unchanged for services that use them (reload, log rotation).
    let mut st_term = stream(Signal::SIGTERM)?;
    let mut st_int = stream(Signal::SIGINT)?;
    let mut st_quit = stream(Signal::SIGQUIT)?;
    let mut st_hup = stream(Signal::SIGHUP)?;
    let mut st_usr1 = stream(Signal::SIGUSR1)?;
    let mut st_usr2 = stream(Signal::SIGUSR2)?;

    let child = Command::new(program).args(args).spawn().map_err(|e| {
        let command = program.to_string_lossy().into_owned();
        InitError::Spawn { command, source: e }
    })?;
    let service = Pid::from_raw(
        i32::try_from(child.id())
            .map_err(|_| InitError::Internal(format!("pid {} out of range", child.id())))?,
    );
    let mut state = advance(SupervisorState::NotStarted, SupervisorState::Running);
    info!(pid = service.as_raw(), command = %program.to_string_lossy(), "service started");

    let mut reap_tick = tokio::time::interval(REAP_TICK);
    reap_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let on_signal = |sig: Signal, state: &mut SupervisorState| {
        // Forwarding is strictly ordered before our own wait-for-exit.
        forward(sig, service);
        if is_termination(sig) {
            *state = advance(*state, SupervisorState::Terminating);
            shutdown.cancel();
        }
    };

    loop {
        let reaped = tokio::select! {
            _ = sigchld.recv() => drain_zombies(service),
            _ = reap_tick.tick() => drain_zombies(service),
            _ = st_term.recv() => { on_signal(Signal::SIGTERM, &mut state); None }
            _ = st_int.recv() => { on_signal(Signal::SIGINT, &mut state); None }
            _ = st_quit.recv() => { on_signal(Signal::SIGQUIT, &mut state); None }
            _ = st_hup.recv() => { on_signal(Signal::SIGHUP, &mut state); None }
            _ = st_usr1.recv() => { on_signal(Signal::SIGUSR1, &mut state); None }
            _ = st_usr2.recv() => { on_signal(Signal::SIGUSR2, &mut state); None }
        };

        if let Some(code) = reaped {
            state = advance(state, SupervisorState::Stopped);
            info!(exit_code = code, state = ?state, "service exited");
            return Ok(code);
        }
    }
}

/// Apply a lifecycle transition, logging anything out of order.
///
/// The legal path is NotStarted → Running → Terminating → Stopped, with
/// Terminating skipped when the service exits on its own.
fn advance(from: SupervisorState, to: SupervisorState) -> SupervisorState {
    use SupervisorState::{NotStarted, Running, Stopped, Terminating};
    let legal = matches!(
        (from, to),
        (NotStarted, Running)
            | (Running, Terminating)
            | (Running, Stopped)
            | (Terminating, Stopped)
            // Repeated termination signals are expected while draining.
            | (Terminating, Terminating)
    );
    if !legal {
        debug!(?from, ?to, "unexpected supervisor transition");
        return from;
    }
    to
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_of_normal_exit() {
        let status = WaitStatus::Exited(Pid::from_raw(42), 7);
        assert_eq!(exit_code(status), Some(7));
    }

    #[test]
    fn exit_code_of_clean_exit_is_zero() {
        let status = WaitStatus::Exited(Pid::from_raw(42), 0);
        assert_eq!(exit_code(status), Some(0));
    }

    #[test]
    fn exit_code_of_signaled_exit_is_128_plus_signo() {
        let status = WaitStatus::Signaled(Pid::from_raw(42), Signal::SIGTERM, false);
        assert_eq!(exit_code(status), Some(143));
        let status = WaitStatus::Signaled(Pid::from_raw(42), Signal::SIGKILL, false);
        assert_eq!(exit_code(status), Some(137));
    }

    #[test]
    fn stopped_status_is_not_an_exit() {
        let status = WaitStatus::Stopped(Pid::from_raw(42), Signal::SIGSTOP);
        assert_eq!(exit_code(status), None);
    }

    #[test]
    fn termination_class_signals() {
        assert!(is_termination(Signal::SIGTERM));
        assert!(is_termination(Signal::SIGINT));
        assert!(is_termination(Signal::SIGQUIT));
        assert!(!is_termination(Signal::SIGHUP));
        assert!(!is_termination(Signal::SIGUSR1));
    }

    #[test]
    fn legal_lifecycle_path() {
        use SupervisorState::{NotStarted, Running, Stopped, Terminating};
        let s = advance(NotStarted, Running);
        assert_eq!(s, Running);
        let s = advance(s, Terminating);
        assert_eq!(s, Terminating);
        // Repeated signals while draining stay in Terminating.
        let s = advance(s, Terminating);
        assert_eq!(s, Terminating);
        let s = advance(s, Stopped);
        assert_eq!(s, Stopped);
    }

    #[test]
    fn direct_exit_skips_terminating() {
        use SupervisorState::{Running, Stopped};
        assert_eq!(advance(Running, Stopped), Stopped);
    }

    #[test]
    fn illegal_transition_is_ignored() {
        use SupervisorState::{NotStarted, Running, Stopped};
        assert_eq!(advance(Stopped, Running), Stopped);
        assert_eq!(advance(NotStarted, Stopped), NotStarted);
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(supervise(Vec::new(), CancellationToken::new()))
            .unwrap_err();
        assert!(matches!(err, InitError::EmptyCommand));
    }
}
