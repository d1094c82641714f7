//! Container engine invocation.
//!
//! Thin wrapper over the `docker` binary. Commands either capture trimmed
//! stdout (`exec`) or inherit the terminal for long builds (`exec_streamed`).

use std::path::PathBuf;

use tokio::process::Command;
use tracing::trace;

/// Error from a failed engine command.
#[derive(Debug, thiserror::Error)]
#[error("command failed: {command}\n{detail}")]
pub struct CommandError {
    pub command: String,
    pub detail: String,
}

/// Handle to the container engine binary.
#[derive(Debug, Clone)]
pub struct Engine {
    binary: PathBuf,
}

impl Engine {
    /// Locate the engine on `PATH`.
    pub fn locate() -> Result<Self, CommandError> {
        let binary = which::which("docker").map_err(|e| CommandError {
            command: "docker".into(),
            detail: e.to_string(),
        })?;
        Ok(Self { binary })
    }

    /// Use an explicit binary (tests, alternate engines).
    pub fn with_binary(binary: PathBuf) -> Self {
        Self { binary }
    }

    /// An explicit binary when given, otherwise `PATH` lookup.
    pub fn resolve(binary: Option<PathBuf>) -> Result<Self, CommandError> {
        match binary {
            Some(binary) => Ok(Self::with_binary(binary)),
            None => Self::locate(),
        }
    }

    pub fn binary(&self) -> &std::path::Path {
        &self.binary
    }

    fn display(&self, args: &[&str]) -> String {
        let mut parts = vec![self.binary.to_string_lossy().into_owned()];
        parts.extend(args.iter().map(|a| (*a).to_string()));
        parts.join(" ")
    }

    /// Execute an engine command, returning trimmed stdout on success.
    pub async fn exec(&self, args: &[&str]) -> Result<String, CommandError> {
        let cmd_display = self.display(args);
        trace!(command = %cmd_display, "exec");

        let output = Command::new(&self.binary)
            .args(args)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| CommandError {
                command: cmd_display.clone(),
                detail: e.to_string(),
            })?;

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(CommandError {
                command: cmd_display,
                detail: stderr,
            })
        }
    }

    /// Execute an engine command with stdout/stderr inherited (visible to the
    /// user). Used for image builds, where progress output matters.
    pub async fn exec_streamed(&self, args: &[&str]) -> Result<(), CommandError> {
        let cmd_display = self.display(args);
        trace!(command = %cmd_display, "exec_streamed");

        let status = Command::new(&self.binary)
            .args(args)
            .stdin(std::process::Stdio::null())
            .status()
            .await
            .map_err(|e| CommandError {
                command: cmd_display.clone(),
                detail: e.to_string(),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(CommandError {
                command: cmd_display,
                detail: format!("exited with {status}"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_binary_and_args() {
        let engine = Engine::with_binary(PathBuf::from("docker"));
        assert_eq!(
            engine.display(&["run", "-d", "img"]),
            "docker run -d img"
        );
    }

    #[tokio::test]
    async fn exec_returns_trimmed_stdout() {
        let engine = Engine::with_binary(PathBuf::from("echo"));
        let out = engine.exec(&["hello"]).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn exec_returns_error_on_failure() {
        let engine = Engine::with_binary(PathBuf::from("false"));
        let err = engine.exec(&[]).await.unwrap_err();
        assert!(err.command.contains("false"), "command was: {}", err.command);
    }

    #[tokio::test]
    async fn exec_error_contains_stderr() {
        let engine = Engine::with_binary(PathBuf::from("sh"));
        let err = engine
            .exec(&["-c", "echo oops >&2; exit 1"])
            .await
            .unwrap_err();
        assert!(err.detail.contains("oops"), "detail was: {}", err.detail);
    }

    #[tokio::test]
    async fn exec_streamed_succeeds_on_zero_exit() {
        let engine = Engine::with_binary(PathBuf::from("true"));
        engine.exec_streamed(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn exec_streamed_fails_on_nonzero_exit() {
        let engine = Engine::with_binary(PathBuf::from("false"));
        let err = engine.exec_streamed(&[]).await.unwrap_err();
        assert!(err.detail.contains("exited"), "detail was: {}", err.detail);
    }

    #[tokio::test]
    async fn exec_fails_on_missing_binary() {
        let engine = Engine::with_binary(PathBuf::from("/nonexistent/engine"));
        assert!(engine.exec(&["version"]).await.is_err());
    }
}
