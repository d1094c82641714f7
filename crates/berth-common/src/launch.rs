//! Environment bindings read once into an immutable launch configuration.
//!
//! The environment is read at exactly one construction point; everything
//! downstream receives a `LaunchConfig` value instead of doing ambient
//! `std::env` lookups.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Port the service binds for its combined request/streaming interface.
pub const ENV_PORT: &str = "PORT";
/// Filesystem path of the durable state file inside the container.
pub const ENV_DATABASE_PATH: &str = "DATABASE_PATH";
/// Selects production-mode behavior in the service.
pub const ENV_NODE_ENV: &str = "NODE_ENV";
/// Passed through to service logic; opaque at this layer.
pub const ENV_CONTEXT_WINDOW: &str = "CONTEXT_WINDOW";
/// Path to the external CLI tool the service invokes; opaque at this layer.
pub const ENV_CLAUDE_CLI_PATH: &str = "CLAUDE_CLI_PATH";

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_DATABASE_PATH: &str = "/app/data/auth.db";
pub const DEFAULT_NODE_ENV: &str = "production";
pub const DEFAULT_CONTEXT_WINDOW: u32 = 160_000;
pub const DEFAULT_CLAUDE_CLI_PATH: &str = "claude";

/// Error reading the launch environment.
///
/// An unparseable value is fatal at startup; it is never silently replaced
/// with the default.
#[derive(Debug, thiserror::Error)]
#[error("invalid {var}: {reason}")]
pub struct EnvError {
    pub var: &'static str,
    pub reason: String,
}

/// Immutable service launch configuration.
///
/// Constructed once from the environment (or the documented defaults) and
/// passed explicitly to the supervisor and prober components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfig {
    pub port: u16,
    pub database_path: PathBuf,
    pub node_env: String,
    pub context_window: u32,
    pub claude_cli_path: PathBuf,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            node_env: DEFAULT_NODE_ENV.to_string(),
            context_window: DEFAULT_CONTEXT_WINDOW,
            claude_cli_path: PathBuf::from(DEFAULT_CLAUDE_CLI_PATH),
        }
    }
}

impl LaunchConfig {
    /// Read the launch configuration from the process environment.
    pub fn from_env() -> Result<Self, EnvError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a config from an injected lookup function.
    ///
    /// Tests use this so they never have to mutate the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EnvError> {
        let port = match lookup(ENV_PORT) {
            Some(raw) => raw.parse().map_err(|e| EnvError {
                var: ENV_PORT,
                reason: format!("{raw:?}: {e}"),
            })?,
            None => DEFAULT_PORT,
        };
        let context_window = match lookup(ENV_CONTEXT_WINDOW) {
            Some(raw) => raw.parse().map_err(|e| EnvError {
                var: ENV_CONTEXT_WINDOW,
                reason: format!("{raw:?}: {e}"),
            })?,
            None => DEFAULT_CONTEXT_WINDOW,
        };

        Ok(Self {
            port,
            database_path: lookup(ENV_DATABASE_PATH)
                .map_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH), PathBuf::from),
            node_env: lookup(ENV_NODE_ENV).unwrap_or_else(|| DEFAULT_NODE_ENV.to_string()),
            context_window,
            claude_cli_path: lookup(ENV_CLAUDE_CLI_PATH)
                .map_or_else(|| PathBuf::from(DEFAULT_CLAUDE_CLI_PATH), PathBuf::from),
        })
    }

    /// The env bindings as `(name, value)` pairs, for passing to a launcher.
    ///
    /// Every variable is emitted explicitly, including ones at their default,
    /// so the running container documents its own effective configuration.
    pub fn env_bindings(&self) -> Vec<(&'static str, String)> {
        vec![
            (ENV_PORT, self.port.to_string()),
            (
                ENV_DATABASE_PATH,
                self.database_path.to_string_lossy().into_owned(),
            ),
            (ENV_NODE_ENV, self.node_env.clone()),
            (ENV_CONTEXT_WINDOW, self.context_window.to_string()),
            (
                ENV_CLAUDE_CLI_PATH,
                self.claude_cli_path.to_string_lossy().into_owned(),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn absent_variables_yield_documented_defaults() {
        let config = LaunchConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, LaunchConfig::default());
        assert_eq!(config.port, 3001);
        assert_eq!(config.database_path, PathBuf::from("/app/data/auth.db"));
        assert_eq!(config.node_env, "production");
        assert_eq!(config.context_window, 160_000);
        assert_eq!(config.claude_cli_path, PathBuf::from("claude"));
    }

    #[test]
    fn set_variables_override_defaults() {
        let config = LaunchConfig::from_lookup(lookup_from(&[
            ("PORT", "8080"),
            ("DATABASE_PATH", "/mnt/state/app.db"),
            ("NODE_ENV", "development"),
            ("CONTEXT_WINDOW", "200000"),
            ("CLAUDE_CLI_PATH", "/usr/local/bin/claude"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.database_path, PathBuf::from("/mnt/state/app.db"));
        assert_eq!(config.node_env, "development");
        assert_eq!(config.context_window, 200_000);
        assert_eq!(
            config.claude_cli_path,
            PathBuf::from("/usr/local/bin/claude")
        );
    }

    #[test]
    fn partial_overrides_keep_remaining_defaults() {
        let config = LaunchConfig::from_lookup(lookup_from(&[("PORT", "9000")])).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.node_env, "production");
        assert_eq!(config.context_window, 160_000);
    }

    #[test]
    fn invalid_port_is_fatal_not_defaulted() {
        let err = LaunchConfig::from_lookup(lookup_from(&[("PORT", "not-a-port")])).unwrap_err();
        assert_eq!(err.var, "PORT");
        assert!(err.to_string().contains("not-a-port"), "got: {err}");
    }

    #[test]
    fn invalid_context_window_is_fatal() {
        let err =
            LaunchConfig::from_lookup(lookup_from(&[("CONTEXT_WINDOW", "-5")])).unwrap_err();
        assert_eq!(err.var, "CONTEXT_WINDOW");
    }

    #[test]
    fn env_bindings_round_trip_through_lookup() {
        let config = LaunchConfig {
            port: 8080,
            database_path: PathBuf::from("/data/auth.db"),
            node_env: "production".into(),
            context_window: 160_000,
            claude_cli_path: PathBuf::from("claude"),
        };
        let bindings: HashMap<&str, String> = config.env_bindings().into_iter().collect();
        let reread =
            LaunchConfig::from_lookup(|var| bindings.get(var).cloned()).unwrap();
        assert_eq!(reread, config);
    }

    #[test]
    fn env_bindings_emit_every_variable() {
        let bindings = LaunchConfig::default().env_bindings();
        let names: Vec<&str> = bindings.iter().map(|(k, _)| *k).collect();
        for var in [
            ENV_PORT,
            ENV_DATABASE_PATH,
            ENV_NODE_ENV,
            ENV_CONTEXT_WINDOW,
            ENV_CLAUDE_CLI_PATH,
        ] {
            assert!(names.contains(&var), "missing {var}");
        }
    }
}
