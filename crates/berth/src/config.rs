use std::path::{Path, PathBuf};
use std::time::Duration;

use berth_common::LaunchConfig;
use serde::{Deserialize, Serialize};

use crate::error::{BerthError, BerthResult};
use crate::probe::ProbeSettings;

pub(crate) const DEFAULT_INTERVAL_SECS: u64 = 30;
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 3;
pub(crate) const DEFAULT_RETRIES: u32 = 3;
pub(crate) const DEFAULT_START_PERIOD_SECS: u64 = 10;

/// Deployment config (`berth.yaml`): one declaration point for the image,
/// the container wiring, and the probe policy, so the volume mount and the
/// service's configured database path cannot drift apart.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct DeployConfig {
    pub name: String,
    pub base_dir: PathBuf,
    pub image: ImageConfig,
    #[serde(default)]
    pub container: ContainerConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub service: ServiceOverrides,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Build context: the service source tree with its dependency manifests.
    pub context: PathBuf,
    /// Optional override of the embedded two-stage recipe.
    #[serde(default)]
    pub dockerfile: Option<PathBuf>,
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Container name; defaults to the deployment name.
    pub name: Option<String>,
    /// Host port published to the service port; defaults to the service port.
    pub host_port: Option<u16>,
    /// Host directory backing the persistent state volume;
    /// defaults to `base_dir/data`.
    pub state_dir: Option<PathBuf>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub retries: u32,
    pub start_period_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retries: DEFAULT_RETRIES,
            start_period_secs: DEFAULT_START_PERIOD_SECS,
        }
    }
}

impl ProbeConfig {
    pub fn settings(&self) -> ProbeSettings {
        ProbeSettings {
            interval: Duration::from_secs(self.interval_secs),
            timeout: Duration::from_secs(self.timeout_secs),
            retries: self.retries,
            start_period: Duration::from_secs(self.start_period_secs),
        }
    }
}

/// Optional overrides of the service launch environment.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceOverrides {
    pub port: Option<u16>,
    pub database_path: Option<PathBuf>,
    pub node_env: Option<String>,
    pub context_window: Option<u32>,
    pub claude_cli_path: Option<PathBuf>,
}

impl ServiceOverrides {
    fn apply(&self, mut base: LaunchConfig) -> LaunchConfig {
        if let Some(port) = self.port {
            base.port = port;
        }
        if let Some(path) = &self.database_path {
            base.database_path = path.clone();
        }
        if let Some(env) = &self.node_env {
            base.node_env = env.clone();
        }
        if let Some(window) = self.context_window {
            base.context_window = window;
        }
        if let Some(cli) = &self.claude_cli_path {
            base.claude_cli_path = cli.clone();
        }
        base
    }
}

/// Load and validate a deploy config from a YAML file.
///
/// Relative paths in the config are resolved against the config file's
/// parent directory.
pub async fn load(path: &Path) -> BerthResult<DeployConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| BerthError::Config(format!("read {}: {e}", path.display())))?;
    let mut config: DeployConfig = serde_yaml_ng::from_str(&content)
        .map_err(|e| BerthError::Config(format!("parse {}: {e}", path.display())))?;
    if let Some(config_dir) = path.parent() {
        config.resolve_relative_paths(config_dir);
    }
    validate_paths(&config).await?;
    Ok(config)
}

/// Generate a berth.yaml config file from a `DeployConfig`.
pub async fn generate(config: &DeployConfig) -> BerthResult<()> {
    let deploy_dir = &config.base_dir;
    tokio::fs::create_dir_all(deploy_dir)
        .await
        .map_err(|e| BerthError::Config(format!("create {}: {e}", deploy_dir.display())))?;

    let content = serde_yaml_ng::to_string(config)
        .map_err(|e| BerthError::Config(format!("serialize config: {e}")))?;

    let config_path = deploy_dir.join("berth.yaml");
    tokio::fs::write(&config_path, content)
        .await
        .map_err(|e| BerthError::Config(format!("write {}: {e}", config_path.display())))?;
    Ok(())
}

async fn check_path_exists(path: &Path, label: &str) -> BerthResult<()> {
    let exists = tokio::fs::try_exists(path)
        .await
        .map_err(|e| BerthError::Config(format!("check {label}: {e}")))?;
    if !exists {
        return Err(BerthError::Config(format!(
            "{label} not found: {}",
            path.display()
        )));
    }
    Ok(())
}

async fn validate_paths(config: &DeployConfig) -> BerthResult<()> {
    check_path_exists(&config.image.context, "image context").await?;
    if let Some(dockerfile) = &config.image.dockerfile {
        check_path_exists(dockerfile, "dockerfile").await?;
    }
    // base_dir and state_dir are created at start time
    Ok(())
}

impl DeployConfig {
    /// Resolve relative paths against `config_dir` (the directory containing
    /// the YAML file).
    fn resolve_relative_paths(&mut self, config_dir: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = config_dir.join(&*p);
            }
        };
        resolve(&mut self.base_dir);
        resolve(&mut self.image.context);
        if let Some(dockerfile) = &mut self.image.dockerfile {
            resolve(dockerfile);
        }
        if let Some(state_dir) = &mut self.container.state_dir {
            resolve(state_dir);
        }
    }

    /// Container name: explicit override or the deployment name.
    pub fn container_name(&self) -> &str {
        self.container.name.as_deref().unwrap_or(&self.name)
    }

    /// Host side of the persistent state volume.
    pub fn state_dir(&self) -> PathBuf {
        self.container
            .state_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("data"))
    }

    /// The effective launch environment: documented defaults plus the
    /// config's service overrides, constructed at this single point.
    pub fn launch(&self) -> LaunchConfig {
        self.service.apply(LaunchConfig::default())
    }

    /// Host port published for the service.
    pub fn host_port(&self) -> u16 {
        self.container.host_port.unwrap_or_else(|| self.launch().port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_full_config() {
        let dir = tempfile::tempdir().unwrap();
        let context = dir.path().join("app");
        tokio::fs::create_dir_all(&context).await.unwrap();

        let yaml = format!(
            r#"
name: myapp
base_dir: {base_dir}
image:
  context: {context}
container:
  name: myapp-prod
  host_port: 8080
  state_dir: {state_dir}
probe:
  interval_secs: 10
  timeout_secs: 2
  retries: 5
  start_period_secs: 20
service:
  port: 4000
  node_env: development
"#,
            base_dir = dir.path().display(),
            context = context.display(),
            state_dir = dir.path().join("state").display(),
        );

        let config_path = dir.path().join("berth.yaml");
        tokio::fs::write(&config_path, &yaml).await.unwrap();

        let config = load(&config_path).await.unwrap();
        assert_eq!(config.name, "myapp");
        assert_eq!(config.container_name(), "myapp-prod");
        assert_eq!(config.host_port(), 8080);
        assert_eq!(config.probe.retries, 5);
        let settings = config.probe.settings();
        assert_eq!(settings.interval, Duration::from_secs(10));
        assert_eq!(settings.start_period, Duration::from_secs(20));
        let launch = config.launch();
        assert_eq!(launch.port, 4000);
        assert_eq!(launch.node_env, "development");
        // Unset overrides keep the documented defaults.
        assert_eq!(launch.context_window, 160_000);
    }

    #[tokio::test]
    async fn load_defaults_for_optional_sections() {
        let dir = tempfile::tempdir().unwrap();
        let context = dir.path().join("app");
        tokio::fs::create_dir_all(&context).await.unwrap();

        let yaml = format!(
            r#"
name: myapp
base_dir: {base_dir}
image:
  context: {context}
"#,
            base_dir = dir.path().display(),
            context = context.display(),
        );

        let config_path = dir.path().join("berth.yaml");
        tokio::fs::write(&config_path, &yaml).await.unwrap();

        let config = load(&config_path).await.unwrap();
        assert_eq!(config.container_name(), "myapp");
        assert_eq!(config.host_port(), 3001);
        assert_eq!(config.state_dir(), dir.path().join("data"));
        assert_eq!(config.probe, ProbeConfig::default());
        assert_eq!(config.launch(), LaunchConfig::default());
    }

    #[tokio::test]
    async fn load_fails_on_missing_context() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = format!(
            r#"
name: myapp
base_dir: {base_dir}
image:
  context: /nonexistent/app
"#,
            base_dir = dir.path().display(),
        );

        let config_path = dir.path().join("berth.yaml");
        tokio::fs::write(&config_path, &yaml).await.unwrap();

        let err = load(&config_path).await.unwrap_err();
        assert!(err.to_string().contains("not found"), "got: {err}");
    }

    #[tokio::test]
    async fn generate_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let context = dir.path().join("app");
        tokio::fs::create_dir_all(&context).await.unwrap();

        let deploy_dir = dir.path().join("my-deploy");
        let config = DeployConfig {
            name: "myapp".into(),
            base_dir: deploy_dir.clone(),
            image: ImageConfig {
                context: context.clone(),
                dockerfile: None,
            },
            container: ContainerConfig {
                name: Some("myapp-prod".into()),
                host_port: Some(8080),
                state_dir: Some(dir.path().join("state")),
            },
            probe: ProbeConfig {
                interval_secs: 15,
                timeout_secs: 5,
                retries: 4,
                start_period_secs: 30,
            },
            service: ServiceOverrides {
                port: Some(4000),
                ..ServiceOverrides::default()
            },
        };

        generate(&config).await.unwrap();

        let loaded = load(&deploy_dir.join("berth.yaml")).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("app"))
            .await
            .unwrap();

        // YAML uses relative paths (relative to config file location)
        let yaml = r#"
name: myapp
base_dir: deploy
image:
  context: app
container:
  state_dir: data
"#;

        let config_path = dir.path().join("berth.yaml");
        tokio::fs::write(&config_path, yaml).await.unwrap();

        let config = load(&config_path).await.unwrap();

        assert!(config.base_dir.is_absolute());
        assert_eq!(config.base_dir, dir.path().join("deploy"));
        assert_eq!(config.image.context, dir.path().join("app"));
        assert_eq!(config.state_dir(), dir.path().join("data"));
    }

    #[test]
    fn service_overrides_apply_on_top_of_defaults() {
        let overrides = ServiceOverrides {
            port: Some(9000),
            database_path: Some(PathBuf::from("/data/app.db")),
            ..ServiceOverrides::default()
        };
        let launch = overrides.apply(LaunchConfig::default());
        assert_eq!(launch.port, 9000);
        assert_eq!(launch.database_path, PathBuf::from("/data/app.db"));
        assert_eq!(launch.node_env, "production");
    }
}
