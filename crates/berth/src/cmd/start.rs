use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use berth_common::{LaunchConfig, volume};
use clap::Args;
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{self, DeployConfig};
use crate::engine::Engine;
use crate::error::{BerthError, BerthResult};
use crate::health::HealthRecord;
use crate::image;
use crate::paths::{DeployPaths, container};
use crate::probe::{ProbeOutcome, Prober, ProbeSettings};
use crate::status::HealthTracker;

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Path to the berth.yaml deploy config
    #[arg(long, short)]
    pub config: PathBuf,

    /// Image tag to run (default: the tag recorded by `berth build`)
    #[arg(long)]
    pub image: Option<String>,

    /// Container engine binary (default: docker on PATH)
    #[arg(long, env = "BERTH_ENGINE")]
    pub engine: Option<PathBuf>,
}

/// Launch the container and supervise it until it exits.
///
/// The returned exit code is the container's own: the service's exit status
/// propagates through the in-container init shim, through the engine, and
/// out of this process unchanged.
pub async fn run_start(args: StartArgs) -> BerthResult<ExitCode> {
    let config = config::load(&args.config).await?;
    let engine = Engine::resolve(args.engine)?;

    let tag = match args.image {
        Some(tag) => tag,
        None => image::last_built_tag(&config).await?,
    };

    let launch = config.launch();
    preflight(&config, &launch).await?;

    let paths = DeployPaths::new(config.base_dir.clone());
    let tracker = HealthTracker::new(paths.status());
    tracker.write_initial().await;

    let settings = config.probe.settings();
    let prober = Prober::new("127.0.0.1", config.host_port(), &settings)?;

    let id = launch_container(&engine, &config, &tag, &launch).await?;
    let short: String = id.chars().take(12).collect();
    info!(
        container = %short,
        name = config.container_name(),
        port = config.host_port(),
        probe = prober.url(),
        "container started"
    );
    tracker.set_container(short).await;

    // The container is removed whether supervision ended cleanly or not;
    // a leftover would hold the configured name against the next start.
    let result = supervise(&engine, &id, &settings, &prober, &tracker).await;
    cleanup(&engine, &id).await;
    if result.is_err() {
        tracker.set_stopped().await;
    }
    let code = result?;

    info!(exit_code = code, "container exited");
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}

/// Host-side checks before the container launches.
async fn preflight(config: &DeployConfig, launch: &LaunchConfig) -> BerthResult<()> {
    tokio::fs::create_dir_all(&config.base_dir)
        .await
        .map_err(|e| BerthError::Config(format!("create {}: {e}", config.base_dir.display())))?;

    let state_dir = config.state_dir();
    tokio::fs::create_dir_all(&state_dir)
        .await
        .map_err(|e| BerthError::Config(format!("create {}: {e}", state_dir.display())))?;

    // A database path outside the mounted state dir lands in the container's
    // ephemeral layer and vanishes on replacement.
    if !launch.database_path.starts_with(container::STATE_DIR) {
        warn!(
            path = %launch.database_path.display(),
            mount = container::STATE_DIR,
            "database path is outside the state volume; data will not survive container replacement"
        );
    }

    // The host-side view of the database file.
    let file_name = launch
        .database_path
        .file_name()
        .ok_or_else(|| {
            BerthError::Config(format!(
                "database path has no file name: {}",
                launch.database_path.display()
            ))
        })?;
    let side = volume::side_files(&state_dir.join(file_name));
    if !side.is_empty() {
        warn!(
            files = ?side,
            "journal side files present from an unclean shutdown; the service recovers them on open"
        );
    }
    Ok(())
}

async fn launch_container(
    engine: &Engine,
    config: &DeployConfig,
    tag: &str,
    launch: &LaunchConfig,
) -> BerthResult<String> {
    let publish = format!("{}:{}", config.host_port(), launch.port);
    let mount = format!("{}:{}", config.state_dir().display(), container::STATE_DIR);

    let mut argv: Vec<String> = vec![
        "run".into(),
        "-d".into(),
        "--name".into(),
        config.container_name().into(),
        "-p".into(),
        publish,
        "-v".into(),
        mount,
    ];
    for (var, value) in launch.env_bindings() {
        argv.push("-e".into());
        argv.push(format!("{var}={value}"));
    }
    argv.push(tag.into());

    let args: Vec<&str> = argv.iter().map(String::as_str).collect();
    let id = engine.exec(&args).await?;
    Ok(id)
}

/// Supervision loop: probe ticks, signal handling, and the container's exit.
async fn supervise(
    engine: &Engine,
    id: &str,
    settings: &ProbeSettings,
    prober: &Prober,
    tracker: &HealthTracker,
) -> BerthResult<i32> {
    let mut record = HealthRecord::new(settings.retries, settings.start_period);
    let launched = Instant::now();

    let mut ticks = tokio::time::interval(settings.interval);
    // A probe outstanding past its interval skips ticks rather than queueing
    // overlapping probes.
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    // Resolves when the container exits, with its exit code on stdout.
    let wait_args = ["wait", id];
    let wait = engine.exec(&wait_args);
    tokio::pin!(wait);

    let mut stops_requested: u32 = 0;

    loop {
        tokio::select! {
            result = &mut wait => {
                let out = result?;
                let code: i32 = out
                    .parse()
                    .map_err(|e| BerthError::Internal(format!("parse exit code {out:?}: {e}")))?;
                tracker.set_stopped().await;
                return Ok(code);
            }
            _ = ticks.tick(), if stops_requested == 0 => {
                let outcome = prober.probe_once().await;
                let transition = record.observe(outcome.passed(), launched.elapsed());
                match &outcome {
                    ProbeOutcome::Pass => debug!("probe ok"),
                    ProbeOutcome::Fail(reason) => warn!(
                        %reason,
                        consecutive = record.consecutive_failures(),
                        grace = record.grace_failures(),
                        "probe failed"
                    ),
                }
                if let Some(state) = transition {
                    info!(state = %state, "health transition");
                }
                tracker.set_health(record.state(), record.consecutive_failures()).await;
            }
            _ = sigterm.recv() => {
                stops_requested += 1;
                request_stop(engine, id, stops_requested);
            }
            _ = sigint.recv() => {
                stops_requested += 1;
                request_stop(engine, id, stops_requested);
            }
        }
    }
}

/// Ask the engine to stop the container. The engine delivers SIGTERM to the
/// container's PID 1 (the init shim forwards it to the service) and
/// escalates to SIGKILL after its grace period. A repeated request kills
/// immediately.
fn request_stop(engine: &Engine, id: &str, stops_requested: u32) {
    let verb = if stops_requested > 1 { "kill" } else { "stop" };
    info!(verb, "stop requested, signaling container");
    let engine = engine.clone();
    let id = id.to_string();
    tokio::spawn(async move {
        if let Err(e) = engine.exec(&[verb, &id]).await {
            warn!(error = %e, "engine {verb} failed");
        }
    });
}

/// Remove the exited container so the name is free for the next start.
async fn cleanup(engine: &Engine, id: &str) {
    if let Err(e) = engine.exec(&["rm", id]).await {
        warn!(error = %e, "failed to remove exited container");
    }
}
