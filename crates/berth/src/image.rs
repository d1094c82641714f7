//! Two-stage image build pipeline.
//!
//! The builder stage carries the full toolchain and every declared
//! dependency; the runtime stage carries production artifacts only, with the
//! compile toolchain installed and purged inside a single construction step.
//! The image tag is a hash of the build inputs, so rebuilding on unchanged
//! inputs is a no-op.

use std::ffi::OsStr;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::DeployConfig;
use crate::engine::Engine;
use crate::error::{BerthError, BerthResult};
use crate::paths::container;

const RUNTIME_DOCKERFILE: &str = include_str!("../app.Dockerfile");
const STAGE_SCRIPT: &str = include_str!("../stage-context.sh");
const VERIFY_SCRIPT: &str = include_str!("../verify-image.sh");

/// Dependency manifests hashed into the image tag.
///
/// Source changes that leave the recipe and the declared dependency set
/// untouched reuse the cached image only if the tag also matches, so the
/// lock file matters more than individual sources here.
const MANIFEST_FILES: [&str; 2] = ["package.json", "package-lock.json"];

#[derive(Debug)]
pub struct BuiltImage {
    pub tag: String,
    pub reused: bool,
}

#[derive(Serialize, Deserialize)]
struct ImageRecord {
    tag: String,
    built_at: String,
}

/// Compute the input hash over named byte blobs.
///
/// Names and lengths are mixed in so reordering or concatenation tricks
/// cannot collide two distinct input sets.
fn compute_input_hash(inputs: &[(&str, &[u8])]) -> String {
    let mut hasher = Sha256::new();
    for (name, bytes) in inputs {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    format!("{:x}", hasher.finalize())
}

fn image_tag(name: &str, hash: &str) -> String {
    let short = hash.get(..12).unwrap_or(hash);
    format!("berth/{name}:{short}")
}

async fn image_exists(engine: &Engine, tag: &str) -> bool {
    engine
        .exec(&["image", "inspect", "--format", "{{.Id}}", tag])
        .await
        .is_ok()
}

/// Build the runtime image, reusing a cached one when the inputs are
/// unchanged.
///
/// Any dependency-install or compilation failure aborts with non-zero
/// status before a tag is applied; no partial image becomes the release
/// artifact.
pub async fn build(engine: &Engine, config: &DeployConfig, shim: &Path) -> BerthResult<BuiltImage> {
    let dockerfile = match &config.image.dockerfile {
        Some(path) => {
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| BerthError::Build(format!("read {}: {e}", path.display())))?;
            // Custom recipes still need the shim as PID 1 for signal
            // forwarding and exit-code propagation to hold.
            if !content.contains(container::INIT_SHIM) {
                warn!(
                    shim = container::INIT_SHIM,
                    "custom recipe does not install the init shim"
                );
            }
            content
        }
        None => RUNTIME_DOCKERFILE.to_string(),
    };
    let shim_bytes = tokio::fs::read(shim)
        .await
        .map_err(|e| BerthError::Build(format!("read init shim {}: {e}", shim.display())))?;

    // Input hash: recipe + dependency manifests + shim binary.
    let mut manifest_blobs: Vec<(&str, Vec<u8>)> = Vec::new();
    for name in MANIFEST_FILES {
        let path = config.image.context.join(name);
        if tokio::fs::try_exists(&path)
            .await
            .map_err(|e| BerthError::Build(format!("check {}: {e}", path.display())))?
        {
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| BerthError::Build(format!("read {}: {e}", path.display())))?;
            manifest_blobs.push((name, bytes));
        }
    }
    let mut inputs: Vec<(&str, &[u8])> = vec![("Dockerfile", dockerfile.as_bytes())];
    for (name, bytes) in &manifest_blobs {
        inputs.push((name, bytes.as_slice()));
    }
    inputs.push(("berth-init", shim_bytes.as_slice()));

    let hash = compute_input_hash(&inputs);
    info!("image input hash: {hash}");
    let tag = image_tag(&config.name, &hash);

    if image_exists(engine, &tag).await {
        info!(tag = %tag, "[OK] image already built");
        record_built_tag(config, &tag).await?;
        return Ok(BuiltImage { tag, reused: true });
    }

    // Write the recipe and scripts to a temp work directory.
    let work_dir =
        tempfile::tempdir().map_err(|e| BerthError::Build(format!("create temp dir: {e}")))?;
    let dockerfile_path = work_dir.path().join("Dockerfile");
    tokio::fs::write(&dockerfile_path, &dockerfile)
        .await
        .map_err(|e| BerthError::Build(format!("write Dockerfile: {e}")))?;
    let stage_script = work_dir.path().join("stage-context.sh");
    tokio::fs::write(&stage_script, STAGE_SCRIPT)
        .await
        .map_err(|e| BerthError::Build(format!("write stage script: {e}")))?;
    let verify_script = work_dir.path().join("verify-image.sh");
    tokio::fs::write(&verify_script, VERIFY_SCRIPT)
        .await
        .map_err(|e| BerthError::Build(format!("write verify script: {e}")))?;

    // Stage the context with the shim injected.
    let stage_dir = work_dir.path().join("context");
    run_script(
        &stage_script,
        &[
            ("--context", config.image.context.as_os_str()),
            ("--shim", shim.as_os_str()),
            ("--stage", stage_dir.as_os_str()),
        ],
    )
    .await?;

    // The build itself, with progress streamed to the user's terminal.
    // It runs under a scratch tag: the release tag must only ever name a
    // verified image, so a build that fails verification leaves nothing a
    // later run could mistake for a cached release artifact.
    let scratch = format!("{tag}-unverified");
    let dockerfile_str = dockerfile_path.to_string_lossy();
    let stage_str = stage_dir.to_string_lossy();
    engine
        .exec_streamed(&[
            "build",
            "--file",
            dockerfile_str.as_ref(),
            "--tag",
            &scratch,
            stage_str.as_ref(),
        ])
        .await?;

    // Verify zero toolchain residue and the restricted identity
    // (the verify script is not part of the input hash).
    run_script(
        &verify_script,
        &[
            ("--engine", engine.binary().as_os_str()),
            ("--image", OsStr::new(&scratch)),
        ],
    )
    .await?;

    // Promote to the release tag and drop the scratch name.
    engine.exec(&["tag", &scratch, &tag]).await?;
    if let Err(e) = engine.exec(&["rmi", &scratch]).await {
        warn!(error = %e, "failed to remove scratch tag");
    }

    record_built_tag(config, &tag).await?;
    info!(tag = %tag, "[OK] image ready");
    Ok(BuiltImage { tag, reused: false })
}

/// Run an embedded helper script with stdout/stderr inherited.
async fn run_script(script: &Path, args: &[(&str, &OsStr)]) -> BerthResult<()> {
    let mut cmd = tokio::process::Command::new("bash");
    cmd.arg(script);
    for (flag, value) in args {
        cmd.arg(flag).arg(value);
    }
    let status = cmd
        .stdin(std::process::Stdio::null())
        .status()
        .await
        .map_err(|e| BerthError::Build(format!("spawn {}: {e}", script.display())))?;
    if !status.success() {
        return Err(BerthError::Build(format!(
            "{} failed with {status}",
            script.display()
        )));
    }
    Ok(())
}

fn record_path(config: &DeployConfig) -> std::path::PathBuf {
    config.base_dir.join("image.json")
}

/// Remember the tag so `berth start` finds the image without re-hashing.
async fn record_built_tag(config: &DeployConfig, tag: &str) -> BerthResult<()> {
    tokio::fs::create_dir_all(&config.base_dir)
        .await
        .map_err(|e| BerthError::Build(format!("create {}: {e}", config.base_dir.display())))?;
    let record = ImageRecord {
        tag: tag.to_string(),
        built_at: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    };
    let json = serde_json::to_string_pretty(&record)
        .map_err(|e| BerthError::Internal(format!("serialize image record: {e}")))?;
    let path = record_path(config);
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, json.as_bytes())
        .await
        .map_err(|e| BerthError::Build(format!("write {}: {e}", tmp.display())))?;
    tokio::fs::rename(&tmp, &path)
        .await
        .map_err(|e| BerthError::Build(format!("rename {}: {e}", path.display())))?;
    Ok(())
}

/// The tag of the most recent successful build for this deployment.
pub async fn last_built_tag(config: &DeployConfig) -> BerthResult<String> {
    let path = record_path(config);
    let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
        BerthError::Config(format!(
            "read {}: {e} (run `berth build` first, or pass --image)",
            path.display()
        ))
    })?;
    let record: ImageRecord = serde_json::from_str(&content)
        .map_err(|e| BerthError::Config(format!("parse {}: {e}", path.display())))?;
    Ok(record.tag)
}
