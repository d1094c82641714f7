use std::path::PathBuf;

use clap::Args;
use tracing::info;

use crate::engine::Engine;
use crate::error::{BerthError, BerthResult};
use crate::{config, image};

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Path to the berth.yaml deploy config
    #[arg(long, short)]
    pub config: PathBuf,

    /// Init shim binary to bake into the image
    /// (default: berth-init next to this binary, then on PATH)
    #[arg(long)]
    pub init_shim: Option<PathBuf>,

    /// Container engine binary (default: docker on PATH)
    #[arg(long, env = "BERTH_ENGINE")]
    pub engine: Option<PathBuf>,
}

pub async fn run_build(args: BuildArgs) -> BerthResult<()> {
    let config = config::load(&args.config).await?;
    let engine = Engine::resolve(args.engine)?;

    let shim = match args.init_shim {
        Some(path) => path,
        None => locate_shim()?,
    };

    let built = image::build(&engine, &config, &shim).await?;
    if built.reused {
        info!(tag = %built.tag, "inputs unchanged, existing image reused");
    } else {
        info!(tag = %built.tag, "image built and verified");
    }
    Ok(())
}

/// Find the init shim next to the running binary, falling back to `PATH`.
fn locate_shim() -> BerthResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe()
        && let Some(dir) = exe.parent()
    {
        let sibling = dir.join("berth-init");
        if sibling.exists() {
            return Ok(sibling);
        }
    }
    which::which("berth-init").map_err(|e| {
        BerthError::Build(format!("locate berth-init: {e} (pass --init-shim explicitly)"))
    })
}
