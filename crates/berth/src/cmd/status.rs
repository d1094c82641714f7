use std::path::PathBuf;

use clap::Args;

use crate::config;
use crate::error::{BerthError, BerthResult};
use crate::paths::DeployPaths;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Path to the berth.yaml deploy config
    #[arg(long, short)]
    pub config: PathBuf,
}

/// Print the persisted status JSON for a deployment.
pub async fn run_status(args: StatusArgs) -> BerthResult<()> {
    let config = config::load(&args.config).await?;
    let paths = DeployPaths::new(config.base_dir.clone());
    let path = paths.status();
    let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
        BerthError::Config(format!(
            "read {}: {e} (has `berth start` run for this deployment?)",
            path.display()
        ))
    })?;
    println!("{content}");
    Ok(())
}
