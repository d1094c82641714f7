use std::path::PathBuf;

use clap::Args;
use tracing::info;

use crate::config::{self, DeployConfig, ImageConfig};
use crate::error::BerthResult;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Deployment name (also the default container name)
    #[arg(long)]
    pub name: String,

    /// Deployment directory for config, status, and state
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Build context: the service source tree
    #[arg(long, default_value = ".")]
    pub context: PathBuf,
}

/// Write a starter `berth.yaml` with the documented defaults spelled out.
pub async fn run_init(args: InitArgs) -> BerthResult<()> {
    let config = DeployConfig {
        name: args.name,
        base_dir: args.dir.clone(),
        image: ImageConfig {
            context: args.context,
            dockerfile: None,
        },
        container: Default::default(),
        probe: Default::default(),
        service: Default::default(),
    };

    config::generate(&config).await?;
    info!(
        path = %args.dir.join("berth.yaml").display(),
        "[OK] config written; edit it, then run `berth build`"
    );
    Ok(())
}
