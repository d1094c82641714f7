use std::path::PathBuf;

/// In-container paths (must match the embedded image recipe).
pub mod container {
    /// Mount point of the persistent state volume.
    pub const STATE_DIR: &str = "/app/data";
    /// Where the init shim is installed inside the runtime image.
    pub const INIT_SHIM: &str = "/usr/local/bin/berth-init";
}

/// Deployment-level paths derived from the base directory.
pub struct DeployPaths {
    base_dir: PathBuf,
}

impl DeployPaths {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn status(&self) -> PathBuf {
        self.base_dir.join("status.json")
    }
}
