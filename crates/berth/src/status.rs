use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::warn;

use crate::health::HealthState;

#[derive(Debug, Serialize)]
struct ContainerStatus {
    health: HealthState,
    consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    container_id: Option<String>,
    running: bool,
    #[serde(serialize_with = "serialize_iso")]
    started_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_iso")]
    updated_at: DateTime<Utc>,
}

/// Serialize as ISO 8601 with millisecond precision.
fn serialize_iso<S: serde::Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}

/// Persists the current health classification to a JSON file atomically.
///
/// The file is the reporting surface for external orchestration; this layer
/// never acts on the classification itself.
pub struct HealthTracker {
    started_at: DateTime<Utc>,
    path: PathBuf,
    state: Mutex<MutableState>,
}

struct MutableState {
    health: HealthState,
    consecutive_failures: u32,
    container_id: Option<String>,
    running: bool,
}

impl HealthTracker {
    pub fn new(path: PathBuf) -> Self {
        Self {
            started_at: Utc::now(),
            path,
            state: Mutex::new(MutableState {
                health: HealthState::Starting,
                consecutive_failures: 0,
                container_id: None,
                running: true,
            }),
        }
    }

    /// Write the initial status file.
    pub async fn write_initial(&self) {
        let state = self.state.lock().await;
        self.write_status(&state).await;
    }

    pub async fn set_container(&self, id: String) {
        let mut state = self.state.lock().await;
        state.container_id = Some(id);
        self.write_status(&state).await;
    }

    pub async fn set_health(&self, health: HealthState, consecutive_failures: u32) {
        let mut state = self.state.lock().await;
        state.health = health;
        state.consecutive_failures = consecutive_failures;
        self.write_status(&state).await;
    }

    /// Record that the container has exited; the prober has nothing left to
    /// probe at that point.
    pub async fn set_stopped(&self) {
        let mut state = self.state.lock().await;
        state.running = false;
        self.write_status(&state).await;
    }

    /// Atomic write: write to a temp file in the same directory, then rename.
    async fn write_status(&self, state: &MutableState) {
        let status = ContainerStatus {
            health: state.health,
            consecutive_failures: state.consecutive_failures,
            container_id: state.container_id.clone(),
            running: state.running,
            started_at: self.started_at,
            updated_at: Utc::now(),
        };

        let json = match serde_json::to_string_pretty(&status) {
            Ok(j) => j,
            Err(e) => {
                warn!(error = %e, "failed to serialize status");
                return;
            }
        };

        let tmp = self.path.with_extension("tmp");
        if let Err(e) = tokio::fs::write(&tmp, json.as_bytes()).await {
            warn!(error = %e, path = %tmp.display(), "failed to write status temp file");
            return;
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            warn!(error = %e, "failed to rename status file");
        }
    }
}
