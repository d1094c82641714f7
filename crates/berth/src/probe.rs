//! Timeout-bounded liveness probing of the service health endpoint.

use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::error::{BerthError, BerthResult};

/// Probe loop configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Time between probe ticks.
    pub interval: Duration,
    /// Maximum wait per probe; a stuck probe is abandoned, not retried
    /// within the same tick.
    pub timeout: Duration,
    /// Consecutive failures before declaring unhealthy.
    pub retries: u32,
    /// Grace window after launch during which failures do not count.
    pub start_period: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(3),
            retries: 3,
            start_period: Duration::from_secs(10),
        }
    }
}

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Pass,
    Fail(String),
}

impl ProbeOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Issues `GET /health` against the service's bound port.
///
/// The prober only reports outcomes; what to do about an unhealthy
/// classification is the orchestrator's decision.
pub struct Prober {
    client: Client,
    url: String,
}

impl Prober {
    pub fn new(host: &str, port: u16, settings: &ProbeSettings) -> BerthResult<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| BerthError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            url: format!("http://{host}:{port}/health"),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One probe. Success is HTTP 200 within the timeout; a timeout,
    /// connection failure, or any other status is a failure.
    pub async fn probe_once(&self) -> ProbeOutcome {
        match self.client.get(&self.url).send().await {
            Ok(resp) if resp.status() == StatusCode::OK => ProbeOutcome::Pass,
            Ok(resp) => ProbeOutcome::Fail(format!("status {}", resp.status())),
            Err(e) if e.is_timeout() => ProbeOutcome::Fail("timeout".into()),
            Err(e) if e.is_connect() => ProbeOutcome::Fail("connection failed".into()),
            Err(e) => ProbeOutcome::Fail(e.to_string()),
        }
    }
}
