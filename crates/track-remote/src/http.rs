//! HTTP client for the service-order API's move endpoint.

use serde::Serialize;
use std::time::Duration;
use track_types::{PersistenceFailure, StagePersister};

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum RemoteConfigError {
    #[error("TRACK_REMOTE_URL is not set")]
    MissingUrl,
    #[error("invalid TRACK_REMOTE_TIMEOUT_MS: {0}")]
    InvalidTimeout(String),
    #[error("http client: {0}")]
    Client(String),
}

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// API base, e.g. `https://api.example.com/v1`. Trailing slashes are ignored.
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// Read `TRACK_REMOTE_URL` (required), `TRACK_REMOTE_TOKEN` and `TRACK_REMOTE_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, RemoteConfigError> {
        let url = std::env::var("TRACK_REMOTE_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .ok_or(RemoteConfigError::MissingUrl)?;
        let mut cfg = Self::new(url.trim());
        cfg.token = std::env::var("TRACK_REMOTE_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());
        if let Ok(ms) = std::env::var("TRACK_REMOTE_TIMEOUT_MS") {
            let ms = ms
                .trim()
                .parse::<u64>()
                .map_err(|_| RemoteConfigError::InvalidTimeout(ms.clone()))?;
            cfg.timeout = Duration::from_millis(ms);
        }
        Ok(cfg)
    }

    fn move_url(&self, entity_id: &str) -> String {
        format!("{}/service-orders/{}/move", self.base_url, entity_id)
    }
}

#[derive(Serialize)]
struct MoveBody<'a> {
    stage_id: &'a str,
}

/// Persists stage moves with `POST {base}/service-orders/{id}/move`.
pub struct HttpStagePersister {
    client: reqwest::Client,
    config: RemoteConfig,
}

impl HttpStagePersister {
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RemoteConfigError::Client(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, RemoteConfigError> {
        Self::new(RemoteConfig::from_env()?)
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }
}

fn transport_failure(e: reqwest::Error) -> PersistenceFailure {
    if e.is_timeout() {
        PersistenceFailure::Timeout
    } else {
        PersistenceFailure::Transport(e.to_string())
    }
}

#[async_trait::async_trait]
impl StagePersister for HttpStagePersister {
    async fn persist_stage_move(
        &self,
        entity_id: &str,
        target_stage_id: &str,
    ) -> Result<(), PersistenceFailure> {
        let url = self.config.move_url(entity_id);
        let mut req = self.client.post(&url).json(&MoveBody {
            stage_id: target_stage_id,
        });
        if let Some(ref token) = self.config.token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await.map_err(transport_failure)?;
        let status = res.status();
        if status.is_success() {
            tracing::debug!(entity_id, stage = target_stage_id, "stage move persisted");
            return Ok(());
        }
        let message = res.text().await.map_err(transport_failure)?;
        Err(PersistenceFailure::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}
