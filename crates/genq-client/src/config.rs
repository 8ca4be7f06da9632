//! Workspace connection configuration

use std::time::Duration;

use crate::error::ClientError;

/// Connection settings for a Databricks workspace.
#[derive(Debug, Clone)]
pub struct GenieConfig {
    /// Workspace base URL, e.g. `https://acme.cloud.databricks.com`.
    pub host: String,
    /// Personal access token.
    pub token: String,
    /// Genie space to talk to; the first accessible space is used when
    /// unset.
    pub space_id: Option<String>,
    /// Interval between message status polls.
    pub poll_interval: Duration,
    /// How long to wait for a message to reach a terminal Genie status.
    pub wait_timeout: Duration,
}

impl GenieConfig {
    pub fn new(host: &str, token: &str) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            token: token.to_string(),
            space_id: None,
            poll_interval: Duration::from_secs(1),
            wait_timeout: Duration::from_secs(600),
        }
    }

    /// Load from `DATABRICKS_HOST` / `DATABRICKS_TOKEN` / `GENIE_SPACE_ID`.
    pub fn from_env() -> Result<Self, ClientError> {
        let host = require_env("DATABRICKS_HOST")?;
        let token = require_env("DATABRICKS_TOKEN")?;

        let mut config = Self::new(&host, &token);
        config.space_id = std::env::var("GENIE_SPACE_ID").ok().filter(|s| !s.is_empty());
        Ok(config)
    }

    pub fn with_space(mut self, space_id: &str) -> Self {
        self.space_id = Some(space_id.to_string());
        self
    }
}

fn require_env(key: &str) -> Result<String, ClientError> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ClientError::Config(format!("{key} is not set")))
}
