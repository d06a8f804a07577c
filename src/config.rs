use crate::retry::{DEFAULT_MAX_RETRY, DEFAULT_RETRY_INTERVAL, ReconnectPolicy};
use crate::secret::SecretString;
use crate::session::SessionConfig;
use crate::transport;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default base address of the execution service.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8188";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Base HTTP(S) address of the service
    pub server_url: String,
    /// Client identifier sent as `clientId`; a random one when unset
    pub client_id: Option<String>,
    /// Dials per reconnect burst
    pub max_retry: u32,
    /// Wait between bursts, in seconds
    pub retry_interval_secs: u64,
    /// Bearer credential for the streaming endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<SecretString>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            client_id: None,
            max_retry: DEFAULT_MAX_RETRY,
            retry_interval_secs: DEFAULT_RETRY_INTERVAL.as_secs(),
            bearer_token: None,
        }
    }
}

impl ConnectorConfig {
    /// `~/.execlink/config.toml`
    pub fn default_path() -> PathBuf {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home_dir.join(".execlink").join("config.toml")
    }

    /// Load configuration from file. A missing file yields the defaults.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = path.unwrap_or_else(Self::default_path);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            let config: ConnectorConfig = toml::from_str(&content)
                .with_context(|| format!("parsing {}", config_path.display()))?;
            Ok(config)
        } else {
            Ok(ConnectorConfig::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            self.max_retry,
            Duration::from_secs(self.retry_interval_secs),
        )
    }

    /// The configured client id, or a fresh UUID v4.
    pub fn resolve_client_id(&self) -> String {
        self.client_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    /// Resolve into a session configuration: derives the streaming
    /// address and fixes the client id.
    pub fn session_config(&self) -> crate::Result<SessionConfig> {
        let url = transport::stream_url(&self.server_url, &self.resolve_client_id())?;
        Ok(SessionConfig {
            url,
            policy: self.policy(),
            bearer_token: self
                .bearer_token
                .clone()
                .filter(|token| !token.is_empty()),
        })
    }
}
