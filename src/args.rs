use crate::config::ConnectorConfig;
use crate::logging::LogConfig;
use crate::secret::SecretString;
use clap::{ArgAction, Args};
use std::path::PathBuf;

// Global flags shared across every subcommand:
//   -c / --config      Path to a config.toml file
//   --server           Base HTTP(S) address of the service
//   --client-id        Fixed client identifier
//   --token            Bearer credential
//   -v / --verbose     Debug logging with source locations
#[derive(Debug, Clone, Default, Args)]
pub struct CommonArgs {
    /// Path to a config.toml file (default: ~/.execlink/config.toml)
    #[arg(
        short = 'c',
        long,
        value_name = "PATH",
        env = "EXECLINK_CONFIG",
        global = true
    )]
    pub config: Option<PathBuf>,

    /// Base address of the service (http://… or https://…)
    #[arg(long, value_name = "URL", env = "EXECLINK_SERVER", global = true)]
    pub server: Option<String>,

    /// Client identifier (default: random UUID)
    #[arg(long, value_name = "ID", env = "EXECLINK_CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    /// Bearer token for the streaming endpoint
    #[arg(
        long,
        value_name = "TOKEN",
        env = "EXECLINK_TOKEN",
        hide_env_values = true,
        global = true
    )]
    pub token: Option<String>,

    /// Debug logging with source locations (overrides EXECLINK_LOG)
    #[arg(short, long, action = ArgAction::SetTrue, global = true)]
    pub verbose: bool,
}

impl CommonArgs {
    pub fn log_config(&self) -> LogConfig {
        if self.verbose {
            LogConfig::debug()
        } else {
            LogConfig::from_env()
        }
    }

    pub fn apply_overrides(&self, config: &mut ConnectorConfig) {
        if let Some(server) = &self.server {
            config.server_url = server.clone();
        }

        if let Some(client_id) = &self.client_id {
            config.client_id = Some(client_id.clone());
        }

        if let Some(token) = &self.token {
            config.bearer_token = SecretString::non_empty(token.as_str());
        }
    }
}
