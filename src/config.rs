use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::models::CurrentUser;

/// Environment variable that overrides the configured API token
pub const TOKEN_ENV: &str = "CONVO_API_TOKEN";

/// `~/.convo`, or `./.convo` when no home directory can be found
pub static CONVO_HOME: Lazy<PathBuf> = Lazy::new(|| {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".convo")
});

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the conversation API
    pub api_base_url: String,

    /// Bearer token for the API
    pub api_token: Option<String>,

    /// Websocket endpoint of the real-time service
    pub socket_url: String,

    /// Number of messages in a full history page
    pub page_size: usize,

    /// Request timeout for API calls, in seconds
    pub request_timeout_secs: u64,

    /// Directory holding config and log files
    #[serde(skip)]
    pub home: PathBuf,

    /// The signed-in user
    pub user: CurrentUser,

    /// UI preferences
    pub ui: UiConfig,
}

/// UI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    pub show_timestamps: bool,
    pub composer_max_rows: u16,
    pub tick_millis: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_base_url: "http://localhost:3000/api/v2".to_string(),
            api_token: None,
            socket_url: "ws://localhost:6001/app/convo".to_string(),
            user: CurrentUser {
                id: 0,
                full_name: None,
            },
            page_size: 25,
            request_timeout_secs: 30,
            home: CONVO_HOME.clone(),
            ui: UiConfig {
                show_timestamps: true,
                composer_max_rows: 4,
                tick_millis: 50,
            },
        }
    }
}

impl Config {
    /// Load configuration from `~/.convo/config.toml`
    pub fn load() -> Result<Self> {
        let home = CONVO_HOME.clone();
        fs::create_dir_all(&home).context("Failed to create .convo directory")?;

        let config_path = home.join("config.toml");
        let mut config = if config_path.exists() {
            let content =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            Self::from_toml(&content)?
        } else {
            Config::default()
        };

        config.home = home;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(self.config_path(), content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    pub fn log_path(&self) -> PathBuf {
        self.home.join("convo.log")
    }

    /// Get API token from environment or config
    pub fn get_api_token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|token| !token.is_empty())
            .or_else(|| self.api_token.clone())
    }
}
