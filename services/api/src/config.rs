use fitplan_core::{ConversationSettings, OracleSettings};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub oracle_api_key: String,
    pub oracle_base_url: String,
    pub oracle_model: String,
    pub oracle_timeout: Duration,
    pub history_window: Option<usize>,
    pub max_turn_chars: Option<usize>,
    pub system_prompt_path: Option<PathBuf>,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8011".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let oracle_api_key = std::env::var("ORACLE_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ConfigError::MissingVar("ORACLE_API_KEY".to_string()))?;

        let oracle_base_url = std::env::var("ORACLE_BASE_URL")
            .unwrap_or_else(|_| fitplan_core::oracle::DEFAULT_API_BASE.to_string());
        let oracle_model = std::env::var("ORACLE_MODEL")
            .unwrap_or_else(|_| fitplan_core::oracle::DEFAULT_MODEL.to_string());

        let oracle_timeout = match optional_positive("ORACLE_TIMEOUT_SECS")? {
            Some(secs) => Duration::from_secs(secs as u64),
            None => fitplan_core::oracle::DEFAULT_TIMEOUT,
        };

        let history_window = optional_positive("HISTORY_WINDOW")?;
        let max_turn_chars = optional_positive("MAX_TURN_CHARS")?;

        let system_prompt_path = std::env::var("SYSTEM_PROMPT_PATH").ok().map(PathBuf::from);

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            oracle_api_key,
            oracle_base_url,
            oracle_model,
            oracle_timeout,
            history_window,
            max_turn_chars,
            system_prompt_path,
            log_level,
        })
    }

    pub fn oracle_settings(&self) -> OracleSettings {
        OracleSettings {
            api_base: self.oracle_base_url.clone(),
            model: self.oracle_model.clone(),
            timeout: self.oracle_timeout,
            ..OracleSettings::new(self.oracle_api_key.clone())
        }
    }

    pub fn conversation_settings(&self) -> ConversationSettings {
        ConversationSettings {
            history_window: self.history_window,
            max_turn_chars: self.max_turn_chars,
        }
    }
}

/// Reads an optional integer that must be greater than zero when present.
fn optional_positive(var: &str) -> Result<Option<usize>, ConfigError> {
    match std::env::var(var) {
        Err(_) => Ok(None),
        Ok(raw) => match raw.trim().parse::<usize>() {
            Ok(value) if value > 0 => Ok(Some(value)),
            _ => Err(ConfigError::InvalidValue(
                var.to_string(),
                format!("'{}' is not a positive integer", raw),
            )),
        },
    }
}
