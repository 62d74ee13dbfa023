//! Application configuration module
//! Handles environment variable loading, configuration validation, and flow settings

use std::env;
use std::time::Duration;

/// Merchant categories accepted for static codes unless the allow-list is
/// widened. `0000` is the "not informed" category used by person-to-person
/// codes.
pub const DEFAULT_ALLOWED_CATEGORIES: &[&str] = &[
    "0000", "4121", "5411", "5499", "5812", "5814", "5912", "5999", "7299",
];

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub interpreter: InterpreterConfig,
    pub flow: FlowConfig,
    pub logging: LoggingConfig,
}

/// Payment backend connection settings
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub api_token: Option<String>,
}

/// Payment code acceptance rules
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    pub allowed_categories: Vec<String>,
    /// Feature flag: accept every merchant category.
    pub allow_all_categories: bool,
}

/// Timing and limits for one confirmation flow
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Delay before the first status poll after submission.
    pub poll_initial_delay: Duration,
    /// Delay between consecutive status polls.
    pub poll_interval: Duration,
    /// Maximum number of status polls before giving up with a soft timeout.
    pub poll_max_attempts: u32,
    pub pin_length: usize,
    pub pin_max_attempts: u32,
    pub pin_auto_submit: bool,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            backend: BackendConfig::from_env()?,
            interpreter: InterpreterConfig::from_env()?,
            flow: FlowConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backend.validate()?;
        self.interpreter.validate()?;
        self.flow.validate()?;
        self.logging.validate()?;

        Ok(())
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout_secs: 15,
            max_retries: 2,
            api_token: None,
        }
    }
}

impl BackendConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(BackendConfig {
            base_url: env::var("PAYFLOW_BACKEND_URL")
                .map_err(|_| ConfigError::MissingVariable("PAYFLOW_BACKEND_URL".to_string()))?,
            timeout_secs: env::var("PAYFLOW_BACKEND_TIMEOUT")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PAYFLOW_BACKEND_TIMEOUT".to_string()))?,
            max_retries: env::var("PAYFLOW_BACKEND_MAX_RETRIES")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue("PAYFLOW_BACKEND_MAX_RETRIES".to_string())
                })?,
            api_token: env::var("PAYFLOW_API_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::InvalidValue("PAYFLOW_BACKEND_URL".to_string()));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "PAYFLOW_BACKEND_URL must be a valid URL".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "PAYFLOW_BACKEND_TIMEOUT".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            allowed_categories: DEFAULT_ALLOWED_CATEGORIES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            allow_all_categories: false,
        }
    }
}

impl InterpreterConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let allowed_categories = match env::var("PAYFLOW_ALLOWED_CATEGORIES") {
            Ok(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => InterpreterConfig::default().allowed_categories,
        };

        Ok(InterpreterConfig {
            allowed_categories,
            allow_all_categories: env::var("PAYFLOW_ALLOW_ALL_CATEGORIES")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue("PAYFLOW_ALLOW_ALL_CATEGORIES".to_string())
                })?,
        })
    }

    pub fn is_category_allowed(&self, category: &str) -> bool {
        self.allow_all_categories || self.allowed_categories.iter().any(|c| c == category)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(bad) = self
            .allowed_categories
            .iter()
            .find(|c| c.len() != 4 || !c.chars().all(|ch| ch.is_ascii_digit()))
        {
            return Err(ConfigError::ValidationFailed(format!(
                "merchant category '{}' must be four digits",
                bad
            )));
        }

        Ok(())
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            poll_initial_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(3),
            poll_max_attempts: 10,
            pin_length: 4,
            pin_max_attempts: 3,
            pin_auto_submit: true,
        }
    }
}

impl FlowConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = FlowConfig::default();
        Ok(FlowConfig {
            poll_initial_delay: Duration::from_millis(parse_or(
                "PAYFLOW_POLL_INITIAL_DELAY_MS",
                defaults.poll_initial_delay.as_millis() as u64,
            )?),
            poll_interval: Duration::from_millis(parse_or(
                "PAYFLOW_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )?),
            poll_max_attempts: parse_or("PAYFLOW_POLL_MAX_ATTEMPTS", defaults.poll_max_attempts)?,
            pin_length: parse_or("PAYFLOW_PIN_LENGTH", defaults.pin_length)?,
            pin_max_attempts: parse_or("PAYFLOW_PIN_MAX_ATTEMPTS", defaults.pin_max_attempts)?,
            pin_auto_submit: parse_or("PAYFLOW_PIN_AUTO_SUBMIT", defaults.pin_auto_submit)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "PAYFLOW_POLL_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        if self.pin_length == 0 {
            return Err(ConfigError::InvalidValue("PAYFLOW_PIN_LENGTH".to_string()));
        }

        if self.pin_max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "PAYFLOW_PIN_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            format: LogFormat::Plain,
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_config_validation() {
        let config = BackendConfig {
            base_url: "https://api.example.com".to_string(),
            ..BackendConfig::default()
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_backend_url_validation() {
        let config = BackendConfig {
            base_url: "api.example.com".to_string(),
            ..BackendConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_validation() {
        let config = BackendConfig {
            timeout_secs: 0,
            ..BackendConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_category_allow_list() {
        let config = InterpreterConfig::default();
        assert!(config.is_category_allowed("5812"));
        assert!(!config.is_category_allowed("7995"));

        let widened = InterpreterConfig {
            allow_all_categories: true,
            ..InterpreterConfig::default()
        };
        assert!(widened.is_category_allowed("7995"));
    }

    #[test]
    fn test_malformed_category_is_rejected() {
        let config = InterpreterConfig {
            allowed_categories: vec!["58A2".to_string()],
            allow_all_categories: false,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_flow_config_requires_attempts() {
        let config = FlowConfig {
            poll_max_attempts: 0,
            ..FlowConfig::default()
        };
        assert!(config.validate().is_err());

        let config = FlowConfig {
            pin_max_attempts: 0,
            ..FlowConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(FlowConfig::default().validate().is_ok());
    }

    #[test]
    fn test_log_level_validation() {
        let config = LoggingConfig {
            level: "verbose".to_string(),
            format: LogFormat::Plain,
        };
        assert!(config.validate().is_err());
        assert!(LoggingConfig::default().validate().is_ok());
    }
}
