//! Widget configuration loading from file and environment variables.

use serde::Deserialize;
use thiserror::Error;

/// Top-level widget configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Host page settings.
    #[serde(default)]
    pub widget: WidgetConfig,

    /// Remote call server settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Local persisted state.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Visitor access gate.
    #[serde(default)]
    pub access: AccessConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// What the embedding page supplies.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WidgetConfig {
    /// Identifier of the AI agent to talk to. Required.
    #[serde(default)]
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the call server, without the `/api/...` suffix.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite file backing local storage.
    #[serde(default = "default_storage_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    /// Skip the whitelist check and show the widget to everyone.
    #[serde(default = "default_allow_all")]
    pub allow_all: bool,

    /// Origin label sent to the whitelist endpoint.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Account page that reveals the signed-in user's email.
    #[serde(default)]
    pub account_url: Option<String>,

    /// Session token (the `token_jwt` cookie) for the account page.
    #[serde(default)]
    pub token: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "callpilot_widget=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_storage_path() -> String {
    "callpilot.db".to_string()
}

fn default_allow_all() -> bool {
    true
}

fn default_origin() -> String {
    "plaace".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            allow_all: default_allow_all(),
            origin: default_origin(),
            account_url: None,
            token: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Returns the configured agent identifier.
    ///
    /// # Errors
    ///
    /// `ConfigError::MissingAgentId` when it is absent or blank; the widget
    /// must not initialise without one.
    pub fn agent_id(&self) -> Result<&str, ConfigError> {
        self.widget
            .agent_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ConfigError::MissingAgentId)
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("agent id not provided; set widget.agent_id or CALLPILOT_AGENT_ID")]
    MissingAgentId,
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `CALLPILOT_AGENT_ID` overrides `widget.agent_id`
/// - `CALLPILOT_API_BASE_URL` overrides `api.base_url`
/// - `CALLPILOT_STORAGE_PATH` overrides `storage.path`
/// - `CALLPILOT_ALLOW_ALL` overrides `access.allow_all`
/// - `CALLPILOT_ACCESS_TOKEN` overrides `access.token`
/// - `CALLPILOT_LOG_LEVEL` overrides `logging.level`
/// - `CALLPILOT_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(agent_id) = var("CALLPILOT_AGENT_ID") {
        config.widget.agent_id = Some(agent_id);
    }
    if let Some(base_url) = var("CALLPILOT_API_BASE_URL") {
        config.api.base_url = base_url;
    }
    if let Some(path) = var("CALLPILOT_STORAGE_PATH") {
        config.storage.path = path;
    }
    if let Some(allow_all) = var("CALLPILOT_ALLOW_ALL") {
        config.access.allow_all = is_truthy(&allow_all);
    }
    if let Some(token) = var("CALLPILOT_ACCESS_TOKEN") {
        config.access.token = Some(token);
    }
    if let Some(level) = var("CALLPILOT_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("CALLPILOT_LOG_JSON") {
        config.logging.json = is_truthy(&json);
    }
}

fn is_truthy(value: &str) -> bool {
    value == "true" || value == "1"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_without_file() {
        let config = load_config(Some("/nonexistent/callpilot.toml")).unwrap();
        assert_eq!(config.api.timeout_secs, 15);
        assert!(config.access.allow_all);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parses_sections() {
        let config: Config = toml::from_str(
            r#"
            [widget]
            agent_id = "agent_123"

            [api]
            base_url = "https://calls.example.com"

            [access]
            allow_all = false
            account_url = "https://example.com/account"
            "#,
        )
        .unwrap();

        assert_eq!(config.agent_id().unwrap(), "agent_123");
        assert_eq!(config.api.base_url, "https://calls.example.com");
        assert_eq!(config.api.timeout_secs, 15, "unset fields keep defaults");
        assert!(!config.access.allow_all);
        assert_eq!(config.access.origin, "plaace");
    }

    #[test]
    fn missing_or_blank_agent_id_is_fatal() {
        let mut config = Config::default();
        assert!(matches!(config.agent_id(), Err(ConfigError::MissingAgentId)));

        config.widget.agent_id = Some("   ".to_string());
        assert!(matches!(config.agent_id(), Err(ConfigError::MissingAgentId)));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("CALLPILOT_AGENT_ID", "agent_env"),
            ("CALLPILOT_API_BASE_URL", "http://127.0.0.1:9999"),
            ("CALLPILOT_ALLOW_ALL", "0"),
            ("CALLPILOT_LOG_JSON", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.agent_id().unwrap(), "agent_env");
        assert_eq!(config.api.base_url, "http://127.0.0.1:9999");
        assert!(!config.access.allow_all);
        assert!(config.logging.json);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[widget\nagent_id = 1").unwrap();

        let err = load_config(path.to_str()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
