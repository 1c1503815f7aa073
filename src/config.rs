//! Layered configuration for grwm.
//!
//! Values are resolved in order: built-in defaults, then `grwm.toml` (or the
//! file passed with `--config`), then environment variables (a `.env` file is
//! loaded first), then CLI flags applied by the caller.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8000
//! cors_permissive = false
//!
//! [pipeline]
//! max_retries = 3
//! session_timeout_secs = 600
//! idle_keepalive_secs = 15
//! cleanup_delay_secs = 300
//! broadcast_capacity = 256
//! progress_buffer = 64
//!
//! [github]
//! api_url = "https://api.github.com"
//! max_repos = 15
//! timeout_secs = 20
//!
//! [llm]
//! api_url = "https://generativelanguage.googleapis.com/v1beta"
//! model = "gemini-2.5-flash"
//! temperature = 0.7
//! max_output_tokens = 8192
//! timeout_secs = 60
//! ```
//!
//! API keys are only read from the environment: `GOOGLE_API_KEY_1` to
//! `GOOGLE_API_KEY_3`, or `GOOGLE_API_KEY` when none of those is set. With no
//! key the writer falls back to the built-in templates.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Default file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "grwm.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allow any origin. Intended for local frontend development.
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_permissive: false,
        }
    }
}

/// Knobs for the orchestrator, bridge and stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_retries: u32,
    pub session_timeout_secs: u64,
    pub idle_keepalive_secs: u64,
    pub cleanup_delay_secs: u64,
    pub broadcast_capacity: usize,
    pub progress_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            session_timeout_secs: 600,
            idle_keepalive_secs: 15,
            cleanup_delay_secs: 300,
            broadcast_capacity: 256,
            progress_buffer: 64,
        }
    }
}

impl PipelineConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn idle_keepalive(&self) -> Duration {
        Duration::from_secs(self.idle_keepalive_secs)
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_secs(self.cleanup_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_url: String,
    pub max_repos: usize,
    pub timeout_secs: u64,
    /// Never read from the config file; populated from `GITHUB_TOKEN`/`GITHUB_PAT`.
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            max_repos: 15,
            timeout_secs: 20,
            token: None,
        }
    }
}

/// Env vars holding rotated Gemini keys, in rotation order.
pub const GOOGLE_API_KEY_VARS: [&str; 3] = ["GOOGLE_API_KEY_1", "GOOGLE_API_KEY_2", "GOOGLE_API_KEY_3"];

/// Text model used by the writing stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub api_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
    /// Never read from the config file; see [`Config::apply_env`].
    #[serde(skip)]
    pub api_keys: Vec<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash".to_string(),
            temperature: 0.7,
            max_output_tokens: 8192,
            timeout_secs: 60,
            api_keys: Vec::new(),
        }
    }
}

impl LlmConfig {
    pub fn enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub github: GitHubConfig,
    pub llm: LlmConfig,
}

impl Config {
    /// Load configuration from `path` (or `grwm.toml` if present) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        // A missing .env is fine.
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Overlay environment variables, read through `lookup` so tests can inject them.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("GITHUB_TOKEN").or_else(|| lookup("GITHUB_PAT"))
            && !token.trim().is_empty()
        {
            self.github.token = Some(token.trim().to_string());
        }
        let non_blank = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut keys: Vec<String> = GOOGLE_API_KEY_VARS.iter().filter_map(|&key| non_blank(key)).collect();
        if keys.is_empty() {
            keys.extend(non_blank("GOOGLE_API_KEY"));
        }
        if !keys.is_empty() {
            self.llm.api_keys = keys;
        }
        if let Some(host) = lookup("GRWM_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("GRWM_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::Invalid {
                field: "GRWM_PORT",
                message: format!("'{}' is not a valid port", port),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        if p.max_retries == 0 {
            return Err(invalid("pipeline.max_retries", "must be at least 1"));
        }
        if p.session_timeout_secs == 0 {
            return Err(invalid("pipeline.session_timeout_secs", "must be greater than 0"));
        }
        if p.idle_keepalive_secs == 0 {
            return Err(invalid("pipeline.idle_keepalive_secs", "must be greater than 0"));
        }
        if p.broadcast_capacity == 0 {
            return Err(invalid("pipeline.broadcast_capacity", "must be at least 1"));
        }
        if p.progress_buffer == 0 {
            return Err(invalid("pipeline.progress_buffer", "must be at least 1"));
        }
        if self.github.max_repos == 0 {
            return Err(invalid("github.max_repos", "must be at least 1"));
        }
        if self.github.timeout_secs == 0 {
            return Err(invalid("github.timeout_secs", "must be greater than 0"));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(invalid("llm.temperature", "must be between 0.0 and 2.0"));
        }
        if self.llm.max_output_tokens == 0 {
            return Err(invalid("llm.max_output_tokens", "must be at least 1"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(invalid("llm.timeout_secs", "must be greater than 0"));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn invalid(field: &'static str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.max_retries, 3);
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.bind_addr(), "127.0.0.1:8000");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [pipeline]
            max_retries = 5

            [github]
            max_repos = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.max_retries, 5);
        assert_eq!(config.pipeline.broadcast_capacity, 256);
        assert_eq!(config.github.max_repos, 30);
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn test_unknown_types_rejected() {
        let result = Config::from_toml_str("[pipeline]\nmax_retries = \"lots\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grwm.toml");
        std::fs::write(&path, "[server]\nport = 9001\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.server.port, 9001);
    }

    #[test]
    fn test_from_file_missing_reports_path() {
        let err = Config::from_file(Path::new("/nonexistent/grwm.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/grwm.toml"));
    }

    #[test]
    fn test_env_overlay() {
        let env: HashMap<&str, &str> = [
            ("GITHUB_PAT", " ghp_secret "),
            ("GRWM_PORT", "9100"),
            ("GRWM_HOST", "0.0.0.0"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.github.token.as_deref(), Some("ghp_secret"));
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_env_numbered_google_keys_win_over_single_key() {
        let env: HashMap<&str, &str> = [
            ("GOOGLE_API_KEY_1", "k1"),
            ("GOOGLE_API_KEY_3", " k3 "),
            ("GOOGLE_API_KEY_2", ""),
            ("GOOGLE_API_KEY", "single"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.llm.api_keys, vec!["k1", "k3"]);
        assert!(config.llm.enabled());
    }

    #[test]
    fn test_env_single_google_key_is_fallback() {
        let mut config = Config::default();
        config
            .apply_env(|key| (key == "GOOGLE_API_KEY").then(|| "single".to_string()))
            .unwrap();
        assert_eq!(config.llm.api_keys, vec!["single"]);

        let mut config = Config::default();
        config.apply_env(|_| None).unwrap();
        assert!(!config.llm.enabled());
    }

    #[test]
    fn test_llm_keys_never_serialized() {
        let mut config = Config::default();
        config.llm.api_keys = vec!["secret".to_string()];
        let rendered = toml::to_string(&config).unwrap();
        assert!(rendered.contains("[llm]"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_temperature() {
        let mut config = Config::default();
        config.llm.temperature = 3.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("llm.temperature"));
    }

    #[test]
    fn test_env_bad_port_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_env(|key| (key == "GRWM_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("GRWM_PORT"));
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let mut config = Config::default();
        config.pipeline.max_retries = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pipeline.max_retries"));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = Config::default();
        config.pipeline.broadcast_capacity = 0;
        assert!(config.validate().is_err());
    }
}
