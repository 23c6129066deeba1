//! Configuration management
//!
//! Loads the proxy configuration from a YAML file. Every key has a default,
//! so a partial (or missing) file is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::security::SecurityPolicy;

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8001
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Model backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of the OpenAI-compatible backend (no trailing `/v1`)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    /// Model id advertised by the synthesized `/v1/models` listing
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Request timeout in seconds
    #[serde(default = "default_model_timeout")]
    pub timeout: u64,
}

fn default_endpoint() -> String {
    "http://localhost:8000".to_string()
}

fn default_model_name() -> String {
    "qwen3".to_string()
}

fn default_model_timeout() -> u64 {
    300
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: String::new(),
            model_name: default_model_name(),
            timeout: default_model_timeout(),
        }
    }
}

impl ModelConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Tool feature flags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_true")]
    pub enable_file_operations: bool,
    #[serde(default = "default_true")]
    pub enable_terminal: bool,
    #[serde(default = "default_true")]
    pub enable_edit_operations: bool,
    /// Accepted for compatibility; edits are always applied directly
    #[serde(default)]
    pub auto_apply_edits: bool,
    #[serde(default = "default_backup_directory")]
    pub backup_directory: PathBuf,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_backup_directory() -> PathBuf {
    PathBuf::from("backups")
}

fn default_command_timeout() -> u64 {
    30
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enable_file_operations: true,
            enable_terminal: true,
            enable_edit_operations: true,
            auto_apply_edits: false,
            backup_directory: default_backup_directory(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

/// Access-control lists and output limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Directory prefixes tools may touch (empty = everything not blocked)
    #[serde(default)]
    pub allowed_directories: Vec<String>,
    #[serde(default)]
    pub blocked_directories: Vec<String>,
    /// First shell tokens that may be executed (empty = everything not blocked)
    #[serde(default)]
    pub allowed_commands: Vec<String>,
    /// Substrings that reject a command outright
    #[serde(default)]
    pub blocked_commands: Vec<String>,
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    #[serde(default = "default_max_output_lines")]
    pub max_output_lines: usize,
}

fn default_max_file_size_mb() -> u64 {
    10
}

fn default_max_output_lines() -> usize {
    1000
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_directories: vec![],
            blocked_directories: vec![],
            allowed_commands: vec![],
            blocked_commands: vec![],
            max_file_size_mb: default_max_file_size_mb(),
            max_output_lines: default_max_output_lines(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file; rotated daily. `null` disables file logging.
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
    /// Number of rotated files to keep
    #[serde(default = "default_backup_count")]
    pub backup_count: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("logs/tool-proxy.log"))
}

fn default_backup_count() -> usize {
    5
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
            backup_count: default_backup_count(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// A missing file is not an error: defaults are returned. The caller
    /// should report that, since logging is not initialized yet.
    pub fn load(path: &Path) -> Result<(Self, bool)> {
        if !path.exists() {
            return Ok((Config::default(), false));
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok((config, true))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty document deserializes to unit; treat it as all defaults
        if contents.trim().is_empty() {
            return Ok(Config::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Build the security policy described by the `security` section
    pub fn security_policy(&self) -> SecurityPolicy {
        SecurityPolicy::new(
            &self.security.allowed_directories,
            &self.security.blocked_directories,
            &self.security.allowed_commands,
            &self.security.blocked_commands,
        )
        .with_limits(
            self.security.max_file_size_mb * 1024 * 1024,
            self.security.max_output_lines,
        )
    }

    /// YAML rendering with the API key masked
    pub fn to_display_yaml(&self) -> Result<String> {
        let mut shown = self.clone();
        if !shown.model.api_key.is_empty() {
            shown.model.api_key = mask_secret(&shown.model.api_key);
        }
        serde_yaml::to_string(&shown).context("Failed to serialize config")
    }
}

fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{}****", visible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8001);
        assert_eq!(config.model.timeout, 300);
        assert!(config.tools.enable_terminal);
        assert!(!config.tools.auto_apply_edits);
        assert_eq!(config.security.max_output_lines, 1000);
        assert_eq!(config.tools.backup_directory, PathBuf::from("backups"));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
server:
  port: 9100
security:
  blocked_commands: ["rm -rf"]
tools:
  enable_terminal: false
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.security.blocked_commands, vec!["rm -rf"]);
        assert_eq!(config.security.max_file_size_mb, 10);
        assert!(!config.tools.enable_terminal);
        assert!(config.tools.enable_file_operations);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = Config::from_yaml("  \n").unwrap();
        assert_eq!(config.server.port, 8001);
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let (config, found) = Config::load(&temp.path().join("config.yaml")).unwrap();
        assert!(!found);
        assert_eq!(config.model.model_name, "qwen3");
    }

    #[test]
    fn test_load_invalid_file_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(&path, "server: [unclosed").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_display_masks_api_key() {
        let mut config = Config::default();
        config.model.api_key = "sk-secret-value".to_string();
        let shown = config.to_display_yaml().unwrap();
        assert!(shown.contains("sk-s****"));
        assert!(!shown.contains("secret-value"));
    }

    #[test]
    fn test_security_policy_limits() {
        let mut config = Config::default();
        config.security.max_file_size_mb = 2;
        config.security.max_output_lines = 50;
        let policy = config.security_policy();
        assert_eq!(policy.max_file_size(), 2 * 1024 * 1024);
        assert_eq!(policy.max_output_lines(), 50);
    }
}
