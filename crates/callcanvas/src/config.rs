//! Application configuration.
//!
//! Layered as defaults, then the TOML config file, then `CALLCANVAS__*`
//! environment variables (`CALLCANVAS__SERVER__PORT=9000`).

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthConfig, ConfigValidationError, resolve_env_reference};
use crate::bridge::BridgeConfig;
use crate::generation::ImageModel;

pub const APP_NAME: &str = "callcanvas";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub generation: GenerationConfig,
    pub bridge: BridgeSettings,
    pub webhook: WebhookConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Image provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    /// Provider API token. Accepts `env:VAR_NAME`.
    pub api_token: Option<String>,
    pub model: ImageModel,
    /// Upper bound for one generation, including polling.
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.replicate.com".to_string(),
            api_token: None,
            model: ImageModel::default(),
            timeout_secs: 120,
        }
    }
}

impl GenerationConfig {
    pub fn resolve_api_token(&self) -> Result<Option<String>, ConfigValidationError> {
        self.api_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(resolve_env_reference)
            .transpose()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub max_in_flight_per_session: usize,
    /// Use the whole agent utterance as a prompt when no lead-in phrase
    /// matches.
    pub forced_fallback: bool,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        let defaults = BridgeConfig::default();
        Self {
            idle_timeout_secs: defaults.idle_timeout.as_secs(),
            sweep_interval_secs: defaults.sweep_interval.as_secs(),
            max_in_flight_per_session: defaults.max_in_flight_per_session,
            forced_fallback: false,
        }
    }
}

impl BridgeSettings {
    pub fn to_bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs.max(1)),
            max_in_flight_per_session: self.max_in_flight_per_session.max(1),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Shared secret for `X-Webhook-Token`. Accepts `env:VAR_NAME`.
    pub token: Option<String>,
}

impl WebhookConfig {
    pub fn resolve_token(&self) -> Result<Option<String>, ConfigValidationError> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(resolve_env_reference)
            .transpose()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Load configuration from `path` (optional) and the process environment.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    build_config(path, None)
}

fn build_config(path: &Path, env_source: Option<config::Map<String, String>>) -> Result<AppConfig> {
    let built = Config::builder()
        .add_source(
            File::from(path)
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(
            Environment::with_prefix(&env_prefix())
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("auth.allowed_origins")
                .source(env_source),
        )
        .build()
        .with_context(|| format!("reading configuration from {}", path.display()))?;

    built
        .try_deserialize()
        .context("deserializing configuration")
}

/// Write a default config file with a freshly generated JWT secret.
pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let mut config = AppConfig::default();
    config.auth.jwt_secret = Some(AuthConfig::generate_jwt_secret());
    config.generation.api_token = Some("env:REPLICATE_API_TOKEN".to_string());

    let toml = toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = format!("# Configuration for {}\n# File: {}\n\n", APP_NAME, path.display());
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

/// Resolve the config file path from an optional override.
pub fn resolve_config_path(override_path: Option<PathBuf>) -> Result<PathBuf> {
    match override_path {
        Some(path) => {
            let expanded = expand_path(path)?;
            if expanded.is_dir() {
                Ok(expanded.join("config.toml"))
            } else {
                Ok(expanded)
            }
        }
        None => Ok(default_config_dir()?.join("config.toml")),
    }
}

pub fn expand_path(path: PathBuf) -> Result<PathBuf> {
    match path.to_str() {
        Some(text) => expand_str_path(text),
        None => Ok(path),
    }
}

pub fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}

pub fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(dir) = dirs::config_dir() {
        return Ok(dir.join(APP_NAME));
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

pub fn env_prefix() -> String {
    APP_NAME.to_ascii_uppercase()
}
